use crate::{domain::Channel, errors::ErrorKind, ports::ChannelService, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MembershipSkip {
    /// Private channels are never swept, even when we are a member.
    Private,
    Archived,
    InviteOnly,
    /// Unclassified join failure, recorded and skipped.
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Membership {
    Joined,
    AlreadyMember,
    Skipped(MembershipSkip),
}

impl Membership {
    pub fn can_read(&self) -> bool {
        matches!(self, Membership::Joined | Membership::AlreadyMember)
    }
}

/// Make sure the caller can read `channel`'s history.
///
/// `Err` is reserved for failures that poison the rest of the batch (missing scope,
/// invalid credentials, exhausted rate limit, cancellation).
pub async fn ensure_member(service: &dyn ChannelService, channel: &Channel) -> Result<Membership> {
    if channel.is_private {
        return Ok(Membership::Skipped(MembershipSkip::Private));
    }
    if channel.is_member {
        return Ok(Membership::AlreadyMember);
    }

    let err = match service.join_channel(&channel.id).await {
        Ok(()) => {
            tracing::debug!(channel = %channel.name, "joined");
            return Ok(Membership::Joined);
        }
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => e,
    };

    let outcome = match err.kind() {
        Some(ErrorKind::AlreadyInChannel) => Membership::AlreadyMember,
        Some(ErrorKind::IsArchived | ErrorKind::AlreadyArchived) => {
            Membership::Skipped(MembershipSkip::Archived)
        }
        Some(ErrorKind::InviteOnly) => Membership::Skipped(MembershipSkip::InviteOnly),
        _ => {
            tracing::warn!(
                channel = %channel.name,
                error = %err,
                "join failed; skipping channel"
            );
            Membership::Skipped(MembershipSkip::Failed(err.to_string()))
        }
    };
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{channel, FakeService};
    use crate::Error;

    #[tokio::test]
    async fn members_and_private_channels_need_no_call() {
        let svc = FakeService::new();
        let mut member = channel("C1", "a", 90);
        member.is_member = true;
        let mut private = channel("C2", "b", 90);
        private.is_private = true;
        let mut private_member = private.clone();
        private_member.is_member = true;

        assert_eq!(
            ensure_member(&svc, &member).await.unwrap(),
            Membership::AlreadyMember
        );
        assert_eq!(
            ensure_member(&svc, &private).await.unwrap(),
            Membership::Skipped(MembershipSkip::Private)
        );
        assert_eq!(
            ensure_member(&svc, &private_member).await.unwrap(),
            Membership::Skipped(MembershipSkip::Private)
        );
        assert_eq!(svc.calls_matching("join"), 0);
    }

    #[tokio::test]
    async fn join_outcomes_are_classified() {
        let svc = FakeService::new();
        svc.fail("join:C2", "already_in_channel");
        svc.fail("join:C3", "is_archived");
        svc.fail("join:C4", "invite_only");
        svc.fail("join:C5", "fatal_error");

        let cases = [
            ("C1", Membership::Joined),
            ("C2", Membership::AlreadyMember),
            ("C3", Membership::Skipped(MembershipSkip::Archived)),
            ("C4", Membership::Skipped(MembershipSkip::InviteOnly)),
        ];
        for (id, want) in cases {
            let got = ensure_member(&svc, &channel(id, id, 90)).await.unwrap();
            assert_eq!(got, want, "{id}");
        }
        assert_eq!(*svc.joined.lock().unwrap(), vec!["C1"]);

        let other = ensure_member(&svc, &channel("C5", "c5", 90)).await.unwrap();
        assert!(matches!(
            other,
            Membership::Skipped(MembershipSkip::Failed(ref m)) if m.contains("fatal_error")
        ));
        assert!(!other.can_read());
    }

    #[tokio::test]
    async fn permission_and_credential_failures_are_fatal() {
        let svc = FakeService::new();
        svc.fail("join:C1", "missing_scope");
        svc.fail("join:C2", "invalid_auth");

        let err = ensure_member(&svc, &channel("C1", "a", 90)).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::MissingScope));

        let err = ensure_member(&svc, &channel("C2", "b", 90)).await.unwrap_err();
        assert!(matches!(err, Error::Api(ref e) if e.kind == ErrorKind::InvalidAuth));
    }
}
