//! One sweep: list → triage → join → classify → decide.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    activity::ActivityClassifier,
    decision::{decide, Action, LifecycleDecision, Thresholds},
    domain::{Channel, ChannelType, Identity},
    errors::ErrorKind,
    membership::{ensure_member, Membership, MembershipSkip},
    ports::ChannelService,
    prefilter::{partition, ExclusionRules, Triage},
    Error, Result,
};

#[derive(Clone, Debug)]
pub struct SweepSettings {
    pub thresholds: Thresholds,
    pub exclusions: ExclusionRules,
    pub warning_marker: String,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            exclusions: ExclusionRules::default(),
            warning_marker: "flagged as inactive".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Triage(Triage),
    Membership(MembershipSkip),
    /// History could not be read (archived meanwhile, kicked, unclassified error).
    History(String),
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub to_warn: Vec<LifecycleDecision>,
    pub to_archive: Vec<LifecycleDecision>,
    pub skipped: Vec<(Channel, SkipReason)>,
    pub listed: usize,
    pub inspected: usize,
    /// Fatal error that ended the sweep early; the lists above hold what was
    /// decided before it.
    pub aborted: Option<Error>,
}

impl SweepReport {
    pub fn is_complete(&self) -> bool {
        self.aborted.is_none()
    }

    pub fn summary(&self) -> String {
        format!(
            "listed={} inspected={} warn={} archive={} skipped={}{}",
            self.listed,
            self.inspected,
            self.to_warn.len(),
            self.to_archive.len(),
            self.skipped.len(),
            if self.aborted.is_some() {
                " (aborted)"
            } else {
                ""
            }
        )
    }

    fn skip(&mut self, channel: Channel, reason: SkipReason) {
        tracing::debug!(channel = %channel.name, ?reason, "skipped");
        self.skipped.push((channel, reason));
    }
}

pub struct Sweeper {
    service: Arc<dyn ChannelService>,
    identity: Identity,
    classifier: ActivityClassifier,
    settings: SweepSettings,
}

impl Sweeper {
    /// `service` should already be throttled; `identity` is who we run as.
    pub fn new(
        service: Arc<dyn ChannelService>,
        identity: Identity,
        settings: SweepSettings,
    ) -> Self {
        let classifier = ActivityClassifier::new(identity.clone(), &settings.warning_marker);
        Self {
            service,
            identity,
            classifier,
            settings,
        }
    }

    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Same remote state and `now` always produce the same lists.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        if let Err(e) = self.run(now, &mut report).await {
            tracing::error!(error = %e, "sweep aborted");
            report.aborted = Some(e);
        }
        tracing::info!(summary = %report.summary(), "sweep finished");
        report
    }

    async fn run(&self, now: DateTime<Utc>, report: &mut SweepReport) -> Result<()> {
        // Private channels are never swept, so they aren't listed either.
        let channels = self
            .service
            .list_channels(&[ChannelType::Public], true)
            .await?;
        report.listed = channels.len();

        let cutoff = now - self.settings.thresholds.warn_after;
        let part = partition(channels, &self.settings.exclusions, cutoff, &self.identity);
        for (channel, triage) in part.skipped {
            report.skip(channel, SkipReason::Triage(triage));
        }
        tracing::info!(
            listed = report.listed,
            candidates = part.candidates.len(),
            "pre-filter done"
        );

        let mut readable = Vec::with_capacity(part.candidates.len());
        for channel in part.candidates {
            match ensure_member(self.service.as_ref(), &channel).await? {
                Membership::Skipped(why) => report.skip(channel, SkipReason::Membership(why)),
                Membership::Joined | Membership::AlreadyMember => readable.push(channel),
            }
        }

        for channel in readable {
            let activity = match self
                .classifier
                .inspect(self.service.as_ref(), &channel.id)
                .await
            {
                Ok(a) => a,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    if e.kind().is_some_and(ErrorKind::is_skippable) {
                        tracing::info!(channel = %channel.name, error = %e, "history unavailable");
                    } else {
                        tracing::warn!(channel = %channel.name, error = %e, "history unavailable");
                    }
                    report.skip(channel, SkipReason::History(e.to_string()));
                    continue;
                }
            };
            report.inspected += 1;

            let action = decide(&channel, &activity, &self.settings.thresholds, now);
            let decision = LifecycleDecision {
                channel,
                activity,
                action,
            };
            match action {
                Action::Warn => report.to_warn.push(decision),
                Action::Archive => report.to_archive.push(decision),
                Action::NoAction => {}
            }
        }
        Ok(())
    }
}
