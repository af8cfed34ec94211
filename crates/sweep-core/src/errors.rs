/// Typed classification of a remote failure.
///
/// The chat service reports every failure as free text (`{"ok":false,"error":"..."}`),
/// so meaning is carried by well-known substrings. [`ErrorKind::classify`] is the only
/// place that inspects those strings; everything downstream matches on the enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RateLimited,
    MissingScope,
    InvalidAuth,
    ChannelNotFound,
    NotInChannel,
    AlreadyInChannel,
    AlreadyArchived,
    IsArchived,
    InviteOnly,
    Other,
}

/// Substring → kind table, checked in order against the lowercased error text.
pub const ERROR_PATTERNS: &[(&str, ErrorKind)] = &[
    ("rate_limited", ErrorKind::RateLimited),
    ("ratelimited", ErrorKind::RateLimited),
    ("missing_scope", ErrorKind::MissingScope),
    ("invalid_auth", ErrorKind::InvalidAuth),
    ("not_authed", ErrorKind::InvalidAuth),
    ("token_revoked", ErrorKind::InvalidAuth),
    ("account_inactive", ErrorKind::InvalidAuth),
    ("channel_not_found", ErrorKind::ChannelNotFound),
    ("already_in_channel", ErrorKind::AlreadyInChannel),
    ("not_in_channel", ErrorKind::NotInChannel),
    ("already_archived", ErrorKind::AlreadyArchived),
    ("is_archived", ErrorKind::IsArchived),
    ("invite_only", ErrorKind::InviteOnly),
    ("method_not_supported_for_channel_type", ErrorKind::InviteOnly),
];

impl ErrorKind {
    pub fn classify(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        ERROR_PATTERNS
            .iter()
            .find(|(pat, _)| lower.contains(pat))
            .map(|(_, kind)| *kind)
            .unwrap_or(ErrorKind::Other)
    }

    /// Errors that make every later call in the sweep pointless.
    ///
    /// A rate limit only gets this far when nothing retried it; the limit is
    /// workspace-wide, so pressing on is pointless.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::MissingScope | ErrorKind::InvalidAuth | ErrorKind::RateLimited
        )
    }

    /// The requested end state already holds (double join, double archive).
    pub fn is_already_satisfied(self) -> bool {
        matches!(self, ErrorKind::AlreadyInChannel | ErrorKind::AlreadyArchived)
    }

    /// Per-channel conditions: log and move on to the next channel.
    pub fn is_skippable(self) -> bool {
        matches!(
            self,
            ErrorKind::IsArchived
                | ErrorKind::InviteOnly
                | ErrorKind::NotInChannel
                | ErrorKind::ChannelNotFound
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::MissingScope => "missing_scope",
            ErrorKind::InvalidAuth => "invalid_auth",
            ErrorKind::ChannelNotFound => "channel_not_found",
            ErrorKind::NotInChannel => "not_in_channel",
            ErrorKind::AlreadyInChannel => "already_in_channel",
            ErrorKind::AlreadyArchived => "already_archived",
            ErrorKind::IsArchived => "is_archived",
            ErrorKind::InviteOnly => "invite_only",
            ErrorKind::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed remote call, already classified.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed ({kind}): {message}")]
pub struct ApiError {
    /// Remote method plus target, e.g. `conversations.join(C0123)`.
    pub operation: String,
    pub kind: ErrorKind,
    /// Raw remote error text.
    pub message: String,
}

impl ApiError {
    pub fn from_remote(operation: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            operation: operation.into(),
            kind: ErrorKind::classify(&message),
            message,
        }
    }
}

/// Core error type.
///
/// Adapter crates map their transport errors into this type so the sweep can
/// tell fatal failures from per-channel ones.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("{operation} still rate limited after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last: ApiError,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Api(e) => Some(e.kind),
            Error::RetriesExhausted { .. } => Some(ErrorKind::RateLimited),
            _ => None,
        }
    }

    /// Whether the error must end the whole sweep.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Api(e) => e.kind.is_fatal(),
            Error::RetriesExhausted { .. } | Error::Cancelled | Error::Config(_) => true,
            Error::External(_) => false,
        }
    }

    /// Operator-facing fix for fatal credential/permission failures.
    pub fn remediation(&self) -> Option<String> {
        match self.kind()? {
            ErrorKind::MissingScope => Some(match self {
                Error::Api(e) => format!(
                    "the bot token lacks a required OAuth scope ({}); add it under \
                     OAuth & Permissions and reinstall the app",
                    e.message
                ),
                _ => "the bot token lacks a required OAuth scope".to_string(),
            }),
            ErrorKind::InvalidAuth => Some(
                "SLACK_BOT_TOKEN was rejected; check that it is current and belongs to \
                 this workspace"
                    .to_string(),
            ),
            ErrorKind::RateLimited => Some(
                "the workspace rate limit kept rejecting calls; raise \
                 MIN_REQUEST_INTERVAL_MS or run the sweep less often"
                    .to_string(),
            ),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_covers_every_pattern() {
        for (pat, kind) in ERROR_PATTERNS {
            assert_eq!(ErrorKind::classify(pat), *kind, "pattern {pat}");
        }
    }

    #[test]
    fn classify_matches_inside_free_text() {
        assert_eq!(
            ErrorKind::classify("slack error: rate_limited (retry after 30s)"),
            ErrorKind::RateLimited
        );
        assert_eq!(
            ErrorKind::classify("MISSING_SCOPE needed=channels:join"),
            ErrorKind::MissingScope
        );
        assert_eq!(ErrorKind::classify("something odd"), ErrorKind::Other);
    }

    #[test]
    fn already_in_channel_is_not_mistaken_for_not_in_channel() {
        assert_eq!(
            ErrorKind::classify("already_in_channel"),
            ErrorKind::AlreadyInChannel
        );
        assert!(ErrorKind::AlreadyInChannel.is_already_satisfied());
        assert!(ErrorKind::NotInChannel.is_skippable());
    }

    #[test]
    fn fatal_errors() {
        let scope = Error::Api(ApiError::from_remote("conversations.join(C1)", "missing_scope"));
        assert!(scope.is_fatal());
        assert!(scope.remediation().unwrap().contains("OAuth scope"));

        let archived = Error::Api(ApiError::from_remote("conversations.join(C1)", "is_archived"));
        assert!(!archived.is_fatal());
        assert!(archived.remediation().is_none());

        let exhausted = Error::RetriesExhausted {
            operation: "conversations.history(C1)".to_string(),
            attempts: 3,
            last: ApiError::from_remote("conversations.history(C1)", "ratelimited"),
        };
        assert!(exhausted.is_fatal());
        assert_eq!(exhausted.kind(), Some(ErrorKind::RateLimited));
        assert!(exhausted.to_string().contains("after 3 attempts"));

        assert!(Error::Cancelled.is_fatal());
    }
}
