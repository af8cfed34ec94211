use chrono::{DateTime, TimeZone, Utc};

/// Opaque channel id (`C0123ABCD`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub String);

/// Opaque user id (`U0123ABCD`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub String);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who the sweep runs as (result of `auth.test`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub team_id: String,
    /// App bot id; messages posted through the app carry it instead of a user id.
    pub bot_id: Option<String>,
}

impl Identity {
    pub fn is_author(&self, msg: &RawMessage) -> bool {
        self.authored(msg.user.as_ref(), msg.bot_id.as_deref())
    }

    /// Whether a message with this `user` / `bot_id` pair was posted by us.
    pub fn authored(&self, user: Option<&UserId>, bot_id: Option<&str>) -> bool {
        if user == Some(&self.user_id) {
            return true;
        }
        matches!((self.bot_id.as_deref(), bot_id), (Some(ours), Some(theirs)) if ours == theirs)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelType {
    Public,
    Private,
}

impl ChannelType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelType::Public => "public_channel",
            ChannelType::Private => "private_channel",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub created: DateTime<Utc>,
    /// Cheap "latest message" hint from the listing, in service-native form.
    pub latest_ts: Option<String>,
    /// Author of the latest message, when the listing carries it.
    pub latest_user: Option<UserId>,
    pub latest_bot_id: Option<String>,
    pub purpose: String,
    pub creator: Option<UserId>,
    pub member_count: u32,
    pub is_archived: bool,
    pub is_private: bool,
    pub is_member: bool,
    /// The workspace default channel; the service refuses to archive it.
    pub is_general: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawMessage {
    /// Service-native timestamp, `"1700000000.000100"`.
    pub ts: String,
    pub user: Option<UserId>,
    pub bot_id: Option<String>,
    pub text: String,
    pub subtype: Option<String>,
    pub has_attachments: bool,
}

impl RawMessage {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_ts(&self.ts)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub real_name: Option<String>,
    pub deleted: bool,
    pub is_bot: bool,
}

/// Parse a fractional-seconds timestamp (`"1700000000.000100"`).
///
/// Returns `None` for empty, negative, or non-numeric input.
pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let (secs, frac) = match raw.split_once('.') {
        Some((s, f)) => (s, f),
        None => (raw, ""),
    };
    let secs: i64 = secs.parse().ok()?;
    if secs < 0 {
        return None;
    }
    let nanos = if frac.is_empty() {
        0
    } else {
        if !frac.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        // Right-pad/truncate to nine digits.
        let mut digits: String = frac.chars().take(9).collect();
        while digits.len() < 9 {
            digits.push('0');
        }
        digits.parse::<u32>().ok()?
    };
    Utc.timestamp_opt(secs, nanos).single()
}

/// Inverse of [`parse_ts`] at microsecond precision.
pub fn format_ts(t: DateTime<Utc>) -> String {
    format!("{}.{:06}", t.timestamp(), t.timestamp_subsec_micros())
}
