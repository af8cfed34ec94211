//! Infer "last real activity" and open warnings from channel history.

use chrono::{DateTime, Utc};

use crate::{
    domain::{ChannelId, Identity, RawMessage},
    ports::ChannelService,
    Result,
};

/// Messages fetched for the cheap first pass.
pub const SHALLOW_WINDOW: usize = 10;
/// Messages fetched when the first pass is inconclusive.
pub const DEEP_WINDOW: usize = 50;

/// Message subtypes generated by the service itself.
pub const SYSTEM_SUBTYPES: &[&str] = &[
    "channel_join",
    "channel_leave",
    "channel_topic",
    "channel_purpose",
    "channel_name",
    "channel_archive",
    "channel_unarchive",
    "channel_convert_to_private",
    "channel_convert_to_public",
    "group_join",
    "group_leave",
    "group_topic",
    "group_purpose",
    "group_name",
    "group_archive",
    "group_unarchive",
    "pinned_item",
    "unpinned_item",
    "bot_add",
    "bot_remove",
];

/// Body phrases of system notices that arrive without a subtype (lowercase).
pub const SYSTEM_PHRASES: &[&str] = &[
    "has joined the channel",
    "has left the channel",
    "was added to this channel",
    "was removed from this channel",
    "set the channel topic:",
    "set the channel purpose:",
    "set the channel description:",
    "cleared channel topic",
    "cleared channel purpose",
    "renamed the channel from",
    "archived the channel",
    "un-archived the channel",
    "pinned a message to this channel",
    "unpinned a message from this channel",
];

/// Real messages are user content, not service notices.
pub fn is_real(msg: &RawMessage) -> bool {
    if let Some(subtype) = msg.subtype.as_deref() {
        if SYSTEM_SUBTYPES.contains(&subtype) {
            return false;
        }
    }
    let lower = msg.text.to_lowercase();
    if SYSTEM_PHRASES.iter().any(|p| lower.contains(p)) {
        return false;
    }
    !msg.text.trim().is_empty() || msg.has_attachments
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivitySource {
    /// A real message not authored by us.
    User,
    /// No user activity in the scanned window; oldest message timestamp.
    Fallback,
    /// Empty history.
    NoHistory,
}

/// Per-sweep activity facts for one channel. Never cached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifiedActivity {
    pub last_activity: Option<DateTime<Utc>>,
    pub source: ActivitySource,
    /// Latest warning marker with no user activity after it.
    pub warning: Option<DateTime<Utc>>,
    pub scanned: usize,
}

impl ClassifiedActivity {
    pub fn no_history() -> Self {
        Self {
            last_activity: None,
            source: ActivitySource::NoHistory,
            warning: None,
            scanned: 0,
        }
    }

    pub fn has_warning(&self) -> bool {
        self.warning.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct ActivityClassifier {
    bot: Identity,
    marker: String,
}

impl ActivityClassifier {
    pub fn new(bot: Identity, warning_marker: &str) -> Self {
        Self {
            bot,
            marker: warning_marker.trim().to_lowercase(),
        }
    }

    pub fn is_warning_marker(&self, msg: &RawMessage) -> bool {
        !self.marker.is_empty()
            && self.bot.is_author(msg)
            && msg.text.to_lowercase().contains(&self.marker)
    }

    fn is_user_activity(&self, msg: &RawMessage) -> bool {
        is_real(msg) && !self.bot.is_author(msg)
    }

    /// First pass over the newest messages.
    ///
    /// Resolves only when the most recent real message is user-authored.
    pub fn shallow(&self, messages: &[RawMessage]) -> Option<DateTime<Utc>> {
        let latest_real = messages
            .iter()
            .take(SHALLOW_WINDOW)
            .find(|m| is_real(m))?;
        if self.bot.is_author(latest_real) {
            return None;
        }
        latest_real.timestamp()
    }

    /// Full pass: latest user activity, latest open warning, oldest fallback.
    pub fn deep(&self, messages: &[RawMessage]) -> ClassifiedActivity {
        let mut last_user: Option<DateTime<Utc>> = None;
        let mut last_warning: Option<DateTime<Utc>> = None;
        let mut oldest: Option<DateTime<Utc>> = None;

        for msg in messages {
            let Some(ts) = msg.timestamp() else {
                continue;
            };
            oldest = Some(oldest.map_or(ts, |o| o.min(ts)));

            if self.is_warning_marker(msg) {
                last_warning = Some(last_warning.map_or(ts, |w| w.max(ts)));
            } else if self.is_user_activity(msg) {
                last_user = Some(last_user.map_or(ts, |u| u.max(ts)));
            }
        }

        // A user speaking after the warning closes it.
        let warning = match (last_warning, last_user) {
            (Some(w), Some(u)) if u > w => None,
            (w, _) => w,
        };

        let (last_activity, source) = match (last_user, oldest) {
            (Some(u), _) => (Some(u), ActivitySource::User),
            (None, Some(o)) => (Some(o), ActivitySource::Fallback),
            (None, None) => (None, ActivitySource::NoHistory),
        };

        ClassifiedActivity {
            last_activity,
            source,
            warning,
            scanned: messages.len(),
        }
    }

    /// Classify an already-fetched, newest-first history.
    pub fn classify(&self, messages: &[RawMessage]) -> ClassifiedActivity {
        if let Some(ts) = self.shallow(messages) {
            return ClassifiedActivity {
                last_activity: Some(ts),
                source: ActivitySource::User,
                warning: None,
                scanned: messages.len().min(SHALLOW_WINDOW),
            };
        }
        self.deep(messages)
    }

    /// Two-stage fetch: one shallow history call, a deep one only when needed.
    pub async fn inspect(
        &self,
        service: &dyn ChannelService,
        channel: &ChannelId,
    ) -> Result<ClassifiedActivity> {
        let recent = service.history(channel, SHALLOW_WINDOW).await?;
        if recent.is_empty() {
            return Ok(ClassifiedActivity::no_history());
        }
        if let Some(ts) = self.shallow(&recent) {
            return Ok(ClassifiedActivity {
                last_activity: Some(ts),
                source: ActivitySource::User,
                warning: None,
                scanned: recent.len(),
            });
        }
        // A short page is already the whole history.
        if recent.len() < SHALLOW_WINDOW {
            return Ok(self.deep(&recent));
        }

        tracing::debug!(channel = %channel, "shallow scan inconclusive; deep scan");
        let older = service.history(channel, DEEP_WINDOW).await?;
        Ok(self.deep(&older))
    }
}
