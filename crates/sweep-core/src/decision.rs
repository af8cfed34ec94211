//! Per-channel lifecycle state machine.
//!
//! ```text
//! Active --(stale, no open warning)--> Warn
//! Warned --(grace expired, nothing since)--> Archive
//! ```
//!
//! Only the decision is produced here; posting and archiving belong to
//! [`crate::actions`].

use chrono::{DateTime, Duration, Utc};

use crate::{activity::ClassifiedActivity, domain::Channel};

#[derive(Clone, Copy, Debug)]
pub struct Thresholds {
    /// Inactivity after which a channel is warned.
    pub warn_after: Duration,
    /// Time a warning stays open before archival is proposed.
    pub archive_grace: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warn_after: Duration::days(30),
            archive_grace: Duration::days(7),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Active,
    Warned,
    Archived,
}

impl LifecycleState {
    pub fn of(channel: &Channel, activity: &ClassifiedActivity) -> Self {
        if channel.is_archived {
            LifecycleState::Archived
        } else if activity.has_warning() {
            LifecycleState::Warned
        } else {
            LifecycleState::Active
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    NoAction,
    Warn,
    Archive,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleDecision {
    pub channel: Channel,
    pub activity: ClassifiedActivity,
    pub action: Action,
}

pub fn decide(
    channel: &Channel,
    activity: &ClassifiedActivity,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> Action {
    let cutoff = now - thresholds.warn_after;
    if channel.created > cutoff {
        return Action::NoAction;
    }

    match LifecycleState::of(channel, activity) {
        LifecycleState::Archived => Action::NoAction,
        LifecycleState::Warned => {
            let Some(warned_at) = activity.warning else {
                return Action::NoAction;
            };
            let grace_expired = now - warned_at > thresholds.archive_grace;
            // Anything after the warning un-stales the channel.
            let quiet_since = activity.last_activity.map_or(true, |t| t <= warned_at);
            if grace_expired && quiet_since {
                Action::Archive
            } else {
                Action::NoAction
            }
        }
        LifecycleState::Active => match activity.last_activity {
            None => Action::Warn,
            Some(t) if t < cutoff => Action::Warn,
            Some(_) => Action::NoAction,
        },
    }
}
