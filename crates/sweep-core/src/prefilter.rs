//! Metadata-only triage before any history call.

use chrono::{DateTime, Utc};

use crate::domain::{parse_ts, Channel, Identity};

pub const DEFAULT_EXCLUDED_NAMES: &[&str] = &["general", "random", "announcements"];
pub const DEFAULT_EXCLUDED_PREFIXES: &[&str] = &["admin-", "ops-"];
pub const DEFAULT_KEEP_MARKER: &str = "%noarchive";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Exclusion {
    Name(String),
    Prefix(String),
    KeepMarker,
    General,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Triage {
    /// Created after the warn cutoff; cannot qualify yet.
    TooNew,
    Excluded(Exclusion),
    /// The listing's latest-message hint is newer than the cutoff.
    RecentlyActive,
    Candidate,
}

#[derive(Clone, Debug)]
pub struct ExclusionRules {
    pub names: Vec<String>,
    pub prefixes: Vec<String>,
    /// Purpose substring that opts a channel out of the sweep.
    pub keep_marker: Option<String>,
}

impl Default for ExclusionRules {
    fn default() -> Self {
        Self {
            names: DEFAULT_EXCLUDED_NAMES.iter().map(|s| s.to_string()).collect(),
            prefixes: DEFAULT_EXCLUDED_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            keep_marker: Some(DEFAULT_KEEP_MARKER.to_string()),
        }
    }
}

impl ExclusionRules {
    pub fn check(&self, channel: &Channel) -> Option<Exclusion> {
        if channel.is_general {
            return Some(Exclusion::General);
        }
        let name = channel.name.to_lowercase();
        if let Some(n) = self.names.iter().find(|n| n.to_lowercase() == name) {
            return Some(Exclusion::Name(n.clone()));
        }
        if let Some(p) = self
            .prefixes
            .iter()
            .find(|p| !p.is_empty() && name.starts_with(&p.to_lowercase()))
        {
            return Some(Exclusion::Prefix(p.clone()));
        }
        if let Some(marker) = self.keep_marker.as_deref().filter(|m| !m.is_empty()) {
            if channel
                .purpose
                .to_lowercase()
                .contains(&marker.to_lowercase())
            {
                return Some(Exclusion::KeepMarker);
            }
        }
        None
    }
}

/// Classify one channel against `cutoff = now - warn_after`.
///
/// A missing or unparsable latest-message hint never skips a channel, and
/// neither does a hint pointing at one of our own posts (our warning is not
/// activity).
pub fn triage(
    channel: &Channel,
    rules: &ExclusionRules,
    cutoff: DateTime<Utc>,
    me: &Identity,
) -> Triage {
    if channel.created > cutoff {
        return Triage::TooNew;
    }
    if let Some(ex) = rules.check(channel) {
        return Triage::Excluded(ex);
    }
    let ours = me.authored(channel.latest_user.as_ref(), channel.latest_bot_id.as_deref());
    let hint = channel.latest_ts.as_deref().and_then(parse_ts);
    if !ours && matches!(hint, Some(latest) if latest > cutoff) {
        return Triage::RecentlyActive;
    }
    Triage::Candidate
}

#[derive(Debug, Default)]
pub struct Partition {
    pub candidates: Vec<Channel>,
    pub skipped: Vec<(Channel, Triage)>,
}

pub fn partition(
    channels: Vec<Channel>,
    rules: &ExclusionRules,
    cutoff: DateTime<Utc>,
    me: &Identity,
) -> Partition {
    let mut out = Partition::default();
    for channel in channels {
        match triage(&channel, rules, cutoff, me) {
            Triage::Candidate => out.candidates.push(channel),
            other => out.skipped.push((channel, other)),
        }
    }
    out
}
