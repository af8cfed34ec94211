//! Notification text: placeholder templates and Slack mrkdwn escaping.

use std::collections::HashMap;

use crate::domain::{User, UserId};

pub const DEFAULT_WARNING_TEMPLATE: &str = "Hi {creator}! #{channel} has been flagged as inactive: \
nobody has posted here for {days} days. It will be archived in {grace_days} days unless \
someone posts a message. Archived channels can be restored at any time.";

pub const DEFAULT_ARCHIVE_TEMPLATE: &str = "#{channel} saw no activity for {days} days after \
its inactivity warning and is being archived. Any member can unarchive it if it is still needed.";

/// Escape the three characters Slack treats as control sequences in message text.
pub fn escape_mrkdwn(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[derive(Clone, Debug)]
pub struct TemplateVars {
    pub channel: String,
    pub days: i64,
    pub grace_days: i64,
    /// Already-rendered mention or fallback text; inserted verbatim.
    pub creator: String,
}

/// Fill `{channel}`, `{days}`, `{grace_days}` and `{creator}`.
///
/// Unknown placeholders are left untouched.
pub fn render(template: &str, vars: &TemplateVars) -> String {
    template
        .replace("{channel}", &escape_mrkdwn(&vars.channel))
        .replace("{grace_days}", &vars.grace_days.to_string())
        .replace("{days}", &vars.days.to_string())
        .replace("{creator}", &vars.creator)
}

/// Mention the creator if they are still an active human user.
pub fn creator_mention(creator: Option<&UserId>, users: &HashMap<UserId, User>) -> String {
    match creator.and_then(|id| users.get(id)) {
        Some(u) if !u.deleted && !u.is_bot => format!("<@{}>", u.id),
        _ => "a former member".to_string(),
    }
}
