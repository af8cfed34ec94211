//! Slack Web API payloads and their mapping onto core domain types.

use chrono::{TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use sweep_core::domain::{Channel, ChannelId, Identity, RawMessage, User, UserId};

#[derive(Debug, Deserialize)]
pub(crate) struct AuthTest {
    pub user_id: String,
    #[serde(default)]
    pub team_id: String,
    pub bot_id: Option<String>,
}

impl From<AuthTest> for Identity {
    fn from(a: AuthTest) -> Self {
        Identity {
            user_id: UserId(a.user_id),
            team_id: a.team_id,
            bot_id: a.bot_id.filter(|b| !b.is_empty()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ResponseMetadata {
    #[serde(default)]
    pub next_cursor: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelPage {
    #[serde(default)]
    pub channels: Vec<WireChannel>,
    #[serde(default)]
    pub response_metadata: ResponseMetadata,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Purpose {
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireChannel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub purpose: Purpose,
    #[serde(default)]
    pub num_members: u32,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_member: bool,
    #[serde(default)]
    pub is_general: bool,
    /// Either a message object or a bare `ts` string, depending on the endpoint.
    #[serde(default)]
    pub latest: Option<Value>,
}

impl WireChannel {
    fn latest_ts(&self) -> Option<String> {
        match self.latest.as_ref()? {
            Value::String(ts) => Some(ts.clone()),
            Value::Object(m) => m.get("ts").and_then(Value::as_str).map(str::to_string),
            _ => None,
        }
    }

    /// Field of the latest message object; absent for the bare `ts` shape.
    fn latest_field(&self, key: &str) -> Option<String> {
        self.latest
            .as_ref()?
            .get(key)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

impl From<WireChannel> for Channel {
    fn from(w: WireChannel) -> Self {
        let latest_ts = w.latest_ts();
        let latest_user = w.latest_field("user").map(UserId);
        let latest_bot_id = w.latest_field("bot_id");
        Channel {
            id: ChannelId(w.id),
            name: w.name,
            created: Utc
                .timestamp_opt(w.created, 0)
                .single()
                .unwrap_or_default(),
            latest_ts,
            latest_user,
            latest_bot_id,
            purpose: w.purpose.value,
            creator: w.creator.filter(|c| !c.is_empty()).map(UserId),
            member_count: w.num_members,
            is_archived: w.is_archived,
            is_private: w.is_private,
            is_member: w.is_member,
            is_general: w.is_general,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryPage {
    #[serde(default)]
    pub messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireMessage {
    #[serde(default)]
    pub ts: String,
    pub user: Option<String>,
    pub bot_id: Option<String>,
    #[serde(default)]
    pub text: String,
    pub subtype: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Value>,
    #[serde(default)]
    pub files: Vec<Value>,
}

impl From<WireMessage> for RawMessage {
    fn from(m: WireMessage) -> Self {
        RawMessage {
            has_attachments: !m.attachments.is_empty() || !m.files.is_empty(),
            ts: m.ts,
            user: m.user.filter(|u| !u.is_empty()).map(UserId),
            bot_id: m.bot_id.filter(|b| !b.is_empty()),
            text: m.text,
            subtype: m.subtype,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserPage {
    #[serde(default)]
    pub members: Vec<WireUser>,
    #[serde(default)]
    pub response_metadata: ResponseMetadata,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub real_name: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub is_bot: bool,
}

impl From<WireUser> for User {
    fn from(u: WireUser) -> Self {
        User {
            // Slackbot predates bot users and reports is_bot=false.
            is_bot: u.is_bot || u.id == "USLACKBOT",
            id: UserId(u.id),
            name: u.name,
            real_name: u.real_name.filter(|n| !n.is_empty()),
            deleted: u.deleted,
        }
    }
}
