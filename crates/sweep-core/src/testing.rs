//! In-memory ChannelService and fixtures shared by unit tests.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::{
    domain::{format_ts, Channel, ChannelId, ChannelType, Identity, RawMessage, User, UserId},
    errors::ApiError,
    ports::ChannelService,
    Error, Result,
};

pub const BOT: &str = "UBOT";

pub fn now() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).single().unwrap()
}

pub fn ts_ago(days: i64) -> String {
    format_ts(now() - Duration::days(days))
}

pub fn bot_identity() -> Identity {
    Identity {
        user_id: UserId(BOT.to_string()),
        team_id: "T1".to_string(),
        bot_id: Some("B1".to_string()),
    }
}

pub fn msg(ts: &str, user: &str, text: &str) -> RawMessage {
    RawMessage {
        ts: ts.to_string(),
        user: Some(UserId(user.to_string())),
        bot_id: None,
        text: text.to_string(),
        subtype: None,
        has_attachments: false,
    }
}

pub fn system_msg(ts: &str, subtype: &str, text: &str) -> RawMessage {
    RawMessage {
        subtype: Some(subtype.to_string()),
        ..msg(ts, "U9", text)
    }
}

pub fn channel(id: &str, name: &str, created_days_ago: i64) -> Channel {
    Channel {
        id: ChannelId(id.to_string()),
        name: name.to_string(),
        created: now() - Duration::days(created_days_ago),
        latest_ts: None,
        latest_user: None,
        latest_bot_id: None,
        purpose: String::new(),
        creator: Some(UserId("U1".to_string())),
        member_count: 3,
        is_archived: false,
        is_private: false,
        is_member: false,
        is_general: false,
    }
}

#[derive(Default)]
pub struct FakeService {
    pub channels: Mutex<Vec<Channel>>,
    pub users: Mutex<Vec<User>>,
    histories: Mutex<HashMap<String, Vec<RawMessage>>>,
    errors: Mutex<HashMap<String, String>>,
    pub calls: Mutex<Vec<String>>,
    pub posts: Mutex<Vec<(String, String)>>,
    pub joined: Mutex<Vec<String>>,
    pub archived: Mutex<Vec<String>>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channels(channels: Vec<Channel>) -> Self {
        let svc = Self::new();
        *svc.channels.lock().unwrap() = channels;
        svc
    }

    pub fn set_history(&self, channel: &str, messages: Vec<RawMessage>) {
        self.histories
            .lock()
            .unwrap()
            .insert(channel.to_string(), messages);
    }

    /// Fail `method` (e.g. `"join:C1"`, `"history:C1"`, `"list"`) with `text`.
    pub fn fail(&self, key: &str, text: &str) {
        self.errors
            .lock()
            .unwrap()
            .insert(key.to_string(), text.to_string());
    }

    /// Count calls to `key` exactly (`"join:C1"`) or to a whole method (`"join"`).
    pub fn calls_matching(&self, key: &str) -> usize {
        let method = format!("{key}:");
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| *c == key || c.starts_with(&method))
            .count()
    }

    fn record(&self, key: String) -> Result<()> {
        self.calls.lock().unwrap().push(key.clone());
        match self.errors.lock().unwrap().get(&key) {
            Some(text) => Err(Error::Api(ApiError::from_remote(key.clone(), text.clone()))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChannelService for FakeService {
    async fn authenticate(&self) -> Result<Identity> {
        self.record("auth".to_string())?;
        Ok(bot_identity())
    }

    async fn list_channels(
        &self,
        _types: &[ChannelType],
        exclude_archived: bool,
    ) -> Result<Vec<Channel>> {
        self.record("list".to_string())?;
        Ok(self
            .channels
            .lock()
            .unwrap()
            .iter()
            .filter(|c| !(exclude_archived && c.is_archived))
            .cloned()
            .collect())
    }

    async fn history(&self, channel: &ChannelId, limit: usize) -> Result<Vec<RawMessage>> {
        self.record(format!("history:{channel}"))?;
        Ok(self
            .histories
            .lock()
            .unwrap()
            .get(&channel.0)
            .map(|h| h.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn post_message(&self, channel: &ChannelId, text: &str) -> Result<()> {
        self.record(format!("post:{channel}"))?;
        self.posts
            .lock()
            .unwrap()
            .push((channel.0.clone(), text.to_string()));
        Ok(())
    }

    async fn join_channel(&self, channel: &ChannelId) -> Result<()> {
        self.record(format!("join:{channel}"))?;
        self.joined.lock().unwrap().push(channel.0.clone());
        Ok(())
    }

    async fn archive_channel(&self, channel: &ChannelId) -> Result<()> {
        self.record(format!("archive:{channel}"))?;
        self.archived.lock().unwrap().push(channel.0.clone());
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.record("users".to_string())?;
        Ok(self.users.lock().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn calls_matching_does_not_confuse_similar_ids() {
        let svc = FakeService::new();
        svc.join_channel(&ChannelId("C10".to_string())).await.unwrap();
        svc.join_channel(&ChannelId("C1".to_string())).await.unwrap();
        assert_eq!(svc.calls_matching("join:C1"), 1);
        assert_eq!(svc.calls_matching("join"), 2);
        assert_eq!(svc.calls_matching("jo"), 0);
    }
}
