//! Slack Web API adapter for [`sweep_core::ports::ChannelService`].
//!
//! Every call is a form-encoded POST with the bot token as bearer auth.
//! Slack answers `200 {"ok":false,"error":"..."}` for most failures; those
//! become `Error::Api` with the raw error text, so classification stays in
//! the core. Retrying is left to the throttling decorator.

mod wire;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use sweep_core::{
    domain::{Channel, ChannelId, ChannelType, Identity, RawMessage, User},
    errors::ApiError,
    ports::ChannelService,
    Error, Result,
};

use crate::wire::{AuthTest, ChannelPage, HistoryPage, UserPage};

const PAGE_SIZE: usize = 200;
/// Upper bound on cursor pages for one listing.
const MAX_PAGES: usize = 500;

#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl SlackClient {
    pub fn new(api_base: &str, token: &str, request_timeout: Duration) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("channel-sweep"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(request_timeout.max(Duration::from_millis(1)))
            .build()
            .map_err(|e| Error::External(format!("failed to create slack client: {e}")))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
        })
    }

    /// POST `method` and decode the body once `ok` is true.
    ///
    /// `label` names the call in errors, e.g. `conversations.join(C1)`.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        label: &str,
        form: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .http
            .post(format!("{}/{method}", self.api_base))
            .bearer_auth(&self.token)
            .form(form)
            .send()
            .await
            .map_err(|e| Error::External(format!("slack {label} request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let hint = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(|s| format!(": retry after {}s", s.trim()))
                .unwrap_or_default();
            return Err(ApiError::from_remote(label, format!("rate_limited{hint}")).into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "slack {label} failed with status {}: {}",
                status.as_u16(),
                truncate(&body, 400)
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::External(format!("failed to decode slack {label}: {e}")))?;
        check_ok(label, &body)?;
        serde_json::from_value(body)
            .map_err(|e| Error::External(format!("unexpected slack {label} payload: {e}")))
    }
}

/// Map `{"ok":false}` onto `Error::Api`, keeping `needed` for scope errors.
fn check_ok(label: &str, body: &Value) -> Result<()> {
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(());
    }
    let error = body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown_error");
    let message = match body.get("needed").and_then(Value::as_str) {
        Some(needed) => format!("{error} (needed: {needed})"),
        None => error.to_string(),
    };
    Err(ApiError::from_remote(label, message).into())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

fn channel_types(types: &[ChannelType]) -> String {
    types
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl ChannelService for SlackClient {
    async fn authenticate(&self) -> Result<Identity> {
        let auth: AuthTest = self.call("auth.test", "auth.test", &[]).await?;
        Ok(auth.into())
    }

    async fn list_channels(
        &self,
        types: &[ChannelType],
        exclude_archived: bool,
    ) -> Result<Vec<Channel>> {
        let mut out = Vec::new();
        let mut cursor = String::new();
        for _ in 0..MAX_PAGES {
            let mut form = vec![
                ("types", channel_types(types)),
                ("exclude_archived", exclude_archived.to_string()),
                ("limit", PAGE_SIZE.to_string()),
            ];
            if !cursor.is_empty() {
                form.push(("cursor", cursor.clone()));
            }
            let page: ChannelPage = self
                .call("conversations.list", "conversations.list", &form)
                .await?;
            out.extend(page.channels.into_iter().map(Channel::from));

            cursor = page.response_metadata.next_cursor;
            if cursor.is_empty() {
                break;
            }
        }
        tracing::debug!(count = out.len(), "listed channels");
        Ok(out)
    }

    async fn history(&self, channel: &ChannelId, limit: usize) -> Result<Vec<RawMessage>> {
        let form = [
            ("channel", channel.0.clone()),
            ("limit", limit.to_string()),
        ];
        let page: HistoryPage = self
            .call(
                "conversations.history",
                &format!("conversations.history({channel})"),
                &form,
            )
            .await?;
        Ok(page.messages.into_iter().map(RawMessage::from).collect())
    }

    async fn post_message(&self, channel: &ChannelId, text: &str) -> Result<()> {
        let form = [
            ("channel", channel.0.clone()),
            ("text", text.to_string()),
            ("unfurl_links", "false".to_string()),
            ("unfurl_media", "false".to_string()),
        ];
        let _: Value = self
            .call(
                "chat.postMessage",
                &format!("chat.postMessage({channel})"),
                &form,
            )
            .await?;
        Ok(())
    }

    async fn join_channel(&self, channel: &ChannelId) -> Result<()> {
        let form = [("channel", channel.0.clone())];
        let _: Value = self
            .call(
                "conversations.join",
                &format!("conversations.join({channel})"),
                &form,
            )
            .await?;
        Ok(())
    }

    async fn archive_channel(&self, channel: &ChannelId) -> Result<()> {
        let form = [("channel", channel.0.clone())];
        let _: Value = self
            .call(
                "conversations.archive",
                &format!("conversations.archive({channel})"),
                &form,
            )
            .await?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let mut out = Vec::new();
        let mut cursor = String::new();
        for _ in 0..MAX_PAGES {
            let mut form = vec![("limit", PAGE_SIZE.to_string())];
            if !cursor.is_empty() {
                form.push(("cursor", cursor.clone()));
            }
            let page: UserPage = self.call("users.list", "users.list", &form).await?;
            out.extend(page.members.into_iter().map(User::from));

            cursor = page.response_metadata.next_cursor;
            if cursor.is_empty() {
                break;
            }
        }
        Ok(out)
    }
}
