use async_trait::async_trait;

use crate::{
    domain::{Channel, ChannelId, ChannelType, Identity, RawMessage, User},
    Result,
};

/// Hexagonal port for the remote chat service.
///
/// Implementations report remote failures as `Error::Api` with the raw error text
/// classified through [`crate::errors::ErrorKind::classify`]. Throttling and retry
/// live in the [`crate::throttle::ThrottledService`] decorator, not in adapters.
#[async_trait]
pub trait ChannelService: Send + Sync {
    async fn authenticate(&self) -> Result<Identity>;

    async fn list_channels(
        &self,
        types: &[ChannelType],
        exclude_archived: bool,
    ) -> Result<Vec<Channel>>;

    /// Most recent `limit` messages, newest first.
    async fn history(&self, channel: &ChannelId, limit: usize) -> Result<Vec<RawMessage>>;

    async fn post_message(&self, channel: &ChannelId, text: &str) -> Result<()>;

    async fn join_channel(&self, channel: &ChannelId) -> Result<()>;

    async fn archive_channel(&self, channel: &ChannelId) -> Result<()>;

    async fn list_users(&self) -> Result<Vec<User>>;
}
