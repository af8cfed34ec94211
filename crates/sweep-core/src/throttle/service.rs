use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{Channel, ChannelId, ChannelType, Identity, RawMessage, User},
    ports::ChannelService,
    throttle::{limiter::RateLimiter, retry::RetryPolicy},
    Result,
};

/// ChannelService decorator that throttles and retries every call.
///
/// All call sites share one limiter, so a rate-limit signal on any method slows
/// down every other method too.
pub struct ThrottledService {
    inner: Arc<dyn ChannelService>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl ThrottledService {
    pub fn new(
        inner: Arc<dyn ChannelService>,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner,
            limiter,
            policy,
            cancel,
        }
    }
}

#[async_trait]
impl ChannelService for ThrottledService {
    async fn authenticate(&self) -> Result<Identity> {
        self.policy
            .run(&self.limiter, &self.cancel, "auth.test", || {
                self.inner.authenticate()
            })
            .await
    }

    async fn list_channels(
        &self,
        types: &[ChannelType],
        exclude_archived: bool,
    ) -> Result<Vec<Channel>> {
        self.policy
            .run(&self.limiter, &self.cancel, "conversations.list", || {
                self.inner.list_channels(types, exclude_archived)
            })
            .await
    }

    async fn history(&self, channel: &ChannelId, limit: usize) -> Result<Vec<RawMessage>> {
        let op = format!("conversations.history({channel})");
        self.policy
            .run(&self.limiter, &self.cancel, &op, || {
                self.inner.history(channel, limit)
            })
            .await
    }

    async fn post_message(&self, channel: &ChannelId, text: &str) -> Result<()> {
        let op = format!("chat.postMessage({channel})");
        self.policy
            .run(&self.limiter, &self.cancel, &op, || {
                self.inner.post_message(channel, text)
            })
            .await
    }

    async fn join_channel(&self, channel: &ChannelId) -> Result<()> {
        let op = format!("conversations.join({channel})");
        self.policy
            .run(&self.limiter, &self.cancel, &op, || {
                self.inner.join_channel(channel)
            })
            .await
    }

    async fn archive_channel(&self, channel: &ChannelId) -> Result<()> {
        let op = format!("conversations.archive({channel})");
        self.policy
            .run(&self.limiter, &self.cancel, &op, || {
                self.inner.archive_channel(channel)
            })
            .await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.policy
            .run(&self.limiter, &self.cancel, "users.list", || {
                self.inner.list_users()
            })
            .await
    }
}
