//! Chat transport abstraction for the backfill: look a channel up and pull its recent history.
//! Each transport adapter (channels::telegram) implements this; the backfill only sees the trait.

use async_trait::async_trait;

use crate::config::ChannelId;
use crate::error::DirectoryError;
use crate::relay::event::IncomingMessage;

/// A channel the transport found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChannel {
    pub id: ChannelId,
    pub title: String,
}

/// Read-only view of the account's chats.
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    /// False when the transport cannot list conversations or read history at all. The
    /// backfill is then skipped as a whole instead of failing once per channel.
    fn offers_history(&self) -> bool {
        true
    }

    /// Resolve a channel directly by id.
    async fn resolve_channel(&self, id: ChannelId) -> Result<ResolvedChannel, DirectoryError>;

    /// Most recently active conversations the account has joined, at most `limit`.
    async fn list_recent_conversations(&self, limit: usize) -> Result<Vec<ResolvedChannel>, DirectoryError>;

    /// Up to `limit` most recent messages of the channel, most recent first.
    async fn get_history(
        &self,
        channel: &ResolvedChannel,
        limit: usize,
    ) -> Result<Vec<IncomingMessage>, DirectoryError>;
}
