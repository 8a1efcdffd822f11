//! History backfill: replay a channel's recent messages through the live pipeline.
//! History arrives most-recent-first and is replayed oldest-first, so links are forwarded in
//! the order they would have arrived live.

use tracing::{info, warn};

use super::directory::{ChannelDirectory, ResolvedChannel};
use super::pipeline::LinkPipeline;
use crate::config::ChannelId;
use crate::error::{BackfillError, ResolutionError};

/// Messages fetched per channel (one page).
pub const HISTORY_PAGE_SIZE: usize = 100;

/// Conversations scanned when direct resolution fails.
pub const RECENT_CONVERSATIONS_LIMIT: usize = 100;

/// Summary for one channel that was backfilled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelBackfill {
    pub channel: ResolvedChannel,
    pub fetched: usize,
    /// Messages that passed the filter and produced at least one link.
    pub matched: usize,
}

#[derive(Debug, Default)]
pub struct BackfillReport {
    pub completed: Vec<ChannelBackfill>,
    pub failed: Vec<(ChannelId, BackfillError)>,
    /// The transport has no history; nothing was attempted.
    pub skipped: bool,
}

/// Direct lookup first; if that fails, scan the most recent conversations for the id.
pub async fn resolve(
    directory: &dyn ChannelDirectory,
    id: ChannelId,
) -> Result<ResolvedChannel, ResolutionError> {
    let direct = match directory.resolve_channel(id).await {
        Ok(channel) => return Ok(channel),
        Err(e) => e,
    };
    match directory.list_recent_conversations(RECENT_CONVERSATIONS_LIMIT).await {
        Ok(conversations) => conversations
            .into_iter()
            .find(|c| c.id == id)
            .ok_or(ResolutionError::NotFound { channel: id, direct }),
        Err(listing) => Err(ResolutionError::ListingFailed { channel: id, direct, listing }),
    }
}

/// Backfill a single channel.
pub async fn backfill_channel(
    directory: &dyn ChannelDirectory,
    pipeline: &LinkPipeline,
    id: ChannelId,
) -> Result<ChannelBackfill, BackfillError> {
    let channel = resolve(directory, id).await?;
    info!(channel = id, title = %channel.title, "fetching history");

    let history = directory
        .get_history(&channel, HISTORY_PAGE_SIZE)
        .await
        .map_err(|source| BackfillError::History { channel: id, source })?;
    let fetched = history.len();
    info!(channel = id, fetched, "history fetched");

    let mut matched = 0;
    for msg in history.iter().rev() {
        if msg.text.is_empty() {
            continue;
        }
        if pipeline.process(msg).await.matched() {
            matched += 1;
        }
    }

    info!(channel = id, matched, "channel backfill done");
    Ok(ChannelBackfill { channel, fetched, matched })
}

/// Backfill each channel in order. A failing channel is recorded and skipped.
pub async fn backfill_channels(
    directory: &dyn ChannelDirectory,
    pipeline: &LinkPipeline,
    channels: &[ChannelId],
) -> BackfillReport {
    let mut report = BackfillReport::default();
    if !directory.offers_history() {
        warn!(channels = channels.len(), "this transport cannot read message history, backfill skipped");
        report.skipped = true;
        return report;
    }
    for &id in channels {
        match backfill_channel(directory, pipeline, id).await {
            Ok(done) => report.completed.push(done),
            Err(e) => {
                warn!(channel = id, error = %e, "channel backfill failed");
                report.failed.push((id, e));
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::error::DirectoryError;
    use crate::relay::event::{IncomingMessage, Peer};
    use crate::relay::pipeline::tests::{test_config, RecordingNotifier};

    #[derive(Default)]
    struct FakeDirectory {
        direct: HashMap<ChannelId, ResolvedChannel>,
        recent: Vec<ResolvedChannel>,
        listing_fails: bool,
        history: HashMap<ChannelId, Vec<IncomingMessage>>,
        no_history: bool,
    }

    #[async_trait]
    impl ChannelDirectory for FakeDirectory {
        fn offers_history(&self) -> bool {
            !self.no_history
        }

        async fn resolve_channel(&self, id: ChannelId) -> Result<ResolvedChannel, DirectoryError> {
            assert!(!self.no_history, "lookup on a transport without history");
            self.direct.get(&id).cloned().ok_or(DirectoryError::NotFound(id))
        }

        async fn list_recent_conversations(
            &self,
            limit: usize,
        ) -> Result<Vec<ResolvedChannel>, DirectoryError> {
            assert_eq!(limit, RECENT_CONVERSATIONS_LIMIT);
            if self.listing_fails {
                return Err(DirectoryError::Request("timeout".into()));
            }
            Ok(self.recent.clone())
        }

        async fn get_history(
            &self,
            channel: &ResolvedChannel,
            limit: usize,
        ) -> Result<Vec<IncomingMessage>, DirectoryError> {
            assert_eq!(limit, HISTORY_PAGE_SIZE);
            self.history
                .get(&channel.id)
                .cloned()
                .ok_or(DirectoryError::Unsupported("message history"))
        }
    }

    fn channel(id: ChannelId) -> ResolvedChannel {
        ResolvedChannel { id, title: format!("chan {}", id) }
    }

    fn post(channel: ChannelId, minute: u32, text: &str) -> IncomingMessage {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 12, minute, 0).unwrap();
        IncomingMessage::new(text, Peer::Channel(channel), ts)
    }

    #[tokio::test]
    async fn replays_oldest_first() {
        let mut dir = FakeDirectory::default();
        dir.direct.insert(1, channel(1));
        // most recent first, as the transport returns it
        dir.history.insert(
            1,
            vec![
                post(1, 3, "clash 订阅 https://third.example/c"),
                post(1, 2, "clash 订阅 https://second.example/b"),
                post(1, 1, "clash 订阅 https://first.example/a"),
            ],
        );
        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline = LinkPipeline::new(&test_config(), notifier.clone());

        let done = backfill_channel(&dir, &pipeline, 1).await.unwrap();

        assert_eq!(done.fetched, 3);
        assert_eq!(done.matched, 3);
        assert_eq!(
            *notifier.calls.lock().unwrap(),
            vec![
                "https://first.example/a",
                "https://second.example/b",
                "https://third.example/c",
            ]
        );
    }

    #[tokio::test]
    async fn falls_back_to_recent_conversations() {
        let dir = FakeDirectory {
            recent: vec![channel(5), channel(1)],
            ..Default::default()
        };
        let resolved = resolve(&dir, 1).await.unwrap();
        assert_eq!(resolved, channel(1));
    }

    #[tokio::test]
    async fn unresolvable_channel_is_resolution_error() {
        let dir = FakeDirectory { recent: vec![channel(5)], ..Default::default() };
        assert!(matches!(
            resolve(&dir, 1).await,
            Err(ResolutionError::NotFound { channel: 1, .. })
        ));

        let dir = FakeDirectory { listing_fails: true, ..Default::default() };
        assert!(matches!(
            resolve(&dir, 1).await,
            Err(ResolutionError::ListingFailed { channel: 1, .. })
        ));
    }

    #[tokio::test]
    async fn failed_channels_do_not_stop_the_rest() {
        let mut dir = FakeDirectory::default();
        dir.direct.insert(1, channel(1));
        dir.direct.insert(2, channel(2));
        dir.history.insert(2, vec![post(2, 1, "clash https://whitelisted.example/x")]);
        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline = LinkPipeline::new(&test_config(), notifier.clone());

        // 7 unresolvable, 1 has no history, 2 succeeds
        let report = backfill_channels(&dir, &pipeline, &[7, 1, 2]).await;

        let failed: Vec<_> = report.failed.iter().map(|(id, _)| *id).collect();
        assert_eq!(failed, vec![7, 1]);
        assert!(matches!(report.failed[0].1, BackfillError::Resolution(_)));
        assert!(matches!(report.failed[1].1, BackfillError::History { channel: 1, .. }));
        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.completed[0].matched, 1);
        assert_eq!(*notifier.calls.lock().unwrap(), vec!["https://whitelisted.example/x"]);
    }

    #[tokio::test]
    async fn empty_and_unmatched_messages_are_not_counted() {
        let mut dir = FakeDirectory::default();
        dir.direct.insert(1, channel(1));
        dir.history.insert(1, vec![post(1, 2, ""), post(1, 1, "clash but nothing else")]);
        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline = LinkPipeline::new(&test_config(), notifier.clone());

        let done = backfill_channel(&dir, &pipeline, 1).await.unwrap();
        assert_eq!((done.fetched, done.matched), (2, 0));
        assert!(notifier.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transport_without_history_is_skipped_once() {
        let mut dir = FakeDirectory { no_history: true, ..Default::default() };
        dir.direct.insert(1, channel(1));
        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline = LinkPipeline::new(&test_config(), notifier.clone());

        let report = backfill_channels(&dir, &pipeline, &[1, 2]).await;

        assert!(report.skipped);
        assert!(report.completed.is_empty());
        assert!(report.failed.is_empty());
        assert!(notifier.calls.lock().unwrap().is_empty());
    }
}
