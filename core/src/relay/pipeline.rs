//! Filter → extract → notify for one message. Shared by the live worker and the backfill so
//! both apply exactly the same rules.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::event::{EventHandler, IncomingMessage};
use super::extract::{ExtractedLink, LinkExtractor};
use super::filter::{self, FilterDecision};
use super::log::truncate_content_default;
use super::notify::{NotificationResult, Notifier, NotifyOutcome};
use crate::config::{Config, FilterConfig};

/// What happened to one message.
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub decision: FilterDecision,
    /// One entry per extracted link, in text order. Empty when rejected.
    pub notifications: Vec<(ExtractedLink, NotificationResult)>,
}

impl ProcessReport {
    /// The message passed the filter and yielded at least one link.
    pub fn matched(&self) -> bool {
        !self.notifications.is_empty()
    }
}

pub struct LinkPipeline {
    filter: FilterConfig,
    extractor: LinkExtractor,
    notifier: Arc<dyn Notifier>,
}

impl LinkPipeline {
    pub fn new(config: &Config, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            filter: config.filter.clone(),
            extractor: LinkExtractor::new(&config.link_blacklist),
            notifier,
        }
    }

    /// Run one message through the pipeline. Every link is notified independently; a failed
    /// notification is logged and the remaining links still go out.
    pub async fn process(&self, msg: &IncomingMessage) -> ProcessReport {
        let decision = filter::decide(&msg.text, msg.peer.channel_id(), &self.filter);
        if let FilterDecision::Reject(reason) = decision {
            debug!(source = %msg.peer, %reason, content = %truncate_content_default(&msg.text), "message filtered out");
            return ProcessReport { decision, notifications: Vec::new() };
        }

        let links = self.extractor.extract(&msg.text);
        let mut notifications = Vec::with_capacity(links.len());
        for link in links {
            info!(time = %msg.timestamp.format("%Y-%m-%d %H:%M:%S"), source = %msg.peer, link = %link, "link found");
            let result = self.notifier.notify(link.as_str()).await;
            log_result(&link, &result);
            notifications.push((link, result));
        }
        ProcessReport { decision, notifications }
    }
}

fn log_result(link: &ExtractedLink, result: &NotificationResult) {
    match result.outcome {
        NotifyOutcome::Created => info!(link = %link, detail = %result.detail, "subscription added"),
        NotifyOutcome::AlreadyExists => info!(link = %link, "subscription already exists, skipped"),
        NotifyOutcome::Rejected => warn!(link = %link, error = %result.detail, "subscription rejected"),
        NotifyOutcome::TransportError => {
            warn!(link = %link, error = %result.detail, "subscription request failed")
        }
    }
}

/// Live event handler: new and edited messages both go through the pipeline once.
pub struct LiveHandler {
    pipeline: Arc<LinkPipeline>,
}

impl LiveHandler {
    pub fn new(pipeline: Arc<LinkPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl EventHandler for LiveHandler {
    async fn on_new_message(&self, msg: &IncomingMessage) {
        self.pipeline.process(msg).await;
    }

    async fn on_edited_message(&self, msg: &IncomingMessage) {
        debug!(source = %msg.peer, "edited message");
        self.pipeline.process(msg).await;
    }
}
