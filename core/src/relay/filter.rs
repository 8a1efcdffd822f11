//! Message filter: decides whether a message is worth scanning for links.
//! Stages run in a fixed order and short-circuit: allow-list, keyword, whitelist bypass, content filter.

use std::fmt;

use crate::config::{ChannelId, FilterConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Pass(PassReason),
    Reject(RejectReason),
}

impl FilterDecision {
    pub fn is_pass(&self) -> bool {
        matches!(self, FilterDecision::Pass(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    /// Origin is whitelisted; the content filter was skipped.
    Whitelisted,
    ContentFilterMatched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    ChannelNotAllowed,
    NoKeyword,
    NoContentFilterTerm,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RejectReason::ChannelNotAllowed => "channel not allowed",
            RejectReason::NoKeyword => "no keyword",
            RejectReason::NoContentFilterTerm => "no content-filter term",
        })
    }
}

/// Decide for one message. `origin` is the channel id, or None when the message
/// did not come from a channel (such messages never pass a non-empty allow-list).
pub fn decide(text: &str, origin: Option<ChannelId>, config: &FilterConfig) -> FilterDecision {
    if !config.allowed_channels.is_empty()
        && !origin.is_some_and(|id| config.allowed_channels.contains(&id))
    {
        return FilterDecision::Reject(RejectReason::ChannelNotAllowed);
    }

    let lowered = text.to_lowercase();
    let has_keyword = config
        .keywords
        .iter()
        .any(|k| lowered.contains(&k.to_lowercase()));
    if !has_keyword {
        return FilterDecision::Reject(RejectReason::NoKeyword);
    }

    if origin.is_some_and(|id| config.whitelist.contains(&id)) {
        return FilterDecision::Pass(PassReason::Whitelisted);
    }

    if config.content_filter.iter().any(|term| text.contains(term.as_str())) {
        FilterDecision::Pass(PassReason::ContentFilterMatched)
    } else {
        FilterDecision::Reject(RejectReason::NoContentFilterTerm)
    }
}
