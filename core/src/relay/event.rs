//! Inbound chat events as the relay sees them, and the handler trait they are dispatched to.
//! The transport adapter converts its own update types into `ChatEvent` at the edge.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::ChannelId;

/// Where a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Peer {
    /// Broadcast channel or supergroup.
    Channel(ChannelId),
    /// Basic group chat.
    Group(i64),
    /// Private chat with a user.
    User(i64),
}

impl Peer {
    /// Channel id used by the filter. Only channels have one.
    pub fn channel_id(&self) -> Option<ChannelId> {
        match self {
            Peer::Channel(id) => Some(*id),
            Peer::Group(_) | Peer::User(_) => None,
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::Channel(id) => write!(f, "channel:{}", id),
            Peer::Group(id) => write!(f, "group:{}", id),
            Peer::User(id) => write!(f, "user:{}", id),
        }
    }
}

/// One message, consumed once by the pipeline and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub text: String,
    pub peer: Peer,
    pub timestamp: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(text: impl Into<String>, peer: Peer, timestamp: DateTime<Utc>) -> Self {
        Self { text: text.into(), peer, timestamp }
    }
}

/// Update kinds the relay reacts to. Each variant carries its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    NewMessage(IncomingMessage),
    EditedMessage(IncomingMessage),
    ChannelPost(IncomingMessage),
    EditedChannelPost(IncomingMessage),
}

impl ChatEvent {
    pub fn message(&self) -> &IncomingMessage {
        match self {
            ChatEvent::NewMessage(m)
            | ChatEvent::EditedMessage(m)
            | ChatEvent::ChannelPost(m)
            | ChatEvent::EditedChannelPost(m) => m,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChatEvent::NewMessage(_) => "new_message",
            ChatEvent::EditedMessage(_) => "edited_message",
            ChatEvent::ChannelPost(_) => "channel_post",
            ChatEvent::EditedChannelPost(_) => "edited_channel_post",
        }
    }
}

/// Capabilities a live handler provides. Wired once when the pipeline is built.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// A message (or channel post) that was just sent.
    async fn on_new_message(&self, msg: &IncomingMessage);

    /// A message whose text was edited after it was sent.
    async fn on_edited_message(&self, msg: &IncomingMessage);
}

/// Route one event to the matching handler capability.
pub async fn dispatch<H>(handler: &H, event: &ChatEvent)
where
    H: EventHandler + ?Sized,
{
    match event {
        ChatEvent::NewMessage(m) | ChatEvent::ChannelPost(m) => handler.on_new_message(m).await,
        ChatEvent::EditedMessage(m) | ChatEvent::EditedChannelPost(m) => {
            handler.on_edited_message(m).await
        }
    }
}
