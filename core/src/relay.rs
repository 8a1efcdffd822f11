//! Link relay: filter incoming chat messages, extract links, forward them to the subscription service.
//! Live updates and history backfill share one pipeline (filter → extract → notify).
//! Transport specifics (teloxide) live only in channels::telegram.

pub mod backfill;
pub mod channels;
pub mod directory;
pub mod event;
pub mod extract;
pub mod filter;
pub mod log;
pub mod notify;
pub mod pipeline;
pub mod worker;

/// Re-export channels so `linkwatch_core::relay::telegram::run_telegram_watcher` works.
pub use channels::telegram;
pub use event::{ChatEvent, EventHandler, IncomingMessage, Peer};
pub use pipeline::LinkPipeline;
