//! linkwatch core: message filter, link extraction, subscription notifier, live and backfill
//! pipelines, connection monitor, Telegram adapter. No CLI.

pub mod config;
pub mod error;
pub mod monitor;
pub mod relay;

pub use config::Config;
