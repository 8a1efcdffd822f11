//! Transport adapters. Each one feeds `ChatEvent`s to the worker and implements `ChannelDirectory`.

pub mod telegram;
