//! Connection health monitor: advisory periodic reporters over counters the ingestion side bumps.
//!
//! - progress reporter (5s): while the transport is negotiating, logs elapsed time and dial
//!   attempts; after 6 ticks with no new dial attempt it warns once about a stall.
//! - heartbeat reporter (30s): logs uptime and how many message events were dispatched.
//!
//! Neither loop takes corrective action. Both stop only when their token is cancelled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Consecutive no-progress ticks before the stall warning (~30s).
pub const STALL_TICKS: u32 = 6;

/// Counters shared between the ingestion side (writer) and the reporters (readers).
/// Readers may see slightly stale values; only approximate progress detection is needed.
#[derive(Debug)]
pub struct MonitorState {
    started: Instant,
    dial_attempts: AtomicU64,
    dispatch_count: AtomicU64,
    /// Millis since `started` of the last counter increment.
    last_progress_ms: AtomicU64,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorState {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            dial_attempts: AtomicU64::new(0),
            dispatch_count: AtomicU64::new(0),
            last_progress_ms: AtomicU64::new(0),
        }
    }

    /// Returns the attempt number (1-based).
    pub fn record_dial_attempt(&self) -> u64 {
        self.touch();
        self.dial_attempts.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns the total number of dispatched message events.
    pub fn record_dispatch(&self) -> u64 {
        self.touch();
        self.dispatch_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn dial_attempts(&self) -> u64 {
        self.dial_attempts.load(Ordering::Relaxed)
    }

    pub fn dispatch_count(&self) -> u64 {
        self.dispatch_count.load(Ordering::Relaxed)
    }

    pub fn last_progress_at(&self) -> Instant {
        self.started + Duration::from_millis(self.last_progress_ms.load(Ordering::Relaxed))
    }

    fn touch(&self) {
        let ms = self.started.elapsed().as_millis() as u64;
        self.last_progress_ms.fetch_max(ms, Ordering::Relaxed);
    }
}

/// What one progress tick concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Progress,
    Idle(u32),
    /// First tick to reach `STALL_TICKS` idle ticks since the last progress.
    Stalled,
}

/// Stall bookkeeping for the progress reporter. Warns once per stall; re-arms on progress.
#[derive(Debug, Default)]
pub struct StallDetector {
    last_dial_attempts: u64,
    idle_ticks: u32,
    warned: bool,
}

impl StallDetector {
    pub fn observe(&mut self, dial_attempts: u64) -> Tick {
        if dial_attempts != self.last_dial_attempts {
            self.last_dial_attempts = dial_attempts;
            self.idle_ticks = 0;
            self.warned = false;
            return Tick::Progress;
        }
        self.idle_ticks = self.idle_ticks.saturating_add(1);
        if self.idle_ticks >= STALL_TICKS && !self.warned {
            self.warned = true;
            Tick::Stalled
        } else {
            Tick::Idle(self.idle_ticks)
        }
    }
}

/// Totals a reporter returns when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReporterSummary {
    pub ticks: u64,
    pub stall_warnings: u64,
}

pub async fn run_progress_reporter(
    state: Arc<MonitorState>,
    cancel: CancellationToken,
) -> ReporterSummary {
    let start = Instant::now();
    let mut ticker = interval_at(start + PROGRESS_INTERVAL, PROGRESS_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut detector = StallDetector::default();
    let mut summary = ReporterSummary::default();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                summary.ticks += 1;
                let dial_attempts = state.dial_attempts();
                info!(elapsed_secs = start.elapsed().as_secs(), dial_attempts, "waiting for session");
                if detector.observe(dial_attempts) == Tick::Stalled {
                    summary.stall_warnings += 1;
                    warn!(
                        idle_secs = PROGRESS_INTERVAL.as_secs() * u64::from(STALL_TICKS),
                        dial_attempts,
                        "no connection progress; check the proxy and network, or stop with Ctrl+C and restart"
                    );
                }
            }
        }
    }
    summary
}

pub async fn run_heartbeat_reporter(
    state: Arc<MonitorState>,
    cancel: CancellationToken,
) -> ReporterSummary {
    let start = Instant::now();
    let mut ticker = interval_at(start + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut summary = ReporterSummary::default();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                summary.ticks += 1;
                info!(uptime_secs = start.elapsed().as_secs(), messages = state.dispatch_count(), "heartbeat");
            }
        }
    }
    summary
}
