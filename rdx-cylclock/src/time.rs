//! Sources of "now" and the frame ticker that drives animation.
//!
//! All clock logic reads wall-clock time through a [`TimeSource`] so that it
//! can be rebased (`set_time`) or replaced by a manual source in tests.

use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Supplies the current wall-clock time in milliseconds since the Unix epoch.
pub trait TimeSource: Send + Sync + fmt::Debug {
    fn now_ms(&self) -> i64;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    now_ms: Arc<AtomicI64>,
}

impl ManualTimeSource {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: Arc::new(AtomicI64::new(now_ms)),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Epoch time carried forward by tokio's clock from a fixed anchor. Under a
/// paused runtime it only moves with tokio's virtual time.
#[derive(Debug, Clone, Copy)]
pub struct TokioTimeSource {
    anchor_ms: i64,
    origin: Instant,
}

impl TokioTimeSource {
    /// Reads `anchor_ms` now and moves on from there.
    pub fn starting_at(anchor_ms: i64) -> Self {
        Self {
            anchor_ms,
            origin: Instant::now(),
        }
    }
}

impl TimeSource for TokioTimeSource {
    fn now_ms(&self) -> i64 {
        self.anchor_ms + self.origin.elapsed().as_millis() as i64
    }
}

/// Wraps a source with a fixed offset, so "now" can be moved to any instant
/// while still ticking at the real rate.
#[derive(Debug)]
pub struct RebasedTime {
    source: Arc<dyn TimeSource>,
    offset_ms: i64,
}

impl RebasedTime {
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        Self {
            source,
            offset_ms: 0,
        }
    }

    pub fn now_ms(&self) -> i64 {
        self.source.now_ms() + self.offset_ms
    }

    pub fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.now_ms())
            .single()
            .unwrap_or_default()
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }

    /// Rebases so that "now" reads as `at`. Returns the size of the jump.
    pub fn set_time<Tz: TimeZone>(&mut self, at: &DateTime<Tz>) -> i64 {
        let before = self.now_ms();
        self.offset_ms = at.timestamp_millis() - self.source.now_ms();
        let jump = self.now_ms() - before;
        info!("Clock rebased by {} ms (offset now {} ms).", jump, self.offset_ms);
        jump
    }

    /// Returns to the underlying source's time.
    pub fn reset(&mut self) -> i64 {
        let jump = -self.offset_ms;
        self.offset_ms = 0;
        jump
    }
}

/// One animation frame request.
#[derive(Debug, Clone)]
pub struct TickEvent {
    pub tick_count: u64,
    pub timestamp: Instant,
}

/// Emits a `TickEvent` at a fixed rate until shut down.
///
/// The ticker runs at the configured maximum refresh rate. Missed ticks are
/// skipped rather than bunched, so a stalled host never gets a burst of frames.
pub struct FrameTicker {
    period: Duration,
    tick_sender: broadcast::Sender<Arc<TickEvent>>,
    tick_count: AtomicU64,
}

impl FrameTicker {
    pub fn new(rate_hz: u32, tick_sender: broadcast::Sender<Arc<TickEvent>>) -> Self {
        Self {
            period: Duration::from_secs_f64(1.0 / f64::from(rate_hz.max(1))),
            tick_sender,
            tick_count: AtomicU64::new(0),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!("Frame ticker running every {:?}.", self.period);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                timestamp = interval.tick() => {
                    let tick_count = self.tick_count.fetch_add(1, Ordering::Relaxed);
                    // No subscribers just means nobody is rendering right now.
                    self.tick_sender
                        .send(Arc::new(TickEvent { tick_count, timestamp }))
                        .ok();
                }
            }
        }
        debug!("Frame ticker stopped.");
    }
}
