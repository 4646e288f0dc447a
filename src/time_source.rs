use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::debug;

const SYNC_INTERVAL: Duration = Duration::from_millis(250);
const HARD_RESYNC_THRESHOLD_MS: i64 = 1_000;

pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> i64;
    fn label(&self) -> &'static str;
}

/// Wall-clock time advanced by a monotonic counter.
///
/// The wall clock is only consulted every [`SYNC_INTERVAL`]; small drift is
/// ignored, a step of [`HARD_RESYNC_THRESHOLD_MS`] or more re-anchors.
pub struct SystemTimeSource {
    anchor: Mutex<Anchor>,
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    wall_anchor_ms: i64,
    monotonic_anchor: Instant,
    last_sync: Duration,
    last_output_ms: i64,
}

impl Anchor {
    fn at(wall_ms: i64) -> Self {
        Self {
            wall_anchor_ms: wall_ms,
            monotonic_anchor: Instant::now(),
            last_sync: Duration::ZERO,
            last_output_ms: wall_ms,
        }
    }
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            anchor: Mutex::new(Anchor::at(wall_clock_ms())),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> i64 {
        let mut anchor = self.anchor.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = anchor.monotonic_anchor.elapsed();
        let estimated_ms = anchor.wall_anchor_ms.saturating_add(duration_ms(elapsed));

        if elapsed.saturating_sub(anchor.last_sync) >= SYNC_INTERVAL {
            anchor.last_sync = elapsed;
            let wall_ms = wall_clock_ms();
            let drift_ms = wall_ms.saturating_sub(estimated_ms);
            if drift_ms.abs() >= HARD_RESYNC_THRESHOLD_MS {
                debug!(drift_ms, "wall clock stepped; re-anchoring time source");
                *anchor = Anchor::at(wall_ms);
                return wall_ms;
            }
        }

        let output_ms = estimated_ms.max(anchor.last_output_ms);
        anchor.last_output_ms = output_ms;
        output_ms
    }

    fn label(&self) -> &'static str {
        "SYSTEM_MONOTONIC"
    }
}

/// A clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualTimeSource {
    now_ms: Arc<AtomicI64>,
}

impl ManualTimeSource {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: Arc::new(AtomicI64::new(now_ms)),
        }
    }

    #[cfg(test)]
    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn label(&self) -> &'static str {
        "MANUAL"
    }
}

pub struct SelectedTimeSource {
    pub source: Box<dyn TimeSource>,
    pub label: &'static str,
    pub detail: Option<String>,
}

/// System clock unless an instant to freeze at is given.
pub fn select_time_source(frozen_at_ms: Option<i64>) -> SelectedTimeSource {
    match frozen_at_ms {
        Some(at_ms) => {
            let source = ManualTimeSource::new(at_ms);
            SelectedTimeSource {
                label: source.label(),
                source: Box::new(source),
                detail: Some(format!("Clock frozen at {at_ms} ms")),
            }
        }
        None => {
            let source = SystemTimeSource::new();
            SelectedTimeSource {
                label: source.label(),
                source: Box::new(source),
                detail: None,
            }
        }
    }
}

fn wall_clock_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
