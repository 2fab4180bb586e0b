//! Time sources for the command queue.
//!
//! The queue never reads the system clock directly; it asks a [`Clock`].
//! Tests use [`ManualClock`] or [`TokioClock`] (which follows tokio's
//! pausable time).

use std::sync::atomic::{AtomicI64, Ordering};

/// Source of "now" in milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall clock: milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: i64) {
        self.now.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Clock driven by tokio's timer, starting at a given offset.
///
/// Under `tokio::time::pause` this clock advances exactly as far as the
/// runtime's virtual time does.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
    offset: i64,
}

impl TokioClock {
    #[must_use]
    pub fn starting_at(offset: i64) -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            offset,
        }
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> i64 {
        let elapsed = i64::try_from(self.origin.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.offset.saturating_add(elapsed)
    }
}
