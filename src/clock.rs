//! Monotonic clock aligned with the streaming transport's time base.
//!
//! Mirrors the role of `lsl::local_clock()`: a single side-effect-free,
//! thread-safe reading of "now" in the transport's seconds-based clock. Time
//! correction between the local clock and a given stream's source clock is
//! the Stream Source Adapter's responsibility (spec.md §4.1), not this
//! module's.

use std::time::Instant;

/// Monotonic, non-decreasing wall-clock reader.
///
/// Safe to call from any thread; carries no lock and performs no I/O.
pub trait ClockSource: Send + Sync {
    /// Current time in seconds, in the transport's time base.
    fn now_streaming(&self) -> f64;
}

/// Default clock anchored at construction time, backed by `Instant`.
#[derive(Debug)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for SystemClock {
    fn now_streaming(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}
