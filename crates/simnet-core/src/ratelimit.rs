//! Rate limiting for hot-path diagnostics
//!
//! Drop warnings can fire once per packet under sustained overload. A
//! [`RateLimit`] lets a burst of messages through per interval and counts
//! the rest, reporting the suppressed count when the next window opens.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Default window length
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
/// Default messages allowed per window
pub const DEFAULT_BURST: u32 = 10;

#[derive(Debug)]
struct Window {
    start: Option<Instant>,
    printed: u32,
    missed: u64,
}

/// Burst-per-interval limiter
#[derive(Debug)]
pub struct RateLimit {
    interval: Duration,
    burst: u32,
    window: Mutex<Window>,
}

impl RateLimit {
    /// Allow `burst` messages every `interval`
    #[must_use]
    pub fn new(interval: Duration, burst: u32) -> Self {
        Self {
            interval,
            burst,
            window: Mutex::new(Window {
                start: None,
                printed: 0,
                missed: 0,
            }),
        }
    }

    /// Whether a message may be emitted now
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Whether a message may be emitted at `now`
    pub fn allow_at(&self, now: Instant) -> bool {
        let mut w = self.window.lock();

        let expired = match w.start {
            Some(start) => now.saturating_duration_since(start) >= self.interval,
            None => true,
        };
        if expired {
            if w.missed > 0 {
                tracing::warn!("{} callbacks suppressed", w.missed);
            }
            w.start = Some(now);
            w.printed = 0;
            w.missed = 0;
        }

        if w.printed < self.burst {
            w.printed += 1;
            true
        } else {
            w.missed += 1;
            false
        }
    }

    /// Messages suppressed in the current window
    #[must_use]
    pub fn suppressed(&self) -> u64 {
        self.window.lock().missed
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL, DEFAULT_BURST)
    }
}
