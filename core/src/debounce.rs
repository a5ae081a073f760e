//! Coalescing of rapid aura-relevant item changes.
//!
//! Add/remove bursts (a hazard effect being rebuilt, a batch import) would
//! otherwise trigger one full occupancy re-resolution each. The debouncer
//! records the latest schedule time; the owner polls `due` on its tick and
//! runs a single refresh once a quiet window has passed. No timers here; the
//! host drives ticks.

use chrono::{DateTime, Duration, Utc};

pub const REFRESH_DEBOUNCE_MS: i64 = 150;

#[derive(Debug, Default)]
pub struct RefreshDebouncer {
    deadline: Option<DateTime<Utc>>,
}

impl RefreshDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start or extend the quiet window.
    pub fn schedule(&mut self, now: DateTime<Utc>) {
        self.deadline = Some(now + Duration::milliseconds(REFRESH_DEBOUNCE_MS));
    }

    pub fn pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// True once per elapsed quiet window; consumes the deadline.
    pub fn due(&mut self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}
