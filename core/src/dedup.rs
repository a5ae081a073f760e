//! Time-bounded event fingerprint cache.
//!
//! Broadcast delivery is at-least-once and unordered, and any number of
//! clients may emit the same logical event. Each client runs two of these
//! caches: one gating emission, one gating reception. An entry expires after
//! `EVENT_TTL_MS` so a legitimately new occurrence of the same tuple (for
//! example re-entering the same aura on a later turn with a reused sequence)
//! is only suppressed within the replay window, never permanently.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

/// Replay window for duplicate event fingerprints.
pub const EVENT_TTL_MS: i64 = 5000;

#[derive(Debug, Default)]
pub struct DedupCache {
    entries: HashMap<String, DateTime<Utc>>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `fingerprint` was seen within the TTL window. Either
    /// way the fingerprint is recorded going forward. Expired entries are
    /// swept incidentally on each call.
    pub fn seen(&mut self, fingerprint: &str) -> bool {
        self.seen_at(fingerprint, Utc::now())
    }

    /// `seen` with an explicit clock, for tests and hosts with their own
    /// time source.
    pub fn seen_at(&mut self, fingerprint: &str, now: DateTime<Utc>) -> bool {
        self.entries.retain(|_, expires_at| *expires_at > now);

        if self.entries.contains_key(fingerprint) {
            return true;
        }
        self.entries.insert(
            fingerprint.to_string(),
            now + Duration::milliseconds(EVENT_TTL_MS),
        );
        false
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
