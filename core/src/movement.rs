//! Per-token movement transition tracking.
//!
//! Each token is either IDLE (no snapshot) or MOVING (snapshot present). The
//! snapshot records which auras were occupied when the move began; diffing it
//! against the end-of-move hit-set distinguishes "started inside, still
//! inside" from a genuine entry. All state here is process-local and owned
//! by the coordinator; nothing is shared across clients.

use std::collections::HashMap;

use aurawatch_types::TokenId;

use crate::resolver::{HitKey, HitSet};

#[derive(Debug, Default)]
pub struct MovementTracker {
    /// Hit-set at the start of an in-flight move, per token.
    snapshots: HashMap<TokenId, HitSet>,
    /// Hit-set as of the last processed notification, per token. Baseline
    /// for the next diff when no snapshot is in flight.
    occupancy: HashMap<TokenId, HitSet>,
    /// Monotonic per-token event sequence counters.
    sequences: HashMap<TokenId, u64>,
}

impl MovementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a move is currently in flight for `token`.
    pub fn move_in_flight(&self, token: &TokenId) -> bool {
        self.snapshots.contains_key(token)
    }

    /// Record the start-of-move hit-set. Only the first movement
    /// notification of a move takes the snapshot; later in-flight updates
    /// keep the original.
    pub fn begin_move(&mut self, token: &TokenId, start_hits: HitSet) {
        self.snapshots.entry(token.clone()).or_insert(start_hits);
    }

    /// The move concluded: returns the newly entered keys and advances the
    /// occupancy baseline. Consumes the snapshot.
    pub fn conclude_move(&mut self, token: &TokenId, current: HitSet) -> Vec<HitKey> {
        let previous = self
            .snapshots
            .remove(token)
            .or_else(|| self.occupancy.get(token).cloned())
            .unwrap_or_default();
        let entered = current.difference(&previous).cloned().collect();
        self.occupancy.insert(token.clone(), current);
        entered
    }

    /// Finer-grained position commit: diffs against the live occupancy
    /// baseline, bypassing any snapshot.
    pub fn commit_position(&mut self, token: &TokenId, current: HitSet) -> Vec<HitKey> {
        let previous = self.occupancy.get(token).cloned().unwrap_or_default();
        let entered = current.difference(&previous).cloned().collect();
        self.occupancy.insert(token.clone(), current);
        entered
    }

    /// Turn start reports current occupancy, not deltas: every present hit
    /// is returned.
    pub fn turn_start(&mut self, token: &TokenId, current: HitSet) -> Vec<HitKey> {
        let hits = current.iter().cloned().collect();
        self.occupancy.insert(token.clone(), current);
        hits
    }

    /// Replace the occupancy baseline without emitting (aura-item resync).
    pub fn resync(&mut self, token: &TokenId, current: HitSet) {
        self.occupancy.insert(token.clone(), current);
    }

    /// Next per-token sequence number.
    pub fn next_sequence(&mut self, token: &TokenId) -> u64 {
        let seq = self.sequences.entry(token.clone()).or_insert(0);
        *seq += 1;
        *seq
    }

    /// Teardown hook for token deletion.
    pub fn forget(&mut self, token: &TokenId) {
        self.snapshots.remove(token);
        self.occupancy.remove(token);
        self.sequences.remove(token);
    }

    /// Teardown hook for scene reload.
    pub fn reset(&mut self) {
        self.snapshots.clear();
        self.occupancy.clear();
        self.sequences.clear();
    }
}
