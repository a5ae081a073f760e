//! Scene notifications delivered by the host.
//!
//! These represent "interesting things that happened" at a higher level than
//! raw document updates: the host adapter translates its own hook/event
//! system into this enum and feeds it to the coordinator in arrival order.

use aurawatch_types::{TokenId, UserId};

/// Start-of-move placement, captured by the host while a continuous move is
/// still in flight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveStart {
    pub x: f64,
    pub y: f64,
}

/// One notification from the shared scene.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneNotice {
    /// A token update carrying a position change. `movement` is present while
    /// the move is still in flight; a later update without it signals the
    /// move has concluded.
    TokenUpdated {
        token: TokenId,
        /// The user whose action produced the update, when the host attaches
        /// one. Ambiguous authorship (None) falls back to ownership election.
        acting_user: Option<UserId>,
        movement: Option<MoveStart>,
    },

    /// Finer-grained "position committed" notification, when the host exposes
    /// one. Diffs against the live occupancy baseline instead of a movement
    /// snapshot.
    PositionCommitted {
        token: TokenId,
        acting_user: Option<UserId>,
        /// Externally supplied move-operation id, used as the event sequence
        /// when present.
        move_id: Option<u64>,
    },

    /// A combatant's turn began.
    TurnStarted { token: TokenId },

    /// An item changed on a token's actor. Only aura-relevant changes
    /// schedule an occupancy resync.
    ItemChanged {
        token: TokenId,
        slug: Option<String>,
    },

    /// The token was deleted; its tracker state must be dropped.
    TokenDeleted { token: TokenId },

    /// The scene was torn down or reloaded; all tracker state must be
    /// dropped.
    SceneReady,
}
