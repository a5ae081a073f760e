//! The aura event wire payload.
//!
//! One `AuraEvent` describes one detected transition. Every connected client
//! may independently detect the same transition; the fingerprint tuple is
//! what collapses those detections back to a single effect, so it must be
//! reproducible byte-for-byte on the sender and every receiver.

use aurawatch_types::{CombatId, TokenId};
use serde::{Deserialize, Serialize};

/// Kind of detected transition.
///
/// `Unknown` absorbs kinds from newer peers; the reception handler drops
/// them silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// The target begins its turn inside the aura.
    StartTurn,
    /// The target moved from outside to inside.
    Enter,
    /// A domain-specific hazard kind, carried for augmentation hooks.
    Special,
    #[serde(other)]
    Unknown,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StartTurn => "START_TURN",
            Self::Enter => "ENTER",
            Self::Special => "SPECIAL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// An immutable message describing one detected aura transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuraEvent {
    pub kind: EventKind,
    pub target_token: TokenId,
    pub source_token: TokenId,
    pub aura: String,
    pub combat: Option<CombatId>,
    pub round: u32,
    pub turn: u32,
    /// Per-token monotonic counter or externally supplied move-operation id;
    /// disambiguates multiple transitions within one round/turn.
    pub sequence: u64,
}

impl AuraEvent {
    /// The deduplication fingerprint. Covers the full identifying tuple.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}:{}:{}",
            self.kind.as_str(),
            self.target_token,
            self.source_token,
            self.aura,
            self.combat.as_ref().map(CombatId::as_str).unwrap_or("-"),
            self.round,
            self.turn,
            self.sequence,
        )
    }
}
