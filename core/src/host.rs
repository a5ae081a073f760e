//! Collaborator interfaces and the scene read model.
//!
//! The engine never touches host documents directly: it sees immutable
//! snapshots through `SceneQuery`, asks `AuraGeometry` a boolean membership
//! question, and performs its only side effects through `ChatGateway`,
//! `FlagStore` and `EventChannel`. Chat delivery and flag persistence are
//! the engine's suspension points; everything else is synchronous.

use aurawatch_types::{ActorId, CombatId, DistanceMode, Disposition, ItemRef, SceneId, TokenId, UserId};
use serde_json::Value;

use crate::events::AuraEvent;
use crate::resolver::AuraDescriptor;

/// Snapshot of a token as the host currently sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenState {
    pub id: TokenId,
    pub actor: ActorId,
    pub name: String,
    pub scene: SceneId,
    pub hidden: bool,
    pub defeated: bool,
    pub disposition: Disposition,
    /// Whether the token belongs to the player faction.
    pub party_member: bool,
}

/// One raw aura container entry, before identifier normalization. The host's
/// aura representation is duck-typed; any of these fields may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawAura {
    pub slug: Option<String>,
    pub container_key: Option<String>,
    pub name: Option<String>,
    pub radius: Option<f64>,
    /// Reference to the item/effect that explains the aura, when the
    /// container records one.
    pub origin: Option<ItemRef>,
    pub traits: Vec<String>,
}

/// Snapshot of an item on a token's actor, as far as aura resolution cares.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemState {
    pub id: ItemRef,
    pub slug: Option<String>,
    pub name: String,
    /// Carries the qualifying aura trait marker without a geometry-backed
    /// aura of its own.
    pub grants_aura_trait: bool,
    /// Radius extracted from the item's own data, when one is usable.
    pub radius_hint: Option<f64>,
}

/// Current combat state, if a combat is running.
#[derive(Debug, Clone, PartialEq)]
pub struct CombatView {
    pub id: CombatId,
    pub round: u32,
    pub turn: u32,
    /// Token of the active combatant; the turn-start staleness guard
    /// compares against this.
    pub active_token: Option<TokenId>,
    pub combatant_tokens: Vec<TokenId>,
}

/// One connected user session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub user: UserId,
    pub is_gm: bool,
    pub active: bool,
}

/// Where to evaluate a token for aura membership: its live placement, or a
/// hypothetical position (start-of-move evaluation).
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    Live(TokenId),
    Hypothetical { token: TokenId, x: f64, y: f64 },
}

impl Placement {
    pub fn token(&self) -> &TokenId {
        match self {
            Self::Live(token) => token,
            Self::Hypothetical { token, .. } => token,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("geometry probe failed: {0}")]
pub struct GeometryError(pub String);

#[derive(Debug, thiserror::Error)]
#[error("chat delivery failed: {0}")]
pub struct ChatError(pub String);

#[derive(Debug, thiserror::Error)]
#[error("flag storage failed: {0}")]
pub struct FlagError(pub String);

#[derive(Debug, thiserror::Error)]
#[error("broadcast publish failed: {0}")]
pub struct ChannelError(pub String);

/// Read-only queries against the shared scene, actor and user state.
pub trait SceneQuery {
    fn local_user(&self) -> UserId;
    fn sessions(&self) -> Vec<SessionInfo>;
    fn combat(&self) -> Option<CombatView>;

    fn tokens(&self) -> Vec<TokenState>;
    fn token(&self, id: &TokenId) -> Option<TokenState>;

    /// Aura containers for a token's actor, in container-preference order.
    /// The resolver takes descriptors from the first container that yields
    /// any.
    fn aura_containers(&self, token: &TokenId) -> Vec<Vec<RawAura>>;

    fn items(&self, token: &TokenId) -> Vec<ItemState>;

    fn is_hostile(&self, a: &TokenId, b: &TokenId) -> bool;

    /// Whether any player-faction token currently perceives `token`.
    fn visible_to_party(&self, token: &TokenId) -> bool;

    /// Whether the local user currently has `token` targeted.
    fn is_targeted(&self, token: &TokenId) -> bool;

    /// Active non-GM users with owner permission over the token's actor.
    fn owners(&self, token: &TokenId) -> Vec<UserId>;

    /// Origin reference recorded directly on the source actor's aura
    /// bookkeeping, if any. Last resort of the origin resolution chain.
    fn aura_origin_hint(&self, token: &TokenId, aura_identifier: &str) -> Option<ItemRef>;
}

/// Geometric aura-membership test. Implementations must accept hypothetical
/// placements as well as live tokens.
pub trait AuraGeometry {
    fn is_inside(
        &self,
        source: &TokenId,
        descriptor: &AuraDescriptor,
        target: &Placement,
        mode: DistanceMode,
    ) -> Result<bool, GeometryError>;
}

/// Chat message delivery. `whisper_to: None` posts publicly.
#[allow(async_fn_in_trait)]
pub trait ChatGateway {
    async fn post_message(
        &self,
        speaker: &TokenId,
        content: &str,
        whisper_to: Option<&[UserId]>,
    ) -> Result<(), ChatError>;
}

/// Generic persisted key-value accessors scoped to a combat entity.
/// Persistence may be eventually consistent; the suppression store verifies
/// its writes by re-reading.
#[allow(async_fn_in_trait)]
pub trait FlagStore {
    async fn get_flag(&self, combat: &CombatId, key: &str) -> Result<Option<Value>, FlagError>;
    async fn set_flag(&self, combat: &CombatId, key: &str, value: Value) -> Result<(), FlagError>;
    async fn unset_flag(&self, combat: &CombatId, key: &str) -> Result<(), FlagError>;
}

/// Best-effort broadcast channel shared by all clients. Fire-and-forget; no
/// acknowledgement, no delivery guarantee to the sender itself.
pub trait EventChannel {
    fn publish(&self, event: &AuraEvent) -> Result<(), ChannelError>;
}

/// Operator-facing notifications (suppression write failures, rejected
/// edits).
pub trait Notifier {
    fn notify_operator(&self, message: &str);
}

/// Everything the coordinator needs from one host adapter.
pub trait Host:
    SceneQuery + AuraGeometry + ChatGateway + FlagStore + EventChannel + Notifier
{
}

impl<T> Host for T where
    T: SceneQuery + AuraGeometry + ChatGateway + FlagStore + EventChannel + Notifier
{
}
