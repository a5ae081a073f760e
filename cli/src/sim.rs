//! In-memory host adapter for scenario replay.
//!
//! All simulated clients share one world behind an `Rc<RefCell<_>>`; each
//! gets its own coordinator and its own view of "who am I". Broadcasts go
//! into a shared queue that the table drains and fans out after every step,
//! which is how the at-least-once channel behaves in practice.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use aurawatch_core::config::Config;
use aurawatch_core::coordinator::Coordinator;
use aurawatch_core::events::{AuraEvent, SceneNotice};
use aurawatch_core::host::{
    AuraGeometry, ChannelError, ChatError, ChatGateway, CombatView, EventChannel, FlagError,
    FlagStore, GeometryError, ItemState, Notifier, Placement, RawAura, SceneQuery, SessionInfo,
    TokenState,
};
use aurawatch_core::resolver::AuraDescriptor;
use aurawatch_types::{CombatId, Disposition, DistanceMode, ItemRef, TokenId, UserId};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::scenario::Scenario;

/// One reminder as it would appear in chat.
#[derive(Debug, Clone)]
pub struct PostedReminder {
    pub poster: UserId,
    pub speaker: TokenId,
    pub content: String,
    pub whisper_to: Option<Vec<UserId>>,
}

#[derive(Default)]
pub struct World {
    pub tokens: Vec<TokenState>,
    pub positions: HashMap<TokenId, (f64, f64)>,
    pub auras: HashMap<TokenId, Vec<RawAura>>,
    pub sessions: Vec<SessionInfo>,
    pub combat: Option<CombatView>,
    pub owners: HashMap<TokenId, Vec<UserId>>,
    pub visible: Vec<TokenId>,
    pub targets: Vec<TokenId>,
    pub flags: HashMap<(CombatId, String), Value>,
    pub published: Vec<AuraEvent>,
    pub posts: Vec<PostedReminder>,
}

impl World {
    pub fn move_token(&mut self, token: &TokenId, x: f64, y: f64) {
        self.positions.insert(token.clone(), (x, y));
    }

    pub fn delete_token(&mut self, token: &TokenId) {
        self.tokens.retain(|t| &t.id != token);
        self.positions.remove(token);
        self.auras.remove(token);
    }

    pub fn set_active_combatant(&mut self, token: &TokenId) {
        if let Some(combat) = &mut self.combat {
            if combat.active_token.as_ref() != Some(token) {
                combat.turn += 1;
            }
            combat.active_token = Some(token.clone());
        }
    }
}

#[derive(Clone)]
pub struct SimHost {
    world: Rc<RefCell<World>>,
    local: UserId,
}

impl SceneQuery for SimHost {
    fn local_user(&self) -> UserId {
        self.local.clone()
    }

    fn sessions(&self) -> Vec<SessionInfo> {
        self.world.borrow().sessions.clone()
    }

    fn combat(&self) -> Option<CombatView> {
        self.world.borrow().combat.clone()
    }

    fn tokens(&self) -> Vec<TokenState> {
        self.world.borrow().tokens.clone()
    }

    fn token(&self, id: &TokenId) -> Option<TokenState> {
        self.world.borrow().tokens.iter().find(|t| &t.id == id).cloned()
    }

    fn aura_containers(&self, token: &TokenId) -> Vec<Vec<RawAura>> {
        vec![self.world.borrow().auras.get(token).cloned().unwrap_or_default()]
    }

    fn items(&self, _token: &TokenId) -> Vec<ItemState> {
        Vec::new()
    }

    fn is_hostile(&self, a: &TokenId, b: &TokenId) -> bool {
        let world = self.world.borrow();
        let disposition = |id: &TokenId| {
            world
                .tokens
                .iter()
                .find(|t| &t.id == id)
                .map(|t| t.disposition)
        };
        match (disposition(a), disposition(b)) {
            (Some(da), Some(db)) => {
                da != db && (da == Disposition::Hostile || db == Disposition::Hostile)
            }
            _ => false,
        }
    }

    fn visible_to_party(&self, token: &TokenId) -> bool {
        self.world.borrow().visible.contains(token)
    }

    fn is_targeted(&self, token: &TokenId) -> bool {
        self.world.borrow().targets.contains(token)
    }

    fn owners(&self, token: &TokenId) -> Vec<UserId> {
        self.world.borrow().owners.get(token).cloned().unwrap_or_default()
    }

    fn aura_origin_hint(&self, _token: &TokenId, _aura: &str) -> Option<ItemRef> {
        None
    }
}

impl AuraGeometry for SimHost {
    fn is_inside(
        &self,
        source: &TokenId,
        descriptor: &AuraDescriptor,
        target: &Placement,
        _mode: DistanceMode,
    ) -> Result<bool, GeometryError> {
        let world = self.world.borrow();
        let Some(radius) = descriptor.radius else {
            return Ok(false);
        };
        let Some(&(sx, sy)) = world.positions.get(source) else {
            return Ok(false);
        };
        let (tx, ty) = match target {
            Placement::Live(token) => match world.positions.get(token) {
                Some(&p) => p,
                None => return Ok(false),
            },
            Placement::Hypothetical { x, y, .. } => (*x, *y),
        };
        let distance = ((sx - tx).powi(2) + (sy - ty).powi(2)).sqrt();
        Ok(distance <= radius + 0.01)
    }
}

impl ChatGateway for SimHost {
    async fn post_message(
        &self,
        speaker: &TokenId,
        content: &str,
        whisper_to: Option<&[UserId]>,
    ) -> Result<(), ChatError> {
        self.world.borrow_mut().posts.push(PostedReminder {
            poster: self.local.clone(),
            speaker: speaker.clone(),
            content: content.to_string(),
            whisper_to: whisper_to.map(<[UserId]>::to_vec),
        });
        Ok(())
    }
}

impl FlagStore for SimHost {
    async fn get_flag(&self, combat: &CombatId, key: &str) -> Result<Option<Value>, FlagError> {
        Ok(self
            .world
            .borrow()
            .flags
            .get(&(combat.clone(), key.to_string()))
            .cloned())
    }

    async fn set_flag(&self, combat: &CombatId, key: &str, value: Value) -> Result<(), FlagError> {
        self.world
            .borrow_mut()
            .flags
            .insert((combat.clone(), key.to_string()), value);
        Ok(())
    }

    async fn unset_flag(&self, combat: &CombatId, key: &str) -> Result<(), FlagError> {
        self.world
            .borrow_mut()
            .flags
            .remove(&(combat.clone(), key.to_string()));
        Ok(())
    }
}

impl EventChannel for SimHost {
    fn publish(&self, event: &AuraEvent) -> Result<(), ChannelError> {
        self.world.borrow_mut().published.push(event.clone());
        Ok(())
    }
}

impl Notifier for SimHost {
    fn notify_operator(&self, message: &str) {
        tracing::warn!(message, "operator notification");
    }
}

/// All simulated clients plus the shared world.
pub struct Table {
    pub world: Rc<RefCell<World>>,
    pub clients: Vec<Coordinator<SimHost>>,
}

impl Table {
    pub fn from_scenario(scenario: &Scenario, config: Config) -> Self {
        let mut world = World::default();
        world.sessions = scenario
            .clients
            .iter()
            .map(|c| SessionInfo {
                user: c.user.as_str().into(),
                is_gm: c.gm,
                active: true,
            })
            .collect();

        for token in &scenario.tokens {
            let id: TokenId = token.id.as_str().into();
            world.tokens.push(TokenState {
                id: id.clone(),
                actor: format!("actor-{}", token.id).into(),
                name: token.name.clone(),
                scene: "scene".into(),
                hidden: false,
                defeated: false,
                disposition: token.disposition,
                party_member: token.disposition == Disposition::Friendly,
            });
            world.positions.insert(id.clone(), (token.x, token.y));
            if token.disposition == Disposition::Hostile && !token.undetected {
                world.visible.push(id.clone());
            }
            if !token.owners.is_empty() {
                world.owners.insert(
                    id.clone(),
                    token.owners.iter().map(|u| u.as_str().into()).collect(),
                );
            }
            for aura in &token.auras {
                world.auras.entry(id.clone()).or_default().push(RawAura {
                    slug: Some(aura.slug.clone()),
                    container_key: None,
                    name: Some(aura.name.clone()),
                    radius: Some(aura.radius),
                    origin: aura.origin.as_deref().map(ItemRef::from),
                    traits: vec!["aura".into()],
                });
            }
        }

        if let Some(combat) = &scenario.combat {
            world.combat = Some(CombatView {
                id: combat.id.as_str().into(),
                round: combat.round,
                turn: combat.turn,
                active_token: Some(combat.active.as_str().into()),
                combatant_tokens: combat.combatants.iter().map(|t| t.as_str().into()).collect(),
            });
        }

        let world = Rc::new(RefCell::new(world));
        let clients = scenario
            .clients
            .iter()
            .map(|c| {
                Coordinator::new(
                    SimHost {
                        world: Rc::clone(&world),
                        local: c.user.as_str().into(),
                    },
                    config.clone(),
                )
            })
            .collect();
        Self { world, clients }
    }

    /// Fan a notice out to every client, then drain and deliver broadcasts.
    pub async fn notice_all(&mut self, notice: SceneNotice, now: DateTime<Utc>) {
        for client in &mut self.clients {
            client.on_notice(notice.clone(), now).await;
        }
        let events: Vec<AuraEvent> = self.world.borrow_mut().published.drain(..).collect();
        for event in &events {
            for client in &mut self.clients {
                client.on_receive(event.clone(), now).await;
            }
        }
    }

    pub fn drain_posts(&self) -> Vec<PostedReminder> {
        self.world.borrow_mut().posts.drain(..).collect()
    }
}
