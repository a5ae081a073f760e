//! End-to-end pipeline tests: several simulated clients share one scene and
//! one broadcast queue, and every client observes every notice, as on a real
//! table.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use aurawatch_core::config::Config;
use aurawatch_core::coordinator::Coordinator;
use aurawatch_core::events::{AuraEvent, EventKind, MoveStart, SceneNotice};
use aurawatch_core::host::{
    AuraGeometry, ChannelError, ChatError, ChatGateway, CombatView, EventChannel, FlagError,
    FlagStore, ItemState, Notifier, Placement, RawAura, SceneQuery, SessionInfo, TokenState,
};
use aurawatch_core::resolver::AuraDescriptor;
use aurawatch_types::{CombatId, Disposition, DistanceMode, ItemRef, TokenId, UserId};
use chrono::{DateTime, Utc};
use serde_json::Value;

#[derive(Default)]
struct World {
    tokens: Vec<TokenState>,
    positions: HashMap<TokenId, (f64, f64)>,
    auras: HashMap<TokenId, Vec<RawAura>>,
    items: HashMap<TokenId, Vec<ItemState>>,
    sessions: Vec<SessionInfo>,
    combat: Option<CombatView>,
    owners: HashMap<TokenId, Vec<UserId>>,
    visible: Vec<TokenId>,
    targets: Vec<TokenId>,
    flags: HashMap<(CombatId, String), Value>,
    published: Vec<AuraEvent>,
    posts: Vec<(UserId, TokenId, String, Option<Vec<UserId>>)>,
}

#[derive(Clone)]
struct FakeHost {
    world: Rc<RefCell<World>>,
    local: UserId,
}

impl SceneQuery for FakeHost {
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

    fn items(&self, token: &TokenId) -> Vec<ItemState> {
        self.world.borrow().items.get(token).cloned().unwrap_or_default()
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

impl AuraGeometry for FakeHost {
    fn is_inside(
        &self,
        source: &TokenId,
        descriptor: &AuraDescriptor,
        target: &Placement,
        _mode: DistanceMode,
    ) -> Result<bool, aurawatch_core::host::GeometryError> {
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

impl ChatGateway for FakeHost {
    async fn post_message(
        &self,
        speaker: &TokenId,
        content: &str,
        whisper_to: Option<&[UserId]>,
    ) -> Result<(), ChatError> {
        self.world.borrow_mut().posts.push((
            self.local.clone(),
            speaker.clone(),
            content.to_string(),
            whisper_to.map(<[UserId]>::to_vec),
        ));
        Ok(())
    }
}

impl FlagStore for FakeHost {
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

impl EventChannel for FakeHost {
    fn publish(&self, event: &AuraEvent) -> Result<(), ChannelError> {
        self.world.borrow_mut().published.push(event.clone());
        Ok(())
    }
}

impl Notifier for FakeHost {
    fn notify_operator(&self, _message: &str) {}
}

/// A table of clients sharing one world and one broadcast queue.
struct Table {
    world: Rc<RefCell<World>>,
    clients: Vec<Coordinator<FakeHost>>,
}

impl Table {
    fn new(users: &[(&str, bool)], config: Config) -> Self {
        let mut world = World::default();
        world.sessions = users
            .iter()
            .map(|(user, is_gm)| SessionInfo {
                user: (*user).into(),
                is_gm: *is_gm,
                active: true,
            })
            .collect();
        let world = Rc::new(RefCell::new(world));
        let clients = users
            .iter()
            .map(|(user, _)| {
                Coordinator::new(
                    FakeHost {
                        world: Rc::clone(&world),
                        local: (*user).into(),
                    },
                    config.clone(),
                )
            })
            .collect();
        Self { world, clients }
    }

    fn add_token(&self, id: &str, name: &str, x: f64, y: f64, disposition: Disposition) {
        let party = disposition == Disposition::Friendly;
        let mut world = self.world.borrow_mut();
        world.tokens.push(TokenState {
            id: id.into(),
            actor: format!("actor-{id}").into(),
            name: name.to_string(),
            scene: "sc".into(),
            hidden: false,
            defeated: false,
            disposition,
            party_member: party,
        });
        world.positions.insert(id.into(), (x, y));
        if disposition == Disposition::Hostile {
            world.visible.push(id.into());
        }
    }

    fn add_aura(&self, token: &str, slug: &str, name: &str, radius: f64, origin: &str) {
        self.world.borrow_mut().auras.entry(token.into()).or_default().push(RawAura {
            slug: Some(slug.to_string()),
            container_key: None,
            name: Some(name.to_string()),
            radius: Some(radius),
            origin: Some(origin.into()),
            traits: vec!["aura".into()],
        });
    }

    fn start_combat(&self, active: &str, combatants: &[&str]) {
        self.world.borrow_mut().combat = Some(CombatView {
            id: "c1".into(),
            round: 1,
            turn: 0,
            active_token: Some(active.into()),
            combatant_tokens: combatants.iter().map(|&t| t.into()).collect(),
        });
    }

    fn move_token(&self, id: &str, x: f64, y: f64) {
        self.world.borrow_mut().positions.insert(id.into(), (x, y));
    }

    /// Every client observes the notice, then the broadcast queue is drained
    /// and delivered to every client.
    async fn notice_all(&mut self, notice: SceneNotice, now: DateTime<Utc>) {
        for client in &mut self.clients {
            client.on_notice(notice.clone(), now).await;
        }
        self.deliver_broadcasts(now).await;
    }

    async fn deliver_broadcasts(&mut self, now: DateTime<Utc>) {
        let events: Vec<AuraEvent> = self.world.borrow_mut().published.drain(..).collect();
        for event in &events {
            for client in &mut self.clients {
                client.on_receive(event.clone(), now).await;
            }
        }
        // Re-queue for assertions.
        self.world.borrow_mut().published = events;
    }

    fn posts(&self) -> Vec<(UserId, TokenId, String, Option<Vec<UserId>>)> {
        self.world.borrow().posts.clone()
    }

    fn published(&self) -> Vec<AuraEvent> {
        self.world.borrow().published.clone()
    }
}

fn at(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
}

fn fire_table() -> Table {
    let table = Table::new(&[("gm-a", true), ("alice", false)], Config::default());
    table.add_token("S", "Icicle Elemental", 0.0, 0.0, Disposition::Hostile);
    table.add_token("T", "Tessa", 15.0, 0.0, Disposition::Friendly);
    table.add_aura("S", "fire", "Flame Mantle", 10.0, "Item.fire");
    table
        .world
        .borrow_mut()
        .owners
        .insert("T".into(), vec!["alice".into()]);
    table.start_combat("T", &["S", "T"]);
    table
}

async fn run_fire_move(table: &mut Table) {
    table
        .notice_all(
            SceneNotice::TokenUpdated {
                token: "T".into(),
                acting_user: Some("alice".into()),
                movement: Some(MoveStart { x: 15.0, y: 0.0 }),
            },
            at(0),
        )
        .await;
    table.move_token("T", 4.0, 0.0);
    table
        .notice_all(
            SceneNotice::TokenUpdated {
                token: "T".into(),
                acting_user: Some("alice".into()),
                movement: None,
            },
            at(100),
        )
        .await;
}

#[tokio::test]
async fn walking_into_an_aura_produces_one_reminder() {
    let mut table = fire_table();
    run_fire_move(&mut table).await;

    // Exactly one emission despite both clients observing the change.
    let published = table.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].kind, EventKind::Enter);
    assert_eq!(published[0].aura, "fire");

    // Exactly one post, rendered by the primary GM, whispered to GMs.
    let posts = table.posts();
    assert_eq!(posts.len(), 1);
    let (poster, speaker, content, whisper) = &posts[0];
    assert_eq!(poster, &UserId::from("gm-a"));
    assert_eq!(speaker, &TokenId::from("T"));
    assert!(content.contains("Tessa"));
    assert!(content.contains("Icicle Elemental"));
    assert!(content.contains("@UUID[Item.fire]{Flame Mantle}"));
    assert_eq!(whisper.as_deref(), Some(&["gm-a".into()][..]));
}

#[tokio::test]
async fn redelivered_broadcasts_do_not_repeat_the_reminder() {
    let mut table = fire_table();
    run_fire_move(&mut table).await;

    // The channel redelivers the same event twice more.
    table.deliver_broadcasts(at(200)).await;
    table.deliver_broadcasts(at(300)).await;
    assert_eq!(table.posts().len(), 1);
}

#[tokio::test]
async fn starting_inside_and_staying_inside_is_silent() {
    let mut table = fire_table();
    table.move_token("T", 4.0, 0.0);
    table
        .notice_all(
            SceneNotice::TokenUpdated {
                token: "T".into(),
                acting_user: Some("alice".into()),
                movement: Some(MoveStart { x: 4.0, y: 0.0 }),
            },
            at(0),
        )
        .await;
    table.move_token("T", 6.0, 0.0);
    table
        .notice_all(
            SceneNotice::TokenUpdated {
                token: "T".into(),
                acting_user: Some("alice".into()),
                movement: None,
            },
            at(100),
        )
        .await;

    assert!(table.published().is_empty());
    assert!(table.posts().is_empty());
}

#[tokio::test]
async fn turn_start_inside_an_aura_reminds_without_a_diff() {
    let mut table = fire_table();
    table.move_token("T", 4.0, 0.0);
    table
        .notice_all(SceneNotice::TurnStarted { token: "T".into() }, at(0))
        .await;

    let published = table.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].kind, EventKind::StartTurn);

    let posts = table.posts();
    assert_eq!(posts.len(), 1);
    assert!(posts[0].2.contains("begins the turn"));
}

#[tokio::test]
async fn stale_turn_start_is_dropped() {
    let mut table = fire_table();
    table.move_token("T", 4.0, 0.0);

    let stale = AuraEvent {
        kind: EventKind::StartTurn,
        target_token: "S".into(),
        source_token: "S".into(),
        aura: "fire".into(),
        combat: Some("c1".into()),
        round: 1,
        turn: 1,
        sequence: 0,
    };
    // Active combatant is T, not S.
    for client in &mut table.clients {
        client.on_receive(stale.clone(), at(0)).await;
    }
    assert!(table.posts().is_empty());
}

#[tokio::test]
async fn suppressed_pair_stays_silent_but_still_emits() {
    let mut table = fire_table();
    let mut map = std::collections::BTreeMap::new();
    map.insert("sc:S|fire|sc:T".to_string(), true);
    table.world.borrow_mut().flags.insert(
        ("c1".into(), "suppressions".to_string()),
        serde_json::to_value(&map).unwrap(),
    );

    run_fire_move(&mut table).await;

    assert_eq!(table.published().len(), 1);
    assert!(table.posts().is_empty());
}

#[tokio::test]
async fn unmuting_restores_delivery_for_later_transitions() {
    let mut table = fire_table();
    let mut map = std::collections::BTreeMap::new();
    map.insert("sc:S|fire|sc:T".to_string(), true);
    table.world.borrow_mut().flags.insert(
        ("c1".into(), "suppressions".to_string()),
        serde_json::to_value(&map).unwrap(),
    );
    run_fire_move(&mut table).await;
    assert!(table.posts().is_empty());

    // The GM unmutes the pair.
    let key = SuppressionKeyFixture::fire();
    table.clients[0]
        .set_suppressed(&"gm-a".into(), &key, false)
        .await
        .unwrap();

    // T leaves and re-enters; the new transition carries a fresh sequence.
    table.move_token("T", 20.0, 0.0);
    table
        .notice_all(
            SceneNotice::TokenUpdated {
                token: "T".into(),
                acting_user: Some("alice".into()),
                movement: None,
            },
            at(1000),
        )
        .await;
    table.move_token("T", 4.0, 0.0);
    table
        .notice_all(
            SceneNotice::TokenUpdated {
                token: "T".into(),
                acting_user: Some("alice".into()),
                movement: None,
            },
            at(2000),
        )
        .await;

    assert_eq!(table.posts().len(), 1);
}

#[tokio::test]
async fn players_cannot_edit_suppressions() {
    let mut table = fire_table();
    let key = SuppressionKeyFixture::fire();
    let err = table.clients[1]
        .set_suppressed(&"alice".into(), &key, true)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        aurawatch_core::SuppressionError::PermissionDenied { .. }
    ));
}

#[tokio::test]
async fn hidden_enemy_aura_does_not_leak_to_the_party() {
    let mut table = fire_table();
    // S is no longer perceived by the party.
    table.world.borrow_mut().visible.clear();
    run_fire_move(&mut table).await;
    assert!(table.published().is_empty());
    assert!(table.posts().is_empty());
}

#[tokio::test]
async fn matrix_lists_each_pair_with_suppression_state() {
    let mut table = fire_table();
    table.world.borrow_mut().targets.push("T".into());
    let key = SuppressionKeyFixture::fire();
    table.clients[0]
        .set_suppressed(&"gm-a".into(), &key, true)
        .await
        .unwrap();

    let matrix = table.clients[0].suppression_matrix().await.unwrap();
    assert_eq!(matrix.len(), 1);
    assert_eq!(matrix[0].token, TokenId::from("S"));
    assert_eq!(matrix[0].auras.len(), 1);
    let aura = &matrix[0].auras[0];
    assert_eq!(aura.identifier, "fire");
    assert_eq!(aura.targets.len(), 1);
    assert!(aura.targets[0].suppressed);
    assert!(aura.targets[0].targeted);
    assert!(!aura.targets[0].defeated);
}

struct SuppressionKeyFixture;

impl SuppressionKeyFixture {
    fn fire() -> aurawatch_core::SuppressionKey {
        aurawatch_core::SuppressionKey::new(
            aurawatch_types::SceneTokenRef::new("sc", "S"),
            "fire",
            aurawatch_types::SceneTokenRef::new("sc", "T"),
        )
    }
}
