//! The per-client engine.
//!
//! One coordinator runs on every connected client, fed scene notices by its
//! host adapter and aura events by the shared broadcast channel. Emission and
//! reception are deliberately symmetric across clients: the election
//! functions decide which single client emits for a given change, and the
//! reception pipeline is identical everywhere so any client can render the
//! reminder if it wins the poster election.
//!
//! All mutable engine state lives here. Teardown is explicit: token deletion
//! and scene reload notices clear the corresponding tracker state.

use aurawatch_types::{SceneTokenRef, TokenId, UserId};
use chrono::{DateTime, Utc};

use crate::compose;
use crate::config::Config;
use crate::dedup::DedupCache;
use crate::debounce::RefreshDebouncer;
use crate::election;
use crate::events::{AuraEvent, EventKind, MoveStart, SceneNotice};
use crate::host::{Host, Placement, TokenState};
use crate::overview::{self, MatrixSource};
use crate::resolver::{AuraDescriptor, HitKey, HitResolver, normalize_identifier};
use crate::suppression::{SuppressionError, SuppressionKey, SuppressionStore};

pub struct Coordinator<H: Host> {
    host: H,
    config: Config,
    emit_cache: DedupCache,
    recv_cache: DedupCache,
    movement: crate::movement::MovementTracker,
    suppressions: SuppressionStore,
    debouncer: RefreshDebouncer,
}

impl<H: Host> Coordinator<H> {
    pub fn new(host: H, config: Config) -> Self {
        Self {
            host,
            config,
            emit_cache: DedupCache::new(),
            recv_cache: DedupCache::new(),
            movement: crate::movement::MovementTracker::new(),
            suppressions: SuppressionStore::new(),
            debouncer: RefreshDebouncer::new(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Process one scene notice from the host adapter.
    pub async fn on_notice(&mut self, notice: SceneNotice, now: DateTime<Utc>) {
        match notice {
            SceneNotice::TokenUpdated {
                token,
                acting_user,
                movement,
            } => {
                self.on_token_updated(&token, acting_user.as_ref(), movement, now)
                    .await;
            }
            SceneNotice::PositionCommitted {
                token,
                acting_user,
                move_id,
            } => {
                self.on_position_committed(&token, acting_user.as_ref(), move_id, now)
                    .await;
            }
            SceneNotice::TurnStarted { token } => {
                self.on_turn_started(&token, now).await;
            }
            SceneNotice::ItemChanged { token, slug } => {
                if self.is_aura_relevant(&token, slug.as_deref()) {
                    self.debouncer.schedule(now);
                }
            }
            SceneNotice::TokenDeleted { token } => {
                self.movement.forget(&token);
            }
            SceneNotice::SceneReady => {
                self.movement.reset();
                self.debouncer.cancel();
            }
        }
    }

    /// Host-driven tick: runs the debounced occupancy resync once its quiet
    /// window has elapsed.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        if !self.debouncer.due(now) {
            return;
        }
        tracing::debug!("aura items changed; resyncing occupancy baselines");
        let tokens = self.host.tokens();
        for token in tokens {
            let hits = {
                let resolver = HitResolver::new(&self.host, &self.config);
                resolver.hits_for(&token, &Placement::Live(token.id.clone()))
            };
            self.movement.resync(&token.id, hits);
        }
    }

    async fn on_token_updated(
        &mut self,
        token: &TokenId,
        acting_user: Option<&UserId>,
        movement: Option<MoveStart>,
        now: DateTime<Utc>,
    ) {
        let Some(state) = self.host.token(token) else {
            tracing::debug!(token = %token, "update for unknown token");
            return;
        };
        if !self.is_elected_emitter(token, acting_user) {
            return;
        }

        match movement {
            Some(start) => {
                // Only the first in-flight notice snapshots the start; later
                // waypoint updates keep the original.
                if self.movement.move_in_flight(token) {
                    return;
                }
                let placement = Placement::Hypothetical {
                    token: token.clone(),
                    x: start.x,
                    y: start.y,
                };
                let hits = {
                    let resolver = HitResolver::new(&self.host, &self.config);
                    resolver.hits_for(&state, &placement)
                };
                self.movement.begin_move(token, hits);
            }
            None => {
                let current = {
                    let resolver = HitResolver::new(&self.host, &self.config);
                    resolver.hits_for(&state, &Placement::Live(token.clone()))
                };
                let entered = self.movement.conclude_move(token, current);
                if entered.is_empty() {
                    return;
                }
                let sequence = self.movement.next_sequence(token);
                self.emit_entries(EventKind::Enter, token, &entered, sequence, now)
                    .await;
            }
        }
    }

    async fn on_position_committed(
        &mut self,
        token: &TokenId,
        acting_user: Option<&UserId>,
        move_id: Option<u64>,
        now: DateTime<Utc>,
    ) {
        let Some(state) = self.host.token(token) else {
            return;
        };
        if !self.is_elected_emitter(token, acting_user) {
            return;
        }

        let current = {
            let resolver = HitResolver::new(&self.host, &self.config);
            resolver.hits_for(&state, &Placement::Live(token.clone()))
        };
        let entered = self.movement.commit_position(token, current);
        if entered.is_empty() {
            return;
        }
        let sequence = match move_id {
            Some(id) => id,
            None => self.movement.next_sequence(token),
        };
        self.emit_entries(EventKind::Enter, token, &entered, sequence, now)
            .await;
    }

    async fn on_turn_started(&mut self, token: &TokenId, now: DateTime<Utc>) {
        let Some(state) = self.host.token(token) else {
            return;
        };
        if !self.is_elected_emitter(token, None) {
            return;
        }

        let current = {
            let resolver = HitResolver::new(&self.host, &self.config);
            resolver.hits_for(&state, &Placement::Live(token.clone()))
        };
        let hits = self.movement.turn_start(token, current);
        if hits.is_empty() {
            return;
        }
        // Round and turn already identify a turn start; a fixed sequence
        // keeps the fingerprint identical across clients.
        self.emit_entries(EventKind::StartTurn, token, &hits, 0, now)
            .await;
    }

    fn is_elected_emitter(&self, token: &TokenId, acting_user: Option<&UserId>) -> bool {
        let sessions = self.host.sessions();
        let owners = self.host.owners(token);
        let local = self.host.local_user();
        election::is_elected_emitter(&sessions, &owners, acting_user, &local)
    }

    /// One event per entered key, all sharing the sequence of the move that
    /// produced them.
    async fn emit_entries(
        &mut self,
        kind: EventKind,
        target: &TokenId,
        keys: &[HitKey],
        sequence: u64,
        now: DateTime<Utc>,
    ) {
        let combat = self.host.combat();
        let (combat_id, round, turn) = match &combat {
            Some(view) => (Some(view.id.clone()), view.round, view.turn),
            None => (None, 0, 0),
        };
        for key in keys {
            let event = AuraEvent {
                kind,
                target_token: target.clone(),
                source_token: key.source.clone(),
                aura: key.aura.clone(),
                combat: combat_id.clone(),
                round,
                turn,
                sequence,
            };
            self.emit(event, now).await;
        }
    }

    /// Emission gate + broadcast + local loopback. Publish failures are
    /// logged; the loopback still runs so the local client renders the
    /// reminder even when the channel is down.
    pub async fn emit(&mut self, event: AuraEvent, now: DateTime<Utc>) {
        if self.emit_cache.seen_at(&event.fingerprint(), now) {
            tracing::debug!(fingerprint = %event.fingerprint(), "duplicate emission dropped");
            return;
        }
        if let Err(e) = self.host.publish(&event) {
            tracing::warn!(error = %e, "broadcast publish failed");
        }
        self.on_receive(event, now).await;
    }

    /// Reception pipeline, shared by broadcast delivery and local loopback.
    pub async fn on_receive(&mut self, event: AuraEvent, now: DateTime<Utc>) {
        if event.kind == EventKind::Unknown {
            return;
        }
        if self.recv_cache.seen_at(&event.fingerprint(), now) {
            tracing::debug!(fingerprint = %event.fingerprint(), "duplicate reception dropped");
            return;
        }

        // A START_TURN that arrives after the combat has advanced is stale.
        if event.kind == EventKind::StartTurn {
            let active = self.host.combat().and_then(|c| c.active_token);
            if active.as_ref() != Some(&event.target_token) {
                tracing::debug!(target = %event.target_token, "stale turn-start event dropped");
                return;
            }
        }

        let Some(target) = self.host.token(&event.target_token) else {
            tracing::debug!(token = %event.target_token, "event target no longer present");
            return;
        };
        let Some(source) = self.host.token(&event.source_token) else {
            tracing::debug!(token = %event.source_token, "event source no longer present");
            return;
        };
        let Some(descriptor) = self.descriptor_by_identifier(&event.source_token, &event.aura)
        else {
            tracing::debug!(aura = %event.aura, "event references an aura the source no longer projects");
            return;
        };

        if self.is_event_suppressed(&event, &source, &target).await {
            return;
        }

        let sessions = self.host.sessions();
        let local = self.host.local_user();
        if !election::is_responsible_poster(&sessions, &local) {
            return;
        }

        let origin =
            compose::resolve_origin(&self.host, &self.config, &event.source_token, &descriptor);
        let content = compose::compose_reminder(
            &event.kind,
            &target.name,
            &source.name,
            &descriptor,
            origin.as_ref(),
            &self.config.augmentations,
        );
        let whisper = compose::audience(&self.config, &sessions);
        if let Err(e) = self
            .host
            .post_message(&event.target_token, &content, whisper.as_deref())
            .await
        {
            tracing::warn!(error = %e, "reminder delivery failed");
        }
    }

    async fn is_event_suppressed(
        &mut self,
        event: &AuraEvent,
        source: &TokenState,
        target: &TokenState,
    ) -> bool {
        let Some(combat) = &event.combat else {
            return false;
        };
        let key = SuppressionKey::new(
            SceneTokenRef::new(source.scene.as_str(), source.id.as_str()),
            event.aura.clone(),
            SceneTokenRef::new(target.scene.as_str(), target.id.as_str()),
        );
        match self
            .suppressions
            .is_suppressed(&self.host, combat, &key)
            .await
        {
            Ok(suppressed) => suppressed,
            Err(e) => {
                // Default open: a broken store must not silence reminders.
                tracing::warn!(error = %e, "suppression lookup failed; treating as not suppressed");
                false
            }
        }
    }

    fn descriptor_by_identifier(
        &self,
        source: &TokenId,
        identifier: &str,
    ) -> Option<AuraDescriptor> {
        let resolver = HitResolver::new(&self.host, &self.config);
        resolver
            .descriptors_for(source)
            .into_iter()
            .find(|d| d.identifier == identifier)
    }

    fn is_aura_relevant(&self, token: &TokenId, slug: Option<&str>) -> bool {
        let Some(slug) = slug else {
            return false;
        };
        let slug = normalize_identifier(slug);
        if slug.is_empty() {
            return false;
        }
        let grants = self
            .host
            .items(token)
            .iter()
            .any(|item| {
                item.grants_aura_trait
                    && item.slug.as_deref().map(normalize_identifier) == Some(slug.clone())
            });
        if grants {
            return true;
        }
        let resolver = HitResolver::new(&self.host, &self.config);
        resolver
            .descriptors_for(token)
            .iter()
            .any(|d| d.slug.as_deref() == Some(&slug) || d.identifier == slug)
    }

    /// Permission-checked suppression edit. Rejections and write divergence
    /// are reported to the operator through the notifier.
    pub async fn set_suppressed(
        &mut self,
        user: &UserId,
        key: &SuppressionKey,
        suppressed: bool,
    ) -> Result<(), SuppressionError> {
        let is_gm = self
            .host
            .sessions()
            .iter()
            .any(|s| s.is_gm && &s.user == user);
        if !is_gm {
            self.host
                .notify_operator(&format!("{user} may not edit aura suppressions"));
            return Err(SuppressionError::PermissionDenied { user: user.clone() });
        }
        let Some(combat) = self.host.combat() else {
            tracing::debug!("suppression edit outside combat ignored");
            return Ok(());
        };
        let result = self
            .suppressions
            .set_suppressed(&self.host, &combat.id, key, suppressed)
            .await;
        if let Err(SuppressionError::WriteDiverged { key, attempts }) = &result {
            self.host.notify_operator(&format!(
                "suppression change for {key} did not persist after {attempts} attempts"
            ));
        }
        result
    }

    /// The sources → auras → targets read model for UI panels.
    pub async fn suppression_matrix(&mut self) -> Result<Vec<MatrixSource>, SuppressionError> {
        overview::suppression_matrix(&self.host, &self.config, &mut self.suppressions).await
    }
}
