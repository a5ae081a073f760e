//! Per-combat suppression store.
//!
//! An operator can mute a specific (source, aura, target) combination for
//! the current combat. The store is a single flat string-keyed boolean map
//! persisted on the combat entity through the host's flag accessors — the
//! only cross-client-shared mutable state in the engine. Absence of a key
//! means "not suppressed"; a `false` value is never stored.
//!
//! Keys are scene-qualified (`{scene}:{token}|{aura}|{scene}:{token}`).
//! An older deployment wrote document-reference keys
//! (`Scene.<id>.Token.<id>|...`); those are still read and rewritten to the
//! current form the first time the store is read for a combat.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use aurawatch_types::{CombatId, SceneTokenRef, UserId};

use crate::host::{FlagError, FlagStore};

/// Flag key under which the map is persisted on the combat entity.
pub const SUPPRESSION_FLAG_KEY: &str = "suppressions";

/// Bounded retries for the verify-after-write loop. Persistence in the host
/// may be eventually consistent, but indefinite retrying would mask a real
/// storage problem.
pub const WRITE_RETRIES: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum SuppressionError {
    #[error("suppression storage: {0}")]
    Storage(#[from] FlagError),

    #[error("suppression map for combat {combat} is malformed: {source}")]
    Malformed {
        combat: CombatId,
        source: serde_json::Error,
    },

    #[error("suppression write for '{key}' did not round-trip after {attempts} attempts")]
    WriteDiverged { key: String, attempts: u32 },

    #[error("user {user} lacks permission to edit suppressions")]
    PermissionDenied { user: UserId },
}

/// A fully-qualified suppression key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressionKey {
    pub source: SceneTokenRef,
    pub aura: String,
    pub target: SceneTokenRef,
}

impl SuppressionKey {
    pub fn new(source: SceneTokenRef, aura: impl Into<String>, target: SceneTokenRef) -> Self {
        Self {
            source,
            aura: aura.into(),
            target,
        }
    }

    /// Parse the current key format.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, '|');
        let source = SceneTokenRef::parse(parts.next()?)?;
        let aura = parts.next()?;
        let target = SceneTokenRef::parse(parts.next()?)?;
        if aura.is_empty() {
            return None;
        }
        Some(Self::new(source, aura, target))
    }

    /// Parse the legacy document-reference key format.
    pub fn parse_legacy(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, '|');
        let source = parse_legacy_ref(parts.next()?)?;
        let aura = parts.next()?;
        let target = parse_legacy_ref(parts.next()?)?;
        if aura.is_empty() {
            return None;
        }
        Some(Self::new(source, aura, target))
    }
}

impl fmt::Display for SuppressionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.source, self.aura, self.target)
    }
}

/// `Scene.<id>.Token.<id>` → scene-qualified ref.
fn parse_legacy_ref(s: &str) -> Option<SceneTokenRef> {
    let parts: Vec<&str> = s.split('.').collect();
    match parts.as_slice() {
        ["Scene", scene, "Token", token] if !scene.is_empty() && !token.is_empty() => {
            Some(SceneTokenRef::new(*scene, *token))
        }
        _ => None,
    }
}

/// Rewrite legacy keys to the current format. Entries that are `false`, or
/// whose key parses in neither format, are dropped rather than propagated.
/// Idempotent: a map already in the current format passes through unchanged.
pub fn migrate_map(map: BTreeMap<String, bool>) -> (BTreeMap<String, bool>, bool) {
    let mut migrated = BTreeMap::new();
    let mut changed = false;

    for (key, value) in map {
        if !value {
            changed = true;
            continue;
        }
        if SuppressionKey::parse(&key).is_some() {
            migrated.insert(key, true);
        } else if let Some(parsed) = SuppressionKey::parse_legacy(&key) {
            migrated.insert(parsed.to_string(), true);
            changed = true;
        } else {
            tracing::warn!(key = %key, "dropping unparseable suppression entry");
            changed = true;
        }
    }

    (migrated, changed)
}

/// Read/write access to the persisted map, with lazy migration and
/// verify-after-write. Tracks which combats have already been migrated this
/// session.
#[derive(Debug, Default)]
pub struct SuppressionStore {
    migrated: HashSet<CombatId>,
}

impl SuppressionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full map for a combat, migrating legacy keys on first read.
    pub async fn read_map<F: FlagStore>(
        &mut self,
        flags: &F,
        combat: &CombatId,
    ) -> Result<BTreeMap<String, bool>, SuppressionError> {
        let map = match flags.get_flag(combat, SUPPRESSION_FLAG_KEY).await? {
            Some(value) => {
                serde_json::from_value(value).map_err(|source| SuppressionError::Malformed {
                    combat: combat.clone(),
                    source,
                })?
            }
            None => BTreeMap::new(),
        };

        if self.migrated.contains(combat) {
            return Ok(map);
        }

        let (map, changed) = migrate_map(map);
        if changed {
            self.persist(flags, combat, &map).await?;
        }
        self.migrated.insert(combat.clone());
        Ok(map)
    }

    pub async fn is_suppressed<F: FlagStore>(
        &mut self,
        flags: &F,
        combat: &CombatId,
        key: &SuppressionKey,
    ) -> Result<bool, SuppressionError> {
        let map = self.read_map(flags, combat).await?;
        Ok(map.get(&key.to_string()).copied().unwrap_or(false))
    }

    /// Set or clear one suppression flag. Read-modify-write on the full map,
    /// then verify the entry round-trips, retrying a bounded number of
    /// times.
    pub async fn set_suppressed<F: FlagStore>(
        &mut self,
        flags: &F,
        combat: &CombatId,
        key: &SuppressionKey,
        suppressed: bool,
    ) -> Result<(), SuppressionError> {
        let key_string = key.to_string();
        let mut map = self.read_map(flags, combat).await?;
        if suppressed {
            map.insert(key_string.clone(), true);
        } else {
            map.remove(&key_string);
        }

        for attempt in 1..=WRITE_RETRIES {
            self.persist(flags, combat, &map).await?;

            let readback = match flags.get_flag(combat, SUPPRESSION_FLAG_KEY).await? {
                Some(value) => serde_json::from_value::<BTreeMap<String, bool>>(value)
                    .unwrap_or_default(),
                None => BTreeMap::new(),
            };
            let stored = readback.get(&key_string).copied().unwrap_or(false);
            if stored == suppressed {
                return Ok(());
            }
            tracing::warn!(
                key = %key_string,
                attempt,
                "suppression write did not round-trip; retrying"
            );
        }

        Err(SuppressionError::WriteDiverged {
            key: key_string,
            attempts: WRITE_RETRIES,
        })
    }

    async fn persist<F: FlagStore>(
        &self,
        flags: &F,
        combat: &CombatId,
        map: &BTreeMap<String, bool>,
    ) -> Result<(), SuppressionError> {
        if map.is_empty() {
            flags.unset_flag(combat, SUPPRESSION_FLAG_KEY).await?;
        } else {
            let value =
                serde_json::to_value(map).map_err(|source| SuppressionError::Malformed {
                    combat: combat.clone(),
                    source,
                })?;
            flags.set_flag(combat, SUPPRESSION_FLAG_KEY, value).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "suppression_tests.rs"]
mod suppression_tests;
