//! Aura hit-set resolution.
//!
//! Given a target token (at a live or hypothetical placement), enumerate
//! every aura currently affecting it and return a canonical set of stable
//! occupancy keys. Geometry is delegated to the host; this module owns
//! candidate filtering, descriptor normalization and the trait-item
//! synthesis path.

use std::collections::BTreeSet;
use std::fmt;

use aurawatch_types::{ItemRef, TokenId};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::config::Config;
use crate::host::{AuraGeometry, ItemState, Placement, RawAura, SceneQuery, TokenState};

/// One normalized hazard zone projected by a source token.
///
/// `identifier` is deterministic and stable across repeated queries of the
/// same logical aura even when the underlying container object is recreated
/// each frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AuraDescriptor {
    pub identifier: String,
    pub radius: Option<f64>,
    pub origin: Option<ItemRef>,
    pub slug: Option<String>,
    pub name: Option<String>,
    pub traits: Vec<String>,
    /// Synthesized from a trait marker without a usable radius: kept for
    /// operator visibility only, never membership-tested.
    pub diagnostic_only: bool,
}

impl AuraDescriptor {
    /// Display name for chat output: explicit name, else slug, else the
    /// identifier itself.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.slug.as_deref())
            .unwrap_or(&self.identifier)
    }
}

/// One aura-occupancy key: `{source}-{identifier}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HitKey {
    pub source: TokenId,
    pub aura: String,
}

impl HitKey {
    pub fn new(source: impl Into<TokenId>, aura: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            aura: aura.into(),
        }
    }
}

impl fmt::Display for HitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.source, self.aura)
    }
}

/// The set of aura-occupancy keys currently true for one token. Ordered so
/// diffs and event emission are deterministic.
pub type HitSet = BTreeSet<HitKey>;

/// Normalize a slug or name for matching: decomposed with diacritics
/// stripped, lowercased, non-alphanumerics collapsed to single hyphens.
/// Host data is free-form user text; ASCII-written aliases and matchers must
/// still hit accented spellings of the same aura.
pub fn normalize_identifier(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_gap = false;
    for c in value.nfkd() {
        if is_combining_mark(c) {
            continue;
        }
        if c.is_alphanumeric() {
            if pending_gap && !out.is_empty() {
                out.push('-');
            }
            pending_gap = false;
            for lower in c.to_lowercase() {
                out.push(lower);
            }
        } else {
            pending_gap = true;
        }
    }
    out
}

type IdentifierFn = fn(&RawAura) -> Option<String>;

/// Ordered identifier derivation chain. The host's aura representation is
/// not guaranteed to expose a stable primary key, so each strategy is tried
/// in sequence until one yields an identifier.
const IDENTIFIER_CHAIN: &[(&str, IdentifierFn)] = &[
    ("slug", |raw| {
        raw.slug
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(normalize_identifier)
    }),
    ("container-key", |raw| {
        raw.container_key
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(normalize_identifier)
    }),
    ("origin", |raw| {
        raw.origin.as_ref().map(|o| format!("origin-{}", o))
    }),
    ("name-radius", |raw| {
        raw.name.as_deref().filter(|s| !s.is_empty()).map(|name| {
            match raw.radius {
                Some(radius) => format!("{}-{}", normalize_identifier(name), radius),
                None => normalize_identifier(name),
            }
        })
    }),
];

/// Key prefix for synthesized trait-marker descriptors.
pub const TRAIT_ITEM_PREFIX: &str = "trait-item:";

fn descriptor_from_raw(raw: &RawAura) -> Option<AuraDescriptor> {
    let identifier = IDENTIFIER_CHAIN
        .iter()
        .find_map(|(_, derive)| derive(raw))?;
    Some(AuraDescriptor {
        identifier,
        radius: raw.radius,
        origin: raw.origin.clone(),
        slug: raw.slug.as_deref().map(normalize_identifier),
        name: raw.name.clone(),
        traits: raw.traits.clone(),
        diagnostic_only: false,
    })
}

fn synthesize_from_item(item: &ItemState) -> AuraDescriptor {
    AuraDescriptor {
        identifier: format!("{TRAIT_ITEM_PREFIX}{}", item.id),
        radius: item.radius_hint,
        origin: Some(item.id.clone()),
        slug: item.slug.as_deref().map(normalize_identifier),
        name: Some(item.name.clone()),
        traits: Vec::new(),
        diagnostic_only: item.radius_hint.is_none(),
    }
}

/// Resolves hit-sets against one host. Stateless; holds borrowed host and
/// config for the duration of a query batch.
pub struct HitResolver<'a, H> {
    host: &'a H,
    config: &'a Config,
}

impl<'a, H: SceneQuery + AuraGeometry> HitResolver<'a, H> {
    pub fn new(host: &'a H, config: &'a Config) -> Self {
        Self { host, config }
    }

    /// All descriptors a source token currently projects, including
    /// diagnostic-only synthesized ones.
    pub fn descriptors_for(&self, source: &TokenId) -> Vec<AuraDescriptor> {
        let mut descriptors: Vec<AuraDescriptor> = self
            .host
            .aura_containers(source)
            .into_iter()
            .find_map(|container| {
                let normalized: Vec<_> = container.iter().filter_map(descriptor_from_raw).collect();
                (!normalized.is_empty()).then_some(normalized)
            })
            .unwrap_or_default();

        // Trait markers synthesize a descriptor unless a real aura with the
        // same slug already exists (which would double-count it).
        let known_slugs: BTreeSet<String> = descriptors
            .iter()
            .filter_map(|d| d.slug.clone())
            .collect();
        for item in self.host.items(source) {
            if !item.grants_aura_trait {
                continue;
            }
            let item_slug = item.slug.as_deref().map(normalize_identifier);
            if item_slug.is_some_and(|s| known_slugs.contains(&s)) {
                continue;
            }
            descriptors.push(synthesize_from_item(&item));
        }

        descriptors
    }

    /// All combat-relevant aura sources that could affect `target`, with
    /// their descriptors.
    pub fn sources_for(&self, target: &TokenState) -> Vec<(TokenState, Vec<AuraDescriptor>)> {
        self.host
            .tokens()
            .into_iter()
            .filter(|candidate| candidate.id != target.id)
            .filter(|candidate| !candidate.hidden && !candidate.defeated)
            .filter(|candidate| self.relation_allows(candidate, target))
            .filter_map(|candidate| {
                let descriptors = self.descriptors_for(&candidate.id);
                (!descriptors.is_empty()).then_some((candidate, descriptors))
            })
            .collect()
    }

    fn relation_allows(&self, candidate: &TokenState, target: &TokenState) -> bool {
        let hostile = self.host.is_hostile(&candidate.id, &target.id);
        if !self.config.include_allied_auras && !hostile {
            return false;
        }
        // Undetected hostile threats must not leak to the player faction.
        if hostile
            && target.party_member
            && self.config.require_visible_enemies
            && !self.host.visible_to_party(&candidate.id)
        {
            return false;
        }
        true
    }

    /// The hit-set for `target` evaluated at `placement`.
    pub fn hits_for(&self, target: &TokenState, placement: &Placement) -> HitSet {
        let mut hits = HitSet::new();
        for (source, descriptors) in self.sources_for(target) {
            for descriptor in &descriptors {
                if descriptor.diagnostic_only {
                    continue;
                }
                match self.host.is_inside(
                    &source.id,
                    descriptor,
                    placement,
                    self.config.distance_mode,
                ) {
                    Ok(true) => {
                        hits.insert(HitKey::new(source.id.clone(), descriptor.identifier.clone()));
                    }
                    Ok(false) => {}
                    Err(e) => {
                        // Partial failure must not block unrelated hits.
                        tracing::warn!(
                            error = %e,
                            source = %source.id,
                            aura = %descriptor.identifier,
                            "membership probe failed; treating as not inside"
                        );
                    }
                }
            }
        }
        hits
    }
}
