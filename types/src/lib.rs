//! Shared plain types for the AURAWATCH engine.
//!
//! These are the vocabulary types passed between the core engine, host
//! adapters, and the UI read model. No behavior lives here beyond identity
//! formatting and enum defaults.

mod ids;

pub use ids::{ActorId, CombatId, ItemRef, SceneId, SceneTokenRef, TokenId, UserId};

use serde::{Deserialize, Serialize};

/// Alliance relation of a token, as reported by the host's disposition
/// lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Friendly,
    Neutral,
    Hostile,
}

/// How the geometric collaborator should evaluate aura membership when it
/// falls back from an opaque containment test to a distance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistanceMode {
    /// Edge-to-edge distance (default).
    #[default]
    Edge,
    /// Center-to-center distance.
    Center,
    /// Center-to-center for single-square tokens, edge-to-edge otherwise.
    MediumCenterLargeEdge,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_mode_parses_kebab_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: DistanceMode,
        }
        let w: Wrapper = toml::from_str(r#"mode = "medium-center-large-edge""#).unwrap();
        assert_eq!(w.mode, DistanceMode::MediumCenterLargeEdge);
    }

    #[test]
    fn distance_mode_defaults_to_edge() {
        assert_eq!(DistanceMode::default(), DistanceMode::Edge);
    }
}
