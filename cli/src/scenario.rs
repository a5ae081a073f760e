//! Scenario file format for the replay binary.
//!
//! A scenario describes a table (connected clients), a scene (tokens and
//! their auras) and a script of steps. Every step is observed by every
//! client, so the replay exercises the election and dedup paths the same way
//! a live table would.

use std::path::{Path, PathBuf};

use aurawatch_types::Disposition;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("failed to read scenario {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse scenario {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub clients: Vec<ClientSpec>,
    #[serde(default)]
    pub tokens: Vec<TokenSpec>,
    pub combat: Option<CombatSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientSpec {
    pub user: String,
    #[serde(default)]
    pub gm: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenSpec {
    pub id: String,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub disposition: Disposition,
    /// Hostile tokens are party-visible unless this is set.
    #[serde(default)]
    pub undetected: bool,
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default)]
    pub auras: Vec<AuraSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuraSpec {
    pub slug: String,
    pub name: String,
    pub radius: f64,
    pub origin: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CombatSpec {
    #[serde(default = "default_combat_id")]
    pub id: String,
    pub active: String,
    pub combatants: Vec<String>,
    #[serde(default = "default_round")]
    pub round: u32,
    #[serde(default)]
    pub turn: u32,
}

fn default_combat_id() -> String {
    "combat".to_string()
}

fn default_round() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case", deny_unknown_fields)]
pub enum Step {
    /// A continuous move: in-flight notice at the current position, then the
    /// concluded notice at the destination.
    Move {
        token: String,
        user: Option<String>,
        x: f64,
        y: f64,
    },
    /// A single committed position change.
    Commit {
        token: String,
        user: Option<String>,
        move_id: Option<u64>,
        x: f64,
        y: f64,
    },
    TurnStart {
        token: String,
    },
    ItemChanged {
        token: String,
        slug: Option<String>,
    },
    DeleteToken {
        token: String,
    },
}

pub fn load_scenario(path: &Path) -> Result<Scenario, ScenarioError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ScenarioError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
