//! Engine configuration.
//!
//! Loaded once from a single TOML file and passed into the coordinator at
//! construction. Every key has a default, so an empty file (or no file) is a
//! valid configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use aurawatch_types::DistanceMode;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// A config-driven reminder augmentation: when a descriptor's normalized
/// slug or name contains `matcher`, `prompt` is appended to the reminder.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Augmentation {
    pub matcher: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Hostile sources must be perceived by the player faction before their
    /// auras can affect party tokens.
    pub require_visible_enemies: bool,
    /// Post reminders publicly instead of whispering to GMs.
    pub public_chat: bool,
    /// Also track auras projected by non-hostile sources.
    pub include_allied_auras: bool,
    /// Evaluation-mode hint passed through to the geometry predicate.
    pub distance_mode: DistanceMode,
    /// Normalized aura identifier → item slug, consulted when origin
    /// resolution finds no direct item match.
    pub slug_aliases: BTreeMap<String, String>,
    pub augmentations: Vec<Augmentation>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            require_visible_enemies: true,
            public_chat: false,
            include_allied_auras: false,
            distance_mode: DistanceMode::default(),
            slug_aliases: BTreeMap::new(),
            augmentations: Vec::new(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
