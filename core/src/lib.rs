pub mod compose;
pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod dedup;
pub mod election;
pub mod events;
pub mod host;
pub mod movement;
pub mod overview;
pub mod resolver;
pub mod suppression;

// Re-exports for convenience
pub use config::{Config, ConfigError, load_config};
pub use coordinator::Coordinator;
pub use events::{AuraEvent, EventKind, MoveStart, SceneNotice};
pub use host::{Host, Placement};
pub use resolver::{HitKey, HitSet};
pub use suppression::{SuppressionError, SuppressionKey};
