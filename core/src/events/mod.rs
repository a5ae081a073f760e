pub mod notice;
pub mod payload;

pub use notice::{MoveStart, SceneNotice};
pub use payload::{AuraEvent, EventKind};
