//! Identity newtypes.
//!
//! All host documents are addressed by opaque string ids. Newtypes keep the
//! different id spaces from being mixed up at call sites; `SceneTokenRef` is
//! the scene-qualified form used for durable keys (suppression entries).

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// A token placed on a scene.
    TokenId
);
string_id!(
    /// The actor a token represents.
    ActorId
);
string_id!(
    /// A connected user session.
    UserId
);
string_id!(
    /// The scene a token lives on.
    SceneId
);
string_id!(
    /// A combat encounter document.
    CombatId
);
string_id!(
    /// A durable reference to an item or effect document.
    ItemRef
);

/// Scene-qualified token identity: `{scene}:{token}`.
///
/// This is the preferred identity form for durable keys; a token id alone is
/// only unique within its scene.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SceneTokenRef {
    pub scene: SceneId,
    pub token: TokenId,
}

impl SceneTokenRef {
    pub fn new(scene: impl Into<SceneId>, token: impl Into<TokenId>) -> Self {
        Self {
            scene: scene.into(),
            token: token.into(),
        }
    }

    /// Parse the `{scene}:{token}` form. Both halves must be non-empty.
    pub fn parse(s: &str) -> Option<Self> {
        let (scene, token) = s.split_once(':')?;
        if scene.is_empty() || token.is_empty() {
            return None;
        }
        Some(Self::new(scene, token))
    }
}

impl fmt::Display for SceneTokenRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scene, self.token)
    }
}
