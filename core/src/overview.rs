//! Read model for operator panels.
//!
//! A flattened sources → auras → targets view of the current combat, with
//! per-pair suppression state. Pure projection over the host snapshot and the
//! persisted suppression map; panels render it, the coordinator mutates
//! through `set_suppressed`.

use aurawatch_types::{SceneTokenRef, TokenId};

use crate::config::Config;
use crate::host::{AuraGeometry, FlagStore, SceneQuery, TokenState};
use crate::resolver::HitResolver;
use crate::suppression::{SuppressionError, SuppressionKey, SuppressionStore};

#[derive(Debug, Clone, PartialEq)]
pub struct MatrixTarget {
    pub token: TokenId,
    pub name: String,
    pub defeated: bool,
    /// The local user currently has this token targeted.
    pub targeted: bool,
    pub suppressed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatrixAura {
    pub identifier: String,
    pub name: String,
    pub radius: Option<f64>,
    pub traits: Vec<String>,
    /// Trait-marker descriptors without a usable radius; shown to the
    /// operator but never membership-tested.
    pub diagnostic_only: bool,
    pub targets: Vec<MatrixTarget>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatrixSource {
    pub token: TokenId,
    pub name: String,
    pub defeated: bool,
    pub auras: Vec<MatrixAura>,
}

/// Build the matrix for the running combat. No combat means an empty matrix.
pub async fn suppression_matrix<H>(
    host: &H,
    config: &Config,
    suppressions: &mut SuppressionStore,
) -> Result<Vec<MatrixSource>, SuppressionError>
where
    H: SceneQuery + AuraGeometry + FlagStore,
{
    let Some(combat) = host.combat() else {
        return Ok(Vec::new());
    };
    let map = suppressions.read_map(host, &combat.id).await?;

    let combatants: Vec<TokenState> = combat
        .combatant_tokens
        .iter()
        .filter_map(|id| host.token(id))
        .collect();

    let resolver = HitResolver::new(host, config);
    let mut matrix = Vec::new();
    for source in &combatants {
        let descriptors = resolver.descriptors_for(&source.id);
        if descriptors.is_empty() {
            continue;
        }
        let auras = descriptors
            .into_iter()
            .map(|descriptor| {
                let targets = combatants
                    .iter()
                    .filter(|target| target.id != source.id)
                    .map(|target| {
                        let key = SuppressionKey::new(
                            SceneTokenRef::new(source.scene.as_str(), source.id.as_str()),
                            descriptor.identifier.clone(),
                            SceneTokenRef::new(target.scene.as_str(), target.id.as_str()),
                        );
                        MatrixTarget {
                            token: target.id.clone(),
                            name: target.name.clone(),
                            defeated: target.defeated,
                            targeted: host.is_targeted(&target.id),
                            suppressed: map.contains_key(&key.to_string()),
                        }
                    })
                    .collect();
                MatrixAura {
                    name: descriptor.display_name().to_string(),
                    identifier: descriptor.identifier,
                    radius: descriptor.radius,
                    traits: descriptor.traits,
                    diagnostic_only: descriptor.diagnostic_only,
                    targets,
                }
            })
            .collect();
        matrix.push(MatrixSource {
            token: source.id.clone(),
            name: source.name.clone(),
            defeated: source.defeated,
            auras,
        });
    }
    Ok(matrix)
}
