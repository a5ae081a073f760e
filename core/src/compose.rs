//! Reminder composition.
//!
//! Turns a received aura event plus its resolved descriptor into chat text.
//! The aura name is rendered as a content link (`@UUID[...]{...}`) when an
//! origin item can be resolved, so the reader can open the hazard's rules
//! from the reminder.

use aurawatch_types::{ItemRef, TokenId, UserId};

use crate::config::{Augmentation, Config};
use crate::events::EventKind;
use crate::host::{SceneQuery, SessionInfo};
use crate::resolver::{AuraDescriptor, normalize_identifier};

/// Resolve the item that explains an aura, trying each strategy in order:
/// the origin recorded on the descriptor, a source-actor item matching the
/// aura's slug or identifier, the configured slug-alias table, a normalized
/// name match, and finally the origin hint on the source actor's aura
/// bookkeeping.
pub fn resolve_origin<H: SceneQuery>(
    host: &H,
    config: &Config,
    source: &TokenId,
    descriptor: &AuraDescriptor,
) -> Option<ItemRef> {
    if let Some(origin) = &descriptor.origin {
        return Some(origin.clone());
    }

    let items = host.items(source);
    let wanted: Vec<String> = descriptor
        .slug
        .iter()
        .cloned()
        .chain(std::iter::once(descriptor.identifier.clone()))
        .collect();
    for item in &items {
        let item_slug = item.slug.as_deref().map(normalize_identifier);
        if item_slug.as_ref().is_some_and(|s| wanted.contains(s)) {
            return Some(item.id.clone());
        }
    }

    let alias = wanted
        .iter()
        .find_map(|key| config.slug_aliases.get(key))
        .map(|s| normalize_identifier(s));
    if let Some(alias) = alias {
        for item in &items {
            if item.slug.as_deref().map(normalize_identifier) == Some(alias.clone()) {
                return Some(item.id.clone());
            }
        }
    }

    if let Some(name) = &descriptor.name {
        let wanted_name = normalize_identifier(name);
        for item in &items {
            if normalize_identifier(&item.name) == wanted_name {
                return Some(item.id.clone());
            }
        }
    }

    host.aura_origin_hint(source, &descriptor.identifier)
}

fn aura_text(descriptor: &AuraDescriptor, origin: Option<&ItemRef>) -> String {
    match origin {
        Some(origin) => format!("@UUID[{}]{{{}}}", origin, descriptor.display_name()),
        None => descriptor.display_name().to_string(),
    }
}

/// Matchers apply to the descriptor's normalized identifier, slug and name.
fn matches_descriptor(descriptor: &AuraDescriptor, matcher: &str) -> bool {
    let needle = normalize_identifier(matcher);
    if needle.is_empty() {
        return false;
    }
    let mut candidates = vec![descriptor.identifier.clone()];
    if let Some(slug) = &descriptor.slug {
        candidates.push(slug.clone());
    }
    if let Some(name) = &descriptor.name {
        candidates.push(normalize_identifier(name));
    }
    candidates.iter().any(|c| c.contains(&needle))
}

/// Build the reminder body for one event.
pub fn compose_reminder(
    kind: &EventKind,
    target_name: &str,
    source_name: &str,
    descriptor: &AuraDescriptor,
    origin: Option<&ItemRef>,
    augmentations: &[Augmentation],
) -> String {
    let aura = aura_text(descriptor, origin);
    let mut content = match kind {
        EventKind::StartTurn => format!(
            "<p><strong>{target_name}</strong> begins the turn inside the {aura} of <strong>{source_name}</strong>.</p>"
        ),
        EventKind::Enter => format!(
            "<p><strong>{target_name}</strong> entered the {aura} of <strong>{source_name}</strong>.</p>"
        ),
        _ => format!(
            "<p><strong>{target_name}</strong> is affected by the {aura} of <strong>{source_name}</strong>.</p>"
        ),
    };

    for augmentation in augmentations {
        if matches_descriptor(descriptor, &augmentation.matcher) {
            content.push_str(&format!("<p>{}</p>", augmentation.prompt));
        }
    }

    content
}

/// Delivery audience: `None` means post publicly, otherwise whisper to the
/// listed users. Non-public delivery whispers to every GM session.
pub fn audience(config: &Config, sessions: &[SessionInfo]) -> Option<Vec<UserId>> {
    if config.public_chat {
        return None;
    }
    Some(
        sessions
            .iter()
            .filter(|s| s.is_gm)
            .map(|s| s.user.clone())
            .collect(),
    )
}
