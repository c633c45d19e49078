// Entity merge: dedupe by title across old + delta, old identity wins.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::MergeError;
use crate::types::{ArtifactKind, Entity};

use super::identity::IdentityAllocator;
use super::{IdMapping, dedupe_in_place, union_into};

/// Result of merging delta entities into the committed set.
#[derive(Debug, Clone, Default)]
pub struct EntityMerge {
    /// Merged entities: old order first, then new titles in delta order.
    pub entities: Vec<Entity>,
    /// Folded entity id (delta, or a committed title duplicate) → id of the
    /// record it was folded into.
    pub id_mapping: IdMapping,
    pub added: usize,
    pub merged: usize,
    pub dropped: usize,
}

/// Merge `delta` into `old`.
///
/// Degrees are left untouched here; they depend on the merged relationship
/// set and are recomputed by [`super::relationships::recompute_degrees`].
pub fn merge_entities(old: Vec<Entity>, delta: Vec<Entity>) -> Result<EntityMerge, MergeError> {
    let mut allocator = IdentityAllocator::continuing(
        ArtifactKind::Entity,
        old.iter()
            .filter(|e| has_key(e))
            .map(|e| (e.id.as_str(), e.human_readable_id)),
    )?;

    let mut out = EntityMerge::default();
    let mut by_title: HashMap<String, usize> = HashMap::new();

    for entity in old {
        if !has_key(&entity) {
            warn!(id = %entity.id, "Dropping committed entity without title");
            out.dropped += 1;
            continue;
        }
        if let Some(&idx) = by_title.get(&entity.title) {
            // Duplicate titles in a committed set: fold like a delta record.
            let target = &mut out.entities[idx];
            if target.id != entity.id {
                out.id_mapping.insert(entity.id.clone(), target.id.clone());
            }
            fold(target, &entity);
            continue;
        }
        by_title.insert(entity.title.clone(), out.entities.len());
        out.entities.push(entity);
    }

    for mut entity in delta {
        if !has_key(&entity) {
            warn!(id = %entity.id, "Dropping delta entity without title");
            out.dropped += 1;
            continue;
        }
        if let Some(&idx) = by_title.get(&entity.title) {
            let target = &mut out.entities[idx];
            if target.id != entity.id {
                out.id_mapping.insert(entity.id.clone(), target.id.clone());
            }
            fold(target, &entity);
            out.merged += 1;
            continue;
        }
        entity.human_readable_id = Some(allocator.allocate());
        by_title.insert(entity.title.clone(), out.entities.len());
        out.entities.push(entity);
        out.added += 1;
    }

    for entity in &mut out.entities {
        dedupe_in_place(&mut entity.text_unit_ids);
        entity.frequency = entity.text_unit_ids.len() as u64;
    }

    debug!(
        total = out.entities.len(),
        added = out.added,
        merged = out.merged,
        dropped = out.dropped,
        remapped = out.id_mapping.len(),
        "Entities merged"
    );
    Ok(out)
}

fn has_key(entity: &Entity) -> bool {
    !entity.title.trim().is_empty()
}

/// Fold `other` into `target`. Identity and layout stay with `target`.
fn fold(target: &mut Entity, other: &Entity) {
    target.description.extend(&other.description);
    union_into(&mut target.text_unit_ids, &other.text_unit_ids);
    if target.entity_type.is_empty() {
        target.entity_type.clone_from(&other.entity_type);
    }
}
