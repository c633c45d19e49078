// Text unit merge: rewrite entity back-references, then append.

use std::collections::HashMap;

use tracing::debug;

use crate::error::MergeError;
use crate::types::{ArtifactKind, TextUnit};

use super::identity::IdentityAllocator;
use super::{IdMapping, dedupe_in_place, remap_ids, union_into};

/// Append delta text units to `old`.
///
/// Delta `entity_ids` go through the entity id mapping first. A delta unit
/// whose id is already committed (the same chunk ingested twice) folds its
/// references into the committed record instead of duplicating it.
pub fn merge_text_units(
    old: Vec<TextUnit>,
    delta: Vec<TextUnit>,
    entity_ids: &IdMapping,
) -> Result<(Vec<TextUnit>, usize), MergeError> {
    let mut allocator = IdentityAllocator::continuing(
        ArtifactKind::TextUnit,
        old.iter().map(|t| (t.id.as_str(), t.human_readable_id)),
    )?;

    let mut by_id: HashMap<String, usize> = old
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.clone(), i))
        .collect();
    let mut units = old;
    let mut added = 0;

    for mut unit in delta {
        remap_ids(&mut unit.entity_ids, entity_ids);
        if let Some(&idx) = by_id.get(&unit.id) {
            let target = &mut units[idx];
            union_into(&mut target.entity_ids, &unit.entity_ids);
            union_into(&mut target.relationship_ids, &unit.relationship_ids);
            union_into(&mut target.covariate_ids, &unit.covariate_ids);
            union_into(&mut target.document_ids, &unit.document_ids);
            continue;
        }
        dedupe_in_place(&mut unit.entity_ids);
        unit.human_readable_id = Some(allocator.allocate());
        by_id.insert(unit.id.clone(), units.len());
        units.push(unit);
        added += 1;
    }

    debug!(total = units.len(), added, "Text units merged");
    Ok((units, added))
}
