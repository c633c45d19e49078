// Relationship merge keyed by the ordered (source, target) pair, plus
// degree recomputation over the merged edge set.
#![allow(clippy::cast_precision_loss)]

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::MergeError;
use crate::types::{ArtifactKind, Entity, Relationship};

use super::identity::IdentityAllocator;
use super::{dedupe_in_place, union_into};

/// Result of merging delta relationships into the committed set.
#[derive(Debug, Clone, Default)]
pub struct RelationshipMerge {
    pub relationships: Vec<Relationship>,
    pub added: usize,
    pub merged: usize,
    pub dropped: usize,
}

/// Merge `delta` into `old`. `(A, B)` and `(B, A)` are distinct edges.
///
/// Weight becomes the arithmetic mean over every merged instance.
/// `combined_degree` is stale until [`recompute_degrees`] runs.
pub fn merge_relationships(
    old: Vec<Relationship>,
    delta: Vec<Relationship>,
) -> Result<RelationshipMerge, MergeError> {
    let mut allocator = IdentityAllocator::continuing(
        ArtifactKind::Relationship,
        old.iter()
            .filter(|r| has_key(r))
            .map(|r| (r.id.as_str(), r.human_readable_id)),
    )?;

    let mut out = RelationshipMerge::default();
    let mut by_pair: HashMap<(String, String), usize> = HashMap::new();
    // Running (sum, count) of weights per merged record.
    let mut weights: Vec<(f64, u32)> = Vec::new();

    let tagged = old
        .into_iter()
        .map(|r| (true, r))
        .chain(delta.into_iter().map(|r| (false, r)));

    for (committed, mut rel) in tagged {
        if !has_key(&rel) {
            warn!(
                id = %rel.id,
                committed,
                "Dropping relationship without source or target"
            );
            out.dropped += 1;
            continue;
        }
        let key = (rel.source.clone(), rel.target.clone());
        if let Some(&idx) = by_pair.get(&key) {
            let target = &mut out.relationships[idx];
            target.description.extend(&rel.description);
            union_into(&mut target.text_unit_ids, &rel.text_unit_ids);
            weights[idx].0 += rel.weight;
            weights[idx].1 += 1;
            if !committed {
                out.merged += 1;
            }
            continue;
        }
        if !committed {
            rel.human_readable_id = Some(allocator.allocate());
            out.added += 1;
        }
        by_pair.insert(key, out.relationships.len());
        weights.push((rel.weight, 1));
        out.relationships.push(rel);
    }

    for (rel, (sum, count)) in out.relationships.iter_mut().zip(weights) {
        if count > 1 {
            rel.weight = sum / f64::from(count);
        }
        dedupe_in_place(&mut rel.text_unit_ids);
    }

    debug!(
        total = out.relationships.len(),
        added = out.added,
        merged = out.merged,
        dropped = out.dropped,
        "Relationships merged"
    );
    Ok(out)
}

fn has_key(rel: &Relationship) -> bool {
    !rel.source.trim().is_empty() && !rel.target.trim().is_empty()
}

/// Incident relationship count per entity title.
///
/// A self-loop counts once for its endpoint.
pub fn degree_map(relationships: &[Relationship]) -> HashMap<&str, u64> {
    let mut degrees: HashMap<&str, u64> = HashMap::new();
    for rel in relationships {
        *degrees.entry(rel.source.as_str()).or_default() += 1;
        if rel.target != rel.source {
            *degrees.entry(rel.target.as_str()).or_default() += 1;
        }
    }
    degrees
}

/// Recompute `Entity::degree` and `Relationship::combined_degree` from the
/// merged relationship set, ignoring whatever per-instance values came in.
///
/// Every relationship must have its human-readable id by now; a missing one
/// means an upstream stage produced corrupt rows.
pub fn recompute_degrees(
    entities: &mut [Entity],
    relationships: &mut [Relationship],
) -> Result<(), MergeError> {
    if let Some(bad) = relationships.iter().find(|r| r.human_readable_id.is_none()) {
        return Err(MergeError::missing(
            ArtifactKind::Relationship,
            &bad.id,
            "human_readable_id",
        ));
    }
    if let Some(bad) = entities.iter().find(|e| e.human_readable_id.is_none()) {
        return Err(MergeError::missing(
            ArtifactKind::Entity,
            &bad.id,
            "human_readable_id",
        ));
    }

    let degrees: HashMap<String, u64> = degree_map(relationships)
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

    for entity in entities.iter_mut() {
        entity.degree = degrees.get(&entity.title).copied().unwrap_or(0);
    }
    for rel in relationships.iter_mut() {
        let source = degrees.get(&rel.source).copied().unwrap_or(0);
        let target = degrees.get(&rel.target).copied().unwrap_or(0);
        rel.combined_degree = source + target;
    }
    Ok(())
}
