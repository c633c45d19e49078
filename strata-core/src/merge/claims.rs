// Claim (covariate) merge.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::MergeError;
use crate::types::{ArtifactKind, Claim};

use super::IdMapping;
use super::identity::IdentityAllocator;

/// Append delta claims to `old`, rewriting entity references through the
/// entity id mapping. Claims with no subject are dropped; a delta claim whose
/// id is already committed is skipped.
pub fn merge_claims(
    old: Vec<Claim>,
    delta: Vec<Claim>,
    entity_ids: &IdMapping,
) -> Result<(Vec<Claim>, usize), MergeError> {
    let mut allocator = IdentityAllocator::continuing(
        ArtifactKind::Claim,
        old.iter().map(|c| (c.id.as_str(), c.human_readable_id)),
    )?;

    let mut seen: HashSet<String> = old.iter().map(|c| c.id.clone()).collect();
    let mut claims = old;
    let mut added = 0;

    for mut claim in delta {
        if claim.subject_id.trim().is_empty() {
            warn!(id = %claim.id, "Dropping claim without subject");
            continue;
        }
        if !seen.insert(claim.id.clone()) {
            debug!(id = %claim.id, "Claim already committed");
            continue;
        }
        if let Some(mapped) = entity_ids.get(&claim.subject_id) {
            claim.subject_id.clone_from(mapped);
        }
        if let Some(object) = claim.object_id.as_mut() {
            if let Some(mapped) = entity_ids.get(object.as_str()) {
                object.clone_from(mapped);
            }
        }
        claim.human_readable_id = Some(allocator.allocate());
        claims.push(claim);
        added += 1;
    }

    debug!(total = claims.len(), added, "Claims merged");
    Ok((claims, added))
}
