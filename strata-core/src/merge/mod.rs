//! Incremental index merge.
//!
//! [`merge_index`] folds a delta batch into the committed index in one
//! synchronous pass: entities, relationships (with degree recomputation), text
//! units, claims, communities and reports. Any data-integrity failure aborts
//! the whole merge so a partially renumbered index is never produced.

pub mod claims;
pub mod communities;
pub mod entities;
pub mod identity;
pub mod relationships;
pub mod reports;
pub mod text_units;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::MergeError;
use crate::types::{Claim, Community, IndexTables, TextUnit};

pub use communities::CommunityMapping;

/// Folded record id → committed record id it was folded into.
pub type IdMapping = HashMap<String, String>;

/// Counts reported by a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeStats {
    pub entities_added: usize,
    pub entities_merged: usize,
    pub entities_dropped: usize,
    pub relationships_added: usize,
    pub relationships_merged: usize,
    pub relationships_dropped: usize,
    pub text_units_added: usize,
    pub claims_added: usize,
    pub communities_added: usize,
    pub reports_added: usize,
}

/// Output of [`merge_index`].
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub tables: IndexTables,
    pub entity_id_mapping: IdMapping,
    pub community_mapping: CommunityMapping,
    pub stats: MergeStats,
}

/// Merge a delta batch into the committed index.
pub fn merge_index(old: IndexTables, delta: IndexTables) -> Result<MergeOutcome, MergeError> {
    let entity_merge = entities::merge_entities(old.entities, delta.entities)?;
    let rel_merge = relationships::merge_relationships(old.relationships, delta.relationships)?;

    let mut entities = entity_merge.entities;
    let mut relationships = rel_merge.relationships;
    relationships::recompute_degrees(&mut entities, &mut relationships)?;

    let mapping = entity_merge.id_mapping;
    let mut old_units = old.text_units;
    let mut old_claims = old.claims;
    let mut old_communities = old.communities;
    remap_committed(&mut old_units, &mut old_claims, &mut old_communities, &mapping);

    let (text_units, text_units_added) =
        text_units::merge_text_units(old_units, delta.text_units, &mapping)?;
    let (claims, claims_added) = claims::merge_claims(old_claims, delta.claims, &mapping)?;

    let community_merge =
        communities::merge_communities(old_communities, delta.communities, &mapping)?;
    let reports_added = delta.reports.len();
    let reports = reports::merge_reports(
        old.reports,
        delta.reports,
        &community_merge.mapping,
        &community_merge.communities,
    )?;

    let stats = MergeStats {
        entities_added: entity_merge.added,
        entities_merged: entity_merge.merged,
        entities_dropped: entity_merge.dropped,
        relationships_added: rel_merge.added,
        relationships_merged: rel_merge.merged,
        relationships_dropped: rel_merge.dropped,
        text_units_added,
        claims_added,
        communities_added: community_merge.added,
        reports_added,
    };

    info!(
        entities = entities.len(),
        relationships = relationships.len(),
        communities = community_merge.communities.len(),
        reports = reports.len(),
        remapped_entities = mapping.len(),
        "Index merge complete"
    );

    Ok(MergeOutcome {
        tables: IndexTables {
            entities,
            relationships,
            communities: community_merge.communities,
            reports,
            text_units,
            claims,
        },
        entity_id_mapping: mapping,
        community_mapping: community_merge.mapping,
        stats,
    })
}

/// Point committed records at the survivors of committed title duplicates.
fn remap_committed(
    units: &mut [TextUnit],
    claims: &mut [Claim],
    communities: &mut [Community],
    mapping: &IdMapping,
) {
    if mapping.is_empty() {
        return;
    }
    for unit in units {
        remap_ids(&mut unit.entity_ids, mapping);
    }
    for claim in claims {
        if let Some(mapped) = mapping.get(&claim.subject_id) {
            claim.subject_id.clone_from(mapped);
        }
        if let Some(object) = claim.object_id.as_mut() {
            if let Some(mapped) = mapping.get(object.as_str()) {
                object.clone_from(mapped);
            }
        }
    }
    for community in communities {
        remap_ids(&mut community.entity_ids, mapping);
    }
}

/// Append `extra` items not yet present in `target`, keeping order.
pub(crate) fn union_into(target: &mut Vec<String>, extra: &[String]) {
    let mut seen: HashSet<String> = target.iter().cloned().collect();
    for item in extra {
        if seen.insert(item.clone()) {
            target.push(item.clone());
        }
    }
}

/// Remove repeated items, first occurrence wins.
pub(crate) fn dedupe_in_place(items: &mut Vec<String>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

/// Rewrite ids through `mapping` and drop duplicates the rewrite creates.
pub(crate) fn remap_ids(ids: &mut Vec<String>, mapping: &IdMapping) {
    for id in ids.iter_mut() {
        if let Some(mapped) = mapping.get(id) {
            id.clone_from(mapped);
        }
    }
    dedupe_in_place(ids);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Community, CommunityReport, Description, Entity, Relationship, TextUnit};

    fn entity(id: &str, hrid: Option<i64>, title: &str, units: &[&str]) -> Entity {
        Entity {
            id: id.to_string(),
            human_readable_id: hrid,
            title: title.to_string(),
            entity_type: "PERSON".to_string(),
            description: Description::new(format!("about {title}")),
            text_unit_ids: units.iter().map(ToString::to_string).collect(),
            frequency: units.len() as u64,
            degree: 0,
            x: None,
            y: None,
        }
    }

    fn rel(id: &str, hrid: Option<i64>, source: &str, target: &str) -> Relationship {
        Relationship {
            id: id.to_string(),
            human_readable_id: hrid,
            source: source.to_string(),
            target: target.to_string(),
            description: Description::new("linked"),
            weight: 1.0,
            combined_degree: 0,
            text_unit_ids: Vec::new(),
        }
    }

    fn community(id: &str, community: i64, level: u32, parent: i64, members: &[&str]) -> Community {
        Community {
            id: id.to_string(),
            human_readable_id: community,
            community,
            level,
            parent,
            children: Vec::new(),
            title: format!("Community {community}"),
            entity_ids: members.iter().map(ToString::to_string).collect(),
            relationship_ids: Vec::new(),
            text_unit_ids: Vec::new(),
            period: "2024-05-01".to_string(),
            size: members.len() as u64,
        }
    }

    fn report(id: &str, community: i64, level: u32, parent: i64) -> CommunityReport {
        CommunityReport {
            id: id.to_string(),
            human_readable_id: community,
            community,
            level,
            parent,
            children: Vec::new(),
            title: "t".to_string(),
            summary: "s".to_string(),
            full_content: "# t".to_string(),
            rank: 1.0,
            rating_explanation: String::new(),
            findings: Vec::new(),
            full_content_json: "{}".to_string(),
            period: String::new(),
            size: 0,
        }
    }

    fn unit(id: &str, hrid: Option<i64>, entities: &[&str]) -> TextUnit {
        TextUnit {
            id: id.to_string(),
            human_readable_id: hrid,
            text: String::new(),
            n_tokens: 0,
            document_ids: Vec::new(),
            entity_ids: entities.iter().map(ToString::to_string).collect(),
            relationship_ids: Vec::new(),
            covariate_ids: Vec::new(),
        }
    }

    #[test]
    fn full_merge_keeps_references_consistent() {
        let old = IndexTables {
            entities: vec![entity("a", Some(0), "A", &["t1"])],
            relationships: Vec::new(),
            communities: vec![community("c0", 3, 0, -1, &["a"])],
            reports: vec![report("r0", 3, 0, -1)],
            text_units: vec![unit("t1", Some(0), &["a"])],
            claims: Vec::new(),
        };
        let delta = IndexTables {
            entities: vec![
                entity("a2", None, "A", &["t2"]),
                entity("b", None, "B", &["t2"]),
            ],
            relationships: vec![rel("r1", None, "A", "B")],
            communities: vec![
                community("d0", 0, 0, -1, &["a2", "b"]),
                community("d1", 1, 1, 0, &["b"]),
            ],
            reports: vec![report("dr0", 0, 0, -1), report("dr1", 1, 1, 0)],
            text_units: vec![unit("t2", None, &["a2", "b"])],
            claims: Vec::new(),
        };

        let outcome = merge_index(old, delta).unwrap();
        let t = &outcome.tables;

        assert_eq!(t.entities.len(), 2);
        assert_eq!(t.entities[0].frequency, 2);
        assert_eq!(t.entities[0].degree, 1);
        assert_eq!(t.relationships[0].combined_degree, 2);

        assert_eq!(t.text_units[1].entity_ids, ["a", "b"]);
        assert_eq!(t.text_units[1].human_readable_id, Some(1));

        let d0 = t.communities.iter().find(|c| c.id == "d0").unwrap();
        assert_eq!(d0.community, 4);
        assert_eq!(d0.entity_ids, ["a", "b"]);
        let d1 = t.communities.iter().find(|c| c.id == "d1").unwrap();
        assert_eq!((d1.community, d1.parent), (5, 4));

        let reports: Vec<_> = t.reports.iter().map(|r| (r.community, r.parent)).collect();
        assert_eq!(reports, [(3, -1), (4, -1), (5, 4)]);

        assert_eq!(outcome.stats.entities_added, 1);
        assert_eq!(outcome.stats.entities_merged, 1);
        assert_eq!(outcome.stats.communities_added, 2);
    }

    #[test]
    fn committed_title_duplicates_are_remapped_everywhere() {
        let claim: crate::types::Claim =
            serde_json::from_value(serde_json::json!({"id": "cl0", "human_readable_id": 0,
                "subject_id": "a9", "object_id": "a9"}))
            .unwrap();
        let old = IndexTables {
            entities: vec![
                entity("a0", Some(0), "A", &["t1"]),
                entity("a9", Some(1), "A", &["t2"]),
            ],
            communities: vec![community("c0", 0, 0, -1, &["a0", "a9"])],
            text_units: vec![unit("t2", Some(0), &["a9"])],
            claims: vec![claim],
            ..IndexTables::default()
        };

        let outcome = merge_index(old, IndexTables::default()).unwrap();
        let t = &outcome.tables;

        assert_eq!(outcome.entity_id_mapping.get("a9").map(String::as_str), Some("a0"));
        assert_eq!(t.entities.len(), 1);
        assert_eq!(t.text_units[0].entity_ids, ["a0"]);
        assert_eq!(t.claims[0].subject_id, "a0");
        assert_eq!(t.claims[0].object_id.as_deref(), Some("a0"));
        assert_eq!(t.communities[0].entity_ids, ["a0"]);
    }

    #[test]
    fn corrupt_delta_community_aborts_everything() {
        let delta = IndexTables {
            entities: vec![entity("a", None, "A", &[])],
            communities: vec![community("d", 0, 1, 12, &["a"])],
            ..IndexTables::default()
        };
        let err = merge_index(IndexTables::default(), delta).unwrap_err();
        assert!(matches!(err, MergeError::DanglingReference { field: "parent", .. }));
    }

    #[test]
    fn union_and_dedupe_preserve_order() {
        let mut v = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        dedupe_in_place(&mut v);
        assert_eq!(v, ["b", "a"]);
        union_into(&mut v, &["c".to_string(), "a".to_string()]);
        assert_eq!(v, ["b", "a", "c"]);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::types::{Description, Entity, Relationship};
    use proptest::prelude::*;

    fn arb_title() -> impl Strategy<Value = String> {
        "[A-F]"
    }

    fn build_entities(prefix: &str, titles: &[String], committed: bool) -> Vec<Entity> {
        titles
            .iter()
            .enumerate()
            .map(|(i, title)| Entity {
                id: format!("{prefix}-{i}"),
                human_readable_id: committed.then_some(i as i64),
                title: title.clone(),
                entity_type: String::new(),
                description: Description::new(format!("{prefix} {title}")),
                text_unit_ids: vec![format!("{prefix}-t{i}")],
                frequency: 1,
                degree: 0,
                x: None,
                y: None,
            })
            .collect()
    }

    fn build_relationships(
        prefix: &str,
        pairs: &[(String, String)],
        committed: bool,
    ) -> Vec<Relationship> {
        pairs
            .iter()
            .enumerate()
            .map(|(i, (source, target))| Relationship {
                id: format!("{prefix}-r{i}"),
                human_readable_id: committed.then_some(i as i64),
                source: source.clone(),
                target: target.clone(),
                description: Description::new("rel"),
                weight: 1.0,
                combined_degree: 0,
                text_unit_ids: Vec::new(),
            })
            .collect()
    }

    fn distinct(titles: Vec<String>) -> Vec<String> {
        let mut titles = titles;
        dedupe_in_place(&mut titles);
        titles
    }

    fn distinct_pairs(pairs: Vec<(String, String)>) -> Vec<(String, String)> {
        let mut seen = HashSet::new();
        pairs.into_iter().filter(|p| seen.insert(p.clone())).collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn empty_delta_is_a_fixed_point(
            titles in prop::collection::vec(arb_title(), 0..6),
            pairs in prop::collection::vec((arb_title(), arb_title()), 0..8),
        ) {
            let old = IndexTables {
                entities: build_entities("o", &distinct(titles), true),
                relationships: build_relationships("o", &distinct_pairs(pairs), true),
                ..IndexTables::default()
            };
            let once = merge_index(old, IndexTables::default()).unwrap().tables;
            let twice = merge_index(once.clone(), IndexTables::default()).unwrap();
            prop_assert_eq!(&twice.tables, &once);
            prop_assert!(twice.entity_id_mapping.is_empty());
        }

        #[test]
        fn merged_ids_are_dense_and_unique(
            old_titles in prop::collection::vec(arb_title(), 0..6),
            delta_titles in prop::collection::vec(arb_title(), 0..10),
        ) {
            let old = IndexTables {
                entities: build_entities("o", &distinct(old_titles), true),
                ..IndexTables::default()
            };
            let delta = IndexTables {
                entities: build_entities("d", &delta_titles, false),
                ..IndexTables::default()
            };
            let outcome = merge_index(old, delta).unwrap();

            let mut ids: Vec<i64> = outcome
                .tables
                .entities
                .iter()
                .map(|e| e.human_readable_id.unwrap())
                .collect();
            ids.sort_unstable();
            let expected: Vec<i64> = (0..ids.len() as i64).collect();
            prop_assert_eq!(ids, expected);

            let titles: HashSet<&str> =
                outcome.tables.entities.iter().map(|e| e.title.as_str()).collect();
            prop_assert_eq!(titles.len(), outcome.tables.entities.len());

            let surviving: HashSet<&str> =
                outcome.tables.entities.iter().map(|e| e.id.as_str()).collect();
            for target in outcome.entity_id_mapping.values() {
                prop_assert!(surviving.contains(target.as_str()));
            }
        }

        #[test]
        fn combined_degree_is_endpoint_degree_sum(
            titles in prop::collection::vec(arb_title(), 1..6),
            old_pairs in prop::collection::vec((arb_title(), arb_title()), 0..6),
            delta_pairs in prop::collection::vec((arb_title(), arb_title()), 0..6),
        ) {
            let titles = distinct(titles);
            let old = IndexTables {
                entities: build_entities("o", &titles, true),
                relationships: build_relationships("o", &distinct_pairs(old_pairs), true),
                ..IndexTables::default()
            };
            let delta = IndexTables {
                relationships: build_relationships("d", &delta_pairs, false),
                ..IndexTables::default()
            };
            let outcome = merge_index(old, delta).unwrap();
            let degrees = relationships::degree_map(&outcome.tables.relationships);
            for rel in &outcome.tables.relationships {
                let expected = degrees.get(rel.source.as_str()).copied().unwrap_or(0)
                    + degrees.get(rel.target.as_str()).copied().unwrap_or(0);
                prop_assert_eq!(rel.combined_degree, expected);
            }
            for e in &outcome.tables.entities {
                let expected = degrees.get(e.title.as_str()).copied().unwrap_or(0);
                prop_assert_eq!(e.degree, expected);
            }
        }
    }
}
