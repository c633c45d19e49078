// Community renumbering: move delta community ids into a namespace that is
// disjoint from the committed ones, then concatenate.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::debug;

use crate::error::MergeError;
use crate::types::{ArtifactKind, Community, NO_COMMUNITY};

use super::{IdMapping, remap_ids};

/// Delta community id → merged community id. Always maps −1 to −1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunityMapping {
    map: BTreeMap<i64, i64>,
}

impl CommunityMapping {
    /// Build `m[v] = v + old_max + 1` for every distinct delta id.
    ///
    /// `old_max` is the largest committed community id, or 0 when there are
    /// none. Delta ids must be non-negative (−1 is only valid as a parent).
    pub fn build(old: &[Community], delta: &[Community]) -> Result<Self, MergeError> {
        let mut old_max = 0;
        for c in old {
            if c.community < 0 {
                return Err(negative(c));
            }
            old_max = old_max.max(c.community);
        }

        let mut map = BTreeMap::new();
        map.insert(NO_COMMUNITY, NO_COMMUNITY);
        for c in delta {
            if c.community < 0 {
                return Err(negative(c));
            }
            map.insert(c.community, c.community + old_max + 1);
        }
        Ok(Self { map })
    }

    pub fn get(&self, id: i64) -> Option<i64> {
        self.map.get(&id).copied()
    }

    /// Map a delta id, failing if it names no delta community.
    pub fn resolve(
        &self,
        kind: ArtifactKind,
        record: &str,
        field: &'static str,
        id: i64,
    ) -> Result<i64, MergeError> {
        self.get(id).ok_or_else(|| MergeError::DanglingReference {
            kind,
            record: record.to_string(),
            field,
            value: id,
        })
    }

    /// Number of delta ids mapped, excluding the −1 fixed point.
    pub fn len(&self) -> usize {
        self.map.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.map.iter().map(|(&k, &v)| (k, v))
    }
}

fn negative(c: &Community) -> MergeError {
    MergeError::CorruptField {
        kind: ArtifactKind::Community,
        record: c.id.clone(),
        field: "community",
        problem: format!("is negative ({})", c.community),
    }
}

/// Result of merging delta communities.
#[derive(Debug, Clone)]
pub struct CommunityMerge {
    pub communities: Vec<Community>,
    pub mapping: CommunityMapping,
    pub added: usize,
}

/// Renumber `delta` through a fresh [`CommunityMapping`] and append it to `old`.
///
/// Delta `entity_ids` are rewritten through `entity_ids` (the entity merge's
/// id table) so memberships point at surviving entities. Every merged record
/// gets `title = "Community {community}"` and `human_readable_id = community`.
pub fn merge_communities(
    old: Vec<Community>,
    delta: Vec<Community>,
    entity_ids: &IdMapping,
) -> Result<CommunityMerge, MergeError> {
    let mapping = CommunityMapping::build(&old, &delta)?;

    let old_ids: HashSet<i64> = old.iter().map(|c| c.community).collect();
    let added = delta.len();
    let mut communities = old;
    communities.reserve(delta.len());

    for mut c in delta {
        c.community = mapping.resolve(ArtifactKind::Community, &c.id, "community", c.community)?;
        c.parent = mapping.resolve(ArtifactKind::Community, &c.id, "parent", c.parent)?;
        c.children = c
            .children
            .iter()
            .map(|&child| mapping.resolve(ArtifactKind::Community, &c.id, "children", child))
            .collect::<Result<_, _>>()?;
        debug_assert!(!old_ids.contains(&c.community));

        remap_ids(&mut c.entity_ids, entity_ids);
        communities.push(c);
    }

    for c in &mut communities {
        c.title = format!("Community {}", c.community);
        c.human_readable_id = c.community;
    }

    debug!(
        total = communities.len(),
        added,
        remapped = mapping.len(),
        "Communities merged"
    );
    Ok(CommunityMerge {
        communities,
        mapping,
        added,
    })
}

/// Parent → children at the next level, derived from both `parent` pointers
/// and explicit `children` lists.
pub fn hierarchy(communities: &[Community]) -> BTreeMap<i64, BTreeSet<i64>> {
    let mut tree: BTreeMap<i64, BTreeSet<i64>> = BTreeMap::new();
    for c in communities {
        if c.parent != NO_COMMUNITY {
            tree.entry(c.parent).or_default().insert(c.community);
        }
        if !c.children.is_empty() {
            tree.entry(c.community)
                .or_default()
                .extend(c.children.iter().copied());
        }
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn community(id: &str, community: i64, level: u32, parent: i64, children: &[i64]) -> Community {
        Community {
            id: id.to_string(),
            human_readable_id: community,
            community,
            level,
            parent,
            children: children.to_vec(),
            title: String::new(),
            entity_ids: vec![format!("ent-{id}")],
            relationship_ids: Vec::new(),
            text_unit_ids: Vec::new(),
            period: "2024-01-01".to_string(),
            size: 1,
        }
    }

    #[test]
    fn renumbers_after_old_max() {
        let old = vec![
            community("o0", 0, 0, -1, &[]),
            community("o3", 3, 0, -1, &[]),
        ];
        let delta = vec![
            community("d0", 0, 0, -1, &[1]),
            community("d1", 1, 1, 0, &[]),
        ];

        let merged = merge_communities(old, delta, &HashMap::new()).unwrap();

        assert_eq!(merged.mapping.get(0), Some(4));
        assert_eq!(merged.mapping.get(1), Some(5));
        assert_eq!(merged.mapping.get(-1), Some(-1));
        assert_eq!(merged.mapping.len(), 2);

        let d0 = merged.communities.iter().find(|c| c.id == "d0").unwrap();
        assert_eq!((d0.community, d0.parent), (4, -1));
        assert_eq!(d0.children, [5]);
        assert_eq!(d0.title, "Community 4");
        assert_eq!(d0.human_readable_id, 4);

        let d1 = merged.communities.iter().find(|c| c.id == "d1").unwrap();
        assert_eq!((d1.community, d1.parent), (5, 4));

        let o3 = merged.communities.iter().find(|c| c.id == "o3").unwrap();
        assert_eq!(o3.title, "Community 3");
    }

    #[test]
    fn empty_old_offsets_by_one() {
        let delta = vec![community("d0", 0, 0, -1, &[])];
        let merged = merge_communities(Vec::new(), delta, &HashMap::new()).unwrap();
        assert_eq!(merged.communities[0].community, 1);
    }

    #[test]
    fn unknown_parent_is_dangling() {
        let delta = vec![community("d1", 1, 1, 7, &[])];
        let err = merge_communities(Vec::new(), delta, &HashMap::new()).unwrap_err();
        assert_eq!(
            err,
            MergeError::DanglingReference {
                kind: ArtifactKind::Community,
                record: "d1".to_string(),
                field: "parent",
                value: 7,
            }
        );
    }

    #[test]
    fn negative_delta_id_is_corrupt() {
        let delta = vec![community("d", -4, 0, -1, &[])];
        let err = merge_communities(Vec::new(), delta, &HashMap::new()).unwrap_err();
        assert!(matches!(err, MergeError::CorruptField { field: "community", .. }));
    }

    #[test]
    fn member_entities_follow_entity_mapping() {
        let mut d = community("d0", 0, 0, -1, &[]);
        d.entity_ids = vec!["new-a".into(), "b".into(), "old-a".into()];
        let mapping = HashMap::from([("new-a".to_string(), "old-a".to_string())]);
        let merged = merge_communities(Vec::new(), vec![d], &mapping).unwrap();
        assert_eq!(merged.communities[0].entity_ids, ["old-a", "b"]);
    }

    #[test]
    fn empty_delta_keeps_old() {
        let old = vec![
            community("o0", 0, 0, -1, &[1]),
            community("o1", 1, 1, 0, &[]),
        ];
        let mut expected = old.clone();
        for c in &mut expected {
            c.title = format!("Community {}", c.community);
        }
        let merged = merge_communities(old, Vec::new(), &HashMap::new()).unwrap();
        assert_eq!(merged.communities, expected);
        assert!(merged.mapping.is_empty());
    }

    #[test]
    fn hierarchy_merges_parent_and_children_links() {
        let comms = vec![
            community("a", 0, 0, -1, &[2]),
            community("b", 1, 1, 0, &[]),
            community("c", 2, 1, 0, &[]),
        ];
        let tree = hierarchy(&comms);
        assert_eq!(tree[&0].iter().copied().collect::<Vec<_>>(), [1, 2]);
        assert!(!tree.contains_key(&1));
    }
}
