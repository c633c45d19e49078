//! Community packaging.
//!
//! A [`CommunityDetector`] partitions the relationship graph into a hierarchy
//! of communities; [`build_communities`] turns its per-entity assignments into
//! [`Community`] records with their member, edge and text-unit lists.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{info, warn};

use crate::config::ClusteringSection;
use crate::merge::union_into;
use crate::types::{Community, Entity, NO_COMMUNITY, Relationship, today_period};

/// Parameters handed to a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterParams {
    pub max_cluster_size: usize,
    /// Restrict clustering to the largest connected component.
    pub use_lcc: bool,
    pub seed: Option<u64>,
}

impl From<&ClusteringSection> for ClusterParams {
    fn from(section: &ClusteringSection) -> Self {
        Self {
            max_cluster_size: section.max_cluster_size,
            use_lcc: section.use_lcc,
            seed: section.seed,
        }
    }
}

/// One entity's membership at one hierarchy level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunityAssignment {
    pub title: String,
    pub community: i64,
    pub level: u32,
    /// Enclosing community one level up, or -1.
    pub parent: i64,
}

/// Hierarchical graph clustering.
pub trait CommunityDetector: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn detect(
        &self,
        relationships: &[Relationship],
        params: &ClusterParams,
    ) -> crate::error::Result<Vec<CommunityAssignment>>;
}

struct Members {
    level: u32,
    parent: i64,
    titles: BTreeSet<String>,
}

/// Package detector output into community records.
///
/// A community's relationships are those with both endpoints inside it; its
/// text units are the union of those relationships' text units.
pub fn build_communities(
    assignments: &[CommunityAssignment],
    entities: &[Entity],
    relationships: &[Relationship],
) -> Vec<Community> {
    let mut groups: BTreeMap<i64, Members> = BTreeMap::new();
    for a in assignments {
        let group = groups.entry(a.community).or_insert_with(|| Members {
            level: a.level,
            parent: a.parent,
            titles: BTreeSet::new(),
        });
        if group.level != a.level || group.parent != a.parent {
            warn!(
                community = a.community,
                title = %a.title,
                "Assignment disagrees with earlier level or parent, keeping the first"
            );
        }
        group.titles.insert(a.title.clone());
    }

    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    for (&id, group) in &groups {
        if group.parent != NO_COMMUNITY {
            children.entry(group.parent).or_default().push(id);
        }
    }

    let period = today_period();
    let communities: Vec<Community> = groups
        .into_iter()
        .map(|(id, group)| {
            let entity_ids: Vec<String> = entities
                .iter()
                .filter(|e| group.titles.contains(&e.title))
                .map(|e| e.id.clone())
                .collect();

            let mut relationship_ids = Vec::new();
            let mut text_unit_ids = Vec::new();
            for rel in relationships
                .iter()
                .filter(|r| group.titles.contains(&r.source) && group.titles.contains(&r.target))
            {
                relationship_ids.push(rel.id.clone());
                union_into(&mut text_unit_ids, &rel.text_unit_ids);
            }

            let mut kids = children.remove(&id).unwrap_or_default();
            kids.sort_unstable();

            Community {
                id: uuid::Uuid::new_v4().to_string(),
                human_readable_id: id,
                community: id,
                level: group.level,
                parent: group.parent,
                children: kids,
                title: format!("Community {id}"),
                size: entity_ids.len() as u64,
                entity_ids,
                relationship_ids,
                text_unit_ids,
                period: period.clone(),
            }
        })
        .collect();

    info!(communities = communities.len(), "Communities packaged");
    communities
}

/// Run `detector` and package its result.
pub fn detect_communities(
    detector: &dyn CommunityDetector,
    entities: &[Entity],
    relationships: &[Relationship],
    params: &ClusterParams,
) -> crate::error::Result<Vec<Community>> {
    let assignments = detector.detect(relationships, params)?;
    info!(
        detector = detector.name(),
        assignments = assignments.len(),
        "Clustering complete"
    );
    Ok(build_communities(&assignments, entities, relationships))
}
