// Local context: per-community node, edge and claim detail for one level.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::error::ContextError;
use crate::types::{ArtifactKind, Claim, Community, Entity, IndexTables, Relationship};

use super::sort::ContextSerializer;
use super::{ClaimDetails, ContextRow, ContextState, EdgeDetails, NodeContext, NodeDetails};

/// Local context rows keyed by level.
pub type LocalContexts = BTreeMap<u32, Vec<ContextRow>>;

/// Assembles raw detail rows for every community at a level.
#[derive(Debug, Clone, Copy)]
pub struct LocalContextBuilder<'a> {
    entities: &'a [Entity],
    relationships: &'a [Relationship],
    claims: &'a [Claim],
    communities: &'a [Community],
}

impl<'a> LocalContextBuilder<'a> {
    pub fn new(tables: &'a IndexTables) -> Self {
        Self {
            entities: &tables.entities,
            relationships: &tables.relationships,
            claims: &tables.claims,
            communities: &tables.communities,
        }
    }

    /// Node detail per community at `level`, keyed by community id.
    ///
    /// Edges are the relationships whose endpoints both belong to some
    /// community at the level; each is attached to the member endpoints.
    /// Claims attach to the entity named by their subject (id or title).
    pub fn nodes_at_level(
        &self,
        level: u32,
    ) -> Result<BTreeMap<i64, Vec<NodeContext>>, ContextError> {
        let by_id: HashMap<&str, &Entity> =
            self.entities.iter().map(|e| (e.id.as_str(), e)).collect();

        let at_level: Vec<&Community> = self
            .communities
            .iter()
            .filter(|c| c.level == level)
            .collect();
        let level_titles: HashSet<&str> = at_level
            .iter()
            .flat_map(|c| c.entity_ids.iter())
            .filter_map(|id| by_id.get(id.as_str()).map(|e| e.title.as_str()))
            .collect();

        let mut edges_by_title: HashMap<&str, Vec<EdgeDetails>> = HashMap::new();
        for rel in self.relationships {
            if !level_titles.contains(rel.source.as_str())
                || !level_titles.contains(rel.target.as_str())
            {
                continue;
            }
            let details = edge_details(rel)?;
            edges_by_title
                .entry(rel.source.as_str())
                .or_default()
                .push(details.clone());
            if rel.target != rel.source {
                edges_by_title
                    .entry(rel.target.as_str())
                    .or_default()
                    .push(details);
            }
        }

        let mut claims_by_subject: HashMap<&str, Vec<ClaimDetails>> = HashMap::new();
        for claim in self.claims {
            claims_by_subject
                .entry(claim.subject_id.as_str())
                .or_default()
                .push(claim_details(claim)?);
        }

        let mut out = BTreeMap::new();
        for community in at_level {
            let mut nodes = Vec::with_capacity(community.entity_ids.len());
            for id in &community.entity_ids {
                let Some(entity) = by_id.get(id.as_str()) else {
                    debug!(community = community.community, entity = %id, "Member entity not found");
                    continue;
                };
                let mut claims = claims_by_subject
                    .get(entity.id.as_str())
                    .cloned()
                    .unwrap_or_default();
                if entity.title != entity.id {
                    if let Some(by_title) = claims_by_subject.get(entity.title.as_str()) {
                        claims.extend(by_title.iter().cloned());
                    }
                }
                nodes.push(NodeContext {
                    title: entity.title.clone(),
                    degree: entity.degree,
                    details: node_details(entity)?,
                    edges: edges_by_title
                        .get(entity.title.as_str())
                        .cloned()
                        .unwrap_or_default(),
                    claims,
                });
            }
            if nodes.is_empty() {
                debug!(community = community.community, level, "Community has no members");
                continue;
            }
            out.insert(community.community, nodes);
        }
        Ok(out)
    }

    /// Unbudgeted local context rows for `level`, flagged against `budget`.
    pub fn build(
        &self,
        level: u32,
        serializer: &ContextSerializer,
        budget: usize,
    ) -> Result<Vec<ContextRow>, ContextError> {
        let mut rows = Vec::new();
        for (community, nodes) in self.nodes_at_level(level)? {
            let context = serializer.render_all(&nodes, &[])?;
            let size = serializer.count(&context);
            let exceeds_budget = size > budget;
            rows.push(ContextRow {
                community,
                level,
                nodes,
                context,
                size,
                exceeds_budget,
                state: if exceeds_budget {
                    ContextState::Oversized
                } else {
                    ContextState::Fits
                },
            });
        }
        debug!(
            level,
            communities = rows.len(),
            oversized = rows.iter().filter(|r| r.exceeds_budget).count(),
            "Local context built"
        );
        Ok(rows)
    }

    /// Local context rows for every level present in the community table.
    pub fn build_all(
        &self,
        serializer: &ContextSerializer,
        budget: usize,
    ) -> Result<LocalContexts, ContextError> {
        let levels: std::collections::BTreeSet<u32> =
            self.communities.iter().map(|c| c.level).collect();
        let mut out = LocalContexts::new();
        for level in levels {
            out.insert(level, self.build(level, serializer, budget)?);
        }
        Ok(out)
    }
}

fn short_id(kind: ArtifactKind, record: &str, id: Option<i64>) -> Result<i64, ContextError> {
    id.ok_or_else(|| ContextError::MissingField {
        kind,
        record: record.to_string(),
        field: "human_readable_id",
    })
}

fn node_details(entity: &Entity) -> Result<NodeDetails, ContextError> {
    Ok(NodeDetails {
        short_id: short_id(ArtifactKind::Entity, &entity.id, entity.human_readable_id)?,
        title: entity.title.clone(),
        description: entity.description.render(),
        degree: entity.degree,
    })
}

fn edge_details(rel: &Relationship) -> Result<EdgeDetails, ContextError> {
    Ok(EdgeDetails {
        short_id: short_id(ArtifactKind::Relationship, &rel.id, rel.human_readable_id)?,
        source: rel.source.clone(),
        target: rel.target.clone(),
        description: rel.description.render(),
        combined_degree: rel.combined_degree,
    })
}

fn claim_details(claim: &Claim) -> Result<ClaimDetails, ContextError> {
    Ok(ClaimDetails {
        short_id: short_id(ArtifactKind::Claim, &claim.id, claim.human_readable_id)?,
        subject: claim.subject_id.clone(),
        claim_type: claim.claim_type.clone(),
        status: claim.status.clone(),
        description: claim.description.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EdgelessFallback;
    use crate::context::tokens::EstimateCounter;
    use crate::types::Description;
    use std::sync::Arc;

    fn entity(id: &str, hrid: i64, title: &str, degree: u64) -> Entity {
        Entity {
            id: id.to_string(),
            human_readable_id: Some(hrid),
            title: title.to_string(),
            entity_type: "ORG".to_string(),
            description: Description::from(vec![
                format!("{title} one"),
                format!("{title} one"),
                format!("{title} two"),
            ]),
            text_unit_ids: Vec::new(),
            frequency: 1,
            degree,
            x: None,
            y: None,
        }
    }

    fn rel(hrid: i64, source: &str, target: &str) -> Relationship {
        Relationship {
            id: format!("r{hrid}"),
            human_readable_id: Some(hrid),
            source: source.to_string(),
            target: target.to_string(),
            description: Description::new("knows"),
            weight: 1.0,
            combined_degree: 2,
            text_unit_ids: Vec::new(),
        }
    }

    fn community(community: i64, level: u32, members: &[&str]) -> Community {
        Community {
            id: format!("c{community}"),
            human_readable_id: community,
            community,
            level,
            parent: -1,
            children: Vec::new(),
            title: format!("Community {community}"),
            entity_ids: members.iter().map(ToString::to_string).collect(),
            relationship_ids: Vec::new(),
            text_unit_ids: Vec::new(),
            period: String::new(),
            size: members.len() as u64,
        }
    }

    fn tables() -> IndexTables {
        IndexTables {
            entities: vec![
                entity("a", 0, "A", 1),
                entity("b", 1, "B", 2),
                entity("c", 2, "C", 1),
                entity("z", 3, "Z", 0),
            ],
            relationships: vec![rel(0, "A", "B"), rel(1, "B", "C"), rel(2, "A", "Z")],
            communities: vec![
                community(0, 0, &["a", "b"]),
                community(1, 0, &["c"]),
                community(2, 1, &["z"]),
            ],
            claims: vec![Claim {
                id: "k".to_string(),
                human_readable_id: Some(0),
                covariate_type: "claim".to_string(),
                claim_type: "FRAUD".to_string(),
                description: "did it".to_string(),
                subject_id: "B".to_string(),
                object_id: None,
                status: "TRUE".to_string(),
                start_date: None,
                end_date: None,
                source_text: None,
                text_unit_id: String::new(),
            }],
            ..IndexTables::default()
        }
    }

    #[test]
    fn edges_stay_within_the_level() {
        let t = tables();
        let nodes = LocalContextBuilder::new(&t).nodes_at_level(0).unwrap();

        let c0 = &nodes[&0];
        assert_eq!(c0.len(), 2);
        let a = &c0[0];
        // A-Z crosses into level 1 and is excluded.
        assert_eq!(a.edges.len(), 1);
        assert_eq!(a.details.description, "A one\nA two");
        assert_eq!(c0[1].claims.len(), 1);

        // B-C spans two level-0 communities and appears on both sides.
        assert_eq!(nodes[&1][0].edges.len(), 1);
    }

    #[test]
    fn rows_are_flagged_against_budget() {
        let t = tables();
        let serializer = ContextSerializer::new(Arc::new(EstimateCounter), EdgelessFallback::Nodes);
        let rows = LocalContextBuilder::new(&t).build(0, &serializer, 5).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.exceeds_budget));
        assert!(rows.iter().all(|r| r.state == ContextState::Oversized));

        let roomy = LocalContextBuilder::new(&t).build(0, &serializer, 10_000).unwrap();
        assert!(roomy.iter().all(|r| r.state == ContextState::Fits));
        assert_eq!(roomy[0].size, serializer.count(&roomy[0].context));
    }

    #[test]
    fn missing_short_id_is_an_error() {
        let mut t = tables();
        t.entities[0].human_readable_id = None;
        let err = LocalContextBuilder::new(&t).nodes_at_level(0).unwrap_err();
        assert!(matches!(err, ContextError::MissingField { kind: ArtifactKind::Entity, .. }));
    }

    #[test]
    fn build_all_covers_every_level() {
        let t = tables();
        let serializer = ContextSerializer::new(Arc::new(EstimateCounter), EdgelessFallback::Nodes);
        let all = LocalContextBuilder::new(&t).build_all(&serializer, 1_000).unwrap();
        assert_eq!(all.keys().copied().collect::<Vec<_>>(), [0, 1]);
        // Edgeless level-1 community still has context.
        assert!(!all[&1][0].context.is_empty());
    }
}
