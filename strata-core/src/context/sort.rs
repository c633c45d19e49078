// Context serializer: renders community detail as CSV tables, greedily
// including the highest-degree edges that fit the token budget.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::config::EdgelessFallback;
use crate::error::ContextError;

use super::tokens::TokenCounter;
use super::{ClaimDetails, EdgeDetails, NodeContext, NodeDetails, ReportSummary};

/// Renders [`NodeContext`] lists into text and measures it.
#[derive(Clone)]
pub struct ContextSerializer {
    counter: Arc<dyn TokenCounter>,
    fallback: EdgelessFallback,
}

impl std::fmt::Debug for ContextSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextSerializer")
            .field("counter", &self.counter.name())
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl ContextSerializer {
    pub fn new(counter: Arc<dyn TokenCounter>, fallback: EdgelessFallback) -> Self {
        Self { counter, fallback }
    }

    pub fn count(&self, text: &str) -> usize {
        self.counter.count(text)
    }

    /// Render every edge of `nodes` with no budget.
    pub fn render_all(
        &self,
        nodes: &[NodeContext],
        reports: &[ReportSummary],
    ) -> Result<String, ContextError> {
        self.sort(nodes, reports, None)
    }

    /// Serialize `nodes` (plus any substituted `reports`) under `budget`.
    ///
    /// Edges are walked by combined degree descending, short id ascending.
    /// Each newly touched endpoint contributes its node row and claims once.
    /// The text is re-rendered after every edge and the walk stops at the
    /// first edge that would overflow, returning the last snapshot that fit.
    /// When no edge snapshot fits (or there are no edges) the configured
    /// edgeless fallback decides what is returned.
    pub fn sort(
        &self,
        nodes: &[NodeContext],
        reports: &[ReportSummary],
        budget: Option<usize>,
    ) -> Result<String, ContextError> {
        let by_title: HashMap<&str, &NodeContext> =
            nodes.iter().map(|n| (n.title.as_str(), n)).collect();
        let edges = sorted_edges(nodes);

        let mut entities: Vec<&NodeDetails> = Vec::new();
        let mut claims: Vec<&ClaimDetails> = Vec::new();
        let mut included: Vec<&EdgeDetails> = Vec::new();
        let mut touched: HashSet<&str> = HashSet::new();
        let mut seen_claims: HashSet<i64> = HashSet::new();
        let mut context = String::new();

        for &edge in &edges {
            for endpoint in [edge.source.as_str(), edge.target.as_str()] {
                if !touched.insert(endpoint) {
                    continue;
                }
                if let Some(node) = by_title.get(endpoint) {
                    entities.push(&node.details);
                    claims.extend(
                        node.claims
                            .iter()
                            .filter(|c| seen_claims.insert(c.short_id)),
                    );
                }
            }
            included.push(edge);

            let candidate = render_tables(reports, &entities, &claims, &included)?;
            if budget.is_some_and(|b| self.count(&candidate) > b) {
                debug!(
                    included = included.len() - 1,
                    total = edges.len(),
                    "Edge walk stopped at budget"
                );
                break;
            }
            context = candidate;
        }

        if context.is_empty() {
            return self.edgeless(nodes, reports, budget);
        }
        Ok(context)
    }

    fn edgeless(
        &self,
        nodes: &[NodeContext],
        reports: &[ReportSummary],
        budget: Option<usize>,
    ) -> Result<String, ContextError> {
        if self.fallback == EdgelessFallback::Disabled || nodes.is_empty() {
            return render_tables(reports, &[], &[], &[]);
        }

        let mut ranked: Vec<&NodeContext> = nodes.iter().collect();
        ranked.sort_by(|a, b| {
            b.degree
                .cmp(&a.degree)
                .then(a.details.short_id.cmp(&b.details.short_id))
        });

        let mut entities: Vec<&NodeDetails> = Vec::new();
        let mut claims: Vec<&ClaimDetails> = Vec::new();
        let mut seen_claims: HashSet<i64> = HashSet::new();
        let mut context = String::new();

        for node in ranked {
            entities.push(&node.details);
            claims.extend(
                node.claims
                    .iter()
                    .filter(|c| seen_claims.insert(c.short_id)),
            );
            let candidate = render_tables(reports, &entities, &claims, &[])?;
            if budget.is_some_and(|b| self.count(&candidate) > b) {
                if context.is_empty() {
                    // Nothing fits: keep the single highest-ranked node.
                    debug!(node = %node.title, "No node fits the budget");
                    context = candidate;
                }
                break;
            }
            context = candidate;
        }
        Ok(context)
    }
}

/// Flatten the node edge lists, dropping repeats by short id, and order them
/// by (combined degree desc, short id asc).
fn sorted_edges(nodes: &[NodeContext]) -> Vec<&EdgeDetails> {
    let mut seen = HashSet::new();
    let mut edges: Vec<&EdgeDetails> = nodes
        .iter()
        .flat_map(|n| n.edges.iter())
        .filter(|e| seen.insert(e.short_id))
        .collect();
    edges.sort_by(|a, b| {
        b.combined_degree
            .cmp(&a.combined_degree)
            .then(a.short_id.cmp(&b.short_id))
    });
    edges
}

/// Render the report, entity, claim and relationship tables, skipping empty
/// ones, separated by blank lines.
pub fn render_tables(
    reports: &[ReportSummary],
    entities: &[&NodeDetails],
    claims: &[&ClaimDetails],
    edges: &[&EdgeDetails],
) -> Result<String, ContextError> {
    let mut sections = Vec::new();
    if !reports.is_empty() {
        let rows = reports
            .iter()
            .map(|r| vec![r.community.to_string(), r.summary.clone()]);
        sections.push(csv_table("Reports", &["community", "summary"], rows)?);
    }
    if !entities.is_empty() {
        let rows = entities.iter().map(|n| {
            vec![
                n.short_id.to_string(),
                n.title.clone(),
                n.description.clone(),
                n.degree.to_string(),
            ]
        });
        sections.push(csv_table(
            "Entities",
            &["id", "entity", "description", "degree"],
            rows,
        )?);
    }
    if !claims.is_empty() {
        let rows = claims.iter().map(|c| {
            vec![
                c.short_id.to_string(),
                c.subject.clone(),
                c.claim_type.clone(),
                c.status.clone(),
                c.description.clone(),
            ]
        });
        sections.push(csv_table(
            "Claims",
            &["id", "entity", "type", "status", "description"],
            rows,
        )?);
    }
    if !edges.is_empty() {
        let rows = edges.iter().map(|e| {
            vec![
                e.short_id.to_string(),
                e.source.clone(),
                e.target.clone(),
                e.description.clone(),
                e.combined_degree.to_string(),
            ]
        });
        sections.push(csv_table(
            "Relationships",
            &["id", "source", "target", "description", "combined_degree"],
            rows,
        )?);
    }
    Ok(sections.join("\n\n"))
}

fn csv_table(
    label: &str,
    header: &[&str],
    rows: impl Iterator<Item = Vec<String>>,
) -> Result<String, ContextError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer
        .write_record(header)
        .map_err(|e| ContextError::Render(e.to_string()))?;
    for row in rows {
        writer
            .write_record(&row)
            .map_err(|e| ContextError::Render(e.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ContextError::Render(e.to_string()))?;
    let body = String::from_utf8(bytes).map_err(|e| ContextError::Render(e.to_string()))?;
    Ok(format!("-----{label}-----\n{}", body.trim_end_matches('\n')))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::context::tokens::EstimateCounter;

    pub(crate) fn node(title: &str, short_id: i64, degree: u64, description: &str) -> NodeContext {
        NodeContext {
            title: title.to_string(),
            degree,
            details: NodeDetails {
                short_id,
                title: title.to_string(),
                description: description.to_string(),
                degree,
            },
            edges: Vec::new(),
            claims: Vec::new(),
        }
    }

    pub(crate) fn edge(short_id: i64, source: &str, target: &str, combined: u64) -> EdgeDetails {
        EdgeDetails {
            short_id,
            source: source.to_string(),
            target: target.to_string(),
            description: format!("{source} relates to {target}"),
            combined_degree: combined,
        }
    }

    /// Attach `edge` to both endpoint nodes.
    pub(crate) fn link(nodes: &mut [NodeContext], e: &EdgeDetails) {
        for n in nodes.iter_mut() {
            if n.title == e.source || n.title == e.target {
                n.edges.push(e.clone());
            }
        }
    }

    fn serializer(fallback: EdgelessFallback) -> ContextSerializer {
        ContextSerializer::new(Arc::new(EstimateCounter), fallback)
    }

    fn triangle() -> Vec<NodeContext> {
        let mut nodes = vec![
            node("A", 0, 2, "first"),
            node("B", 1, 2, "second"),
            node("C", 2, 2, "third"),
        ];
        for e in [edge(7, "B", "C", 4), edge(3, "A", "B", 4), edge(5, "A", "C", 5)] {
            link(&mut nodes, &e);
        }
        nodes
    }

    #[test]
    fn renders_edges_by_combined_degree_then_id() {
        let text = serializer(EdgelessFallback::Nodes)
            .render_all(&triangle(), &[])
            .unwrap();

        let rels = text.split("-----Relationships-----\n").nth(1).unwrap();
        let ids: Vec<&str> = rels
            .lines()
            .skip(1)
            .map(|l| l.split(',').next().unwrap())
            .collect();
        assert_eq!(ids, ["5", "3", "7"]);

        // Each endpoint listed once, in first-touch order.
        let ents = text
            .split("-----Entities-----\n")
            .nth(1)
            .unwrap()
            .split("\n\n")
            .next()
            .unwrap();
        let titles: Vec<&str> = ents
            .lines()
            .skip(1)
            .map(|l| l.split(',').nth(1).unwrap())
            .collect();
        assert_eq!(titles, ["A", "C", "B"]);
    }

    #[test]
    fn budget_keeps_last_fitting_snapshot() {
        let s = serializer(EdgelessFallback::Nodes);
        let nodes = triangle();
        let full = s.render_all(&nodes, &[]).unwrap();
        let budget = s.count(&full) - 1;

        let trimmed = s.sort(&nodes, &[], Some(budget)).unwrap();
        assert!(s.count(&trimmed) <= budget);
        assert!(trimmed.contains("-----Relationships-----"));
        assert!(trimmed.len() < full.len());
    }

    #[test]
    fn edgeless_community_falls_back_to_nodes() {
        let nodes = vec![node("Lonely", 0, 0, "no links"), node("Hub", 1, 3, "busy")];
        let text = serializer(EdgelessFallback::Nodes)
            .sort(&nodes, &[], Some(1_000))
            .unwrap();
        assert!(!text.is_empty());
        let hub = text.find("Hub").unwrap();
        let lonely = text.find("Lonely").unwrap();
        assert!(hub < lonely, "higher degree ranks first");
    }

    #[test]
    fn edgeless_fallback_disabled_yields_empty() {
        let nodes = vec![node("Lonely", 0, 0, "no links")];
        let text = serializer(EdgelessFallback::Disabled)
            .sort(&nodes, &[], Some(1_000))
            .unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn overflowing_first_edge_uses_node_fallback() {
        let mut nodes = vec![node("A", 0, 1, "a"), node("B", 1, 1, "b")];
        let mut e = edge(0, "A", "B", 2);
        e.description = "x".repeat(2_000);
        link(&mut nodes, &e);

        let s = serializer(EdgelessFallback::Nodes);
        let text = s.sort(&nodes, &[], Some(40)).unwrap();
        assert!(text.contains("-----Entities-----"));
        assert!(!text.contains("-----Relationships-----"));
        assert!(s.count(&text) <= 40);
    }

    #[test]
    fn claims_are_emitted_once_per_endpoint() {
        let mut nodes = triangle();
        nodes[0].claims.push(ClaimDetails {
            short_id: 9,
            subject: "A".to_string(),
            claim_type: "FRAUD".to_string(),
            status: "SUSPECTED".to_string(),
            description: "claimed".to_string(),
        });
        let text = serializer(EdgelessFallback::Nodes)
            .render_all(&nodes, &[])
            .unwrap();
        assert_eq!(text.matches("claimed").count(), 1);
        assert!(text.find("-----Claims-----") < text.find("-----Relationships-----"));
    }

    #[test]
    fn reports_lead_the_context() {
        let reports = [ReportSummary {
            community: 4,
            summary: "child summary".to_string(),
        }];
        let text = serializer(EdgelessFallback::Nodes)
            .render_all(&triangle(), &reports)
            .unwrap();
        assert!(text.starts_with("-----Reports-----\ncommunity,summary\n4,child summary\n"));
    }
}
