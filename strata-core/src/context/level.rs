// Level context: resolve every community at one hierarchy level to a
// context that fits the budget.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, info, instrument};

use crate::config::SubReportMode;
use crate::error::ContextError;
use crate::types::CommunityReport;

use super::local::LocalContexts;
use super::mixed::{SubCommunityContext, build_mixed_context};
use super::sort::ContextSerializer;
use super::{ContextRow, ContextState};

/// Drives the Fits / Substituted / Truncated decision for one level.
#[derive(Debug, Clone, Copy)]
pub struct LevelContextBuilder<'a> {
    serializer: &'a ContextSerializer,
    budget: usize,
    mode: SubReportMode,
}

impl<'a> LevelContextBuilder<'a> {
    pub fn new(serializer: &'a ContextSerializer, budget: usize, mode: SubReportMode) -> Self {
        Self {
            serializer,
            budget,
            mode,
        }
    }

    /// Final context rows for `level`.
    ///
    /// Rows already within budget pass through. Oversized rows with children
    /// at `level + 1` try substitution using the reports of that level (none in
    /// legacy mode). Anything left is trimmed from its own local detail.
    #[instrument(skip_all, name = "level_context", fields(level = level))]
    pub fn build_level(
        &self,
        level: u32,
        local: &LocalContexts,
        hierarchy: &BTreeMap<i64, BTreeSet<i64>>,
        reports: &[CommunityReport],
    ) -> Result<Vec<ContextRow>, ContextError> {
        let Some(rows) = local.get(&level) else {
            return Ok(Vec::new());
        };

        let child_rows: HashMap<i64, &ContextRow> = local
            .get(&(level + 1))
            .map(|rows| rows.iter().map(|r| (r.community, r)).collect())
            .unwrap_or_default();
        let summaries: HashMap<i64, &str> = match self.mode {
            SubReportMode::Fixed => reports
                .iter()
                .filter(|r| r.level == level + 1)
                .map(|r| (r.community, r.summary.as_str()))
                .collect(),
            SubReportMode::Legacy => HashMap::new(),
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            if !row.exceeds_budget {
                out.push(ContextRow {
                    state: ContextState::Fits,
                    ..row.clone()
                });
                continue;
            }

            if !summaries.is_empty() {
                if let Some(resolved) = self.substitute(row, hierarchy, &child_rows, &summaries)? {
                    out.push(resolved);
                    continue;
                }
            }

            out.push(self.truncate(row)?);
        }

        let count = |state| out.iter().filter(|r| r.state == state).count();
        info!(
            level,
            communities = out.len(),
            fits = count(ContextState::Fits),
            substituted = count(ContextState::Substituted),
            truncated = count(ContextState::Truncated),
            "Level context assembled"
        );
        Ok(out)
    }

    fn substitute(
        &self,
        row: &ContextRow,
        hierarchy: &BTreeMap<i64, BTreeSet<i64>>,
        child_rows: &HashMap<i64, &ContextRow>,
        summaries: &HashMap<i64, &str>,
    ) -> Result<Option<ContextRow>, ContextError> {
        let children: Vec<SubCommunityContext<'_>> = hierarchy
            .get(&row.community)
            .into_iter()
            .flatten()
            .filter_map(|child| {
                child_rows.get(child).map(|c| SubCommunityContext {
                    community: c.community,
                    nodes: &c.nodes,
                    size: c.size,
                    report: summaries.get(child).copied(),
                })
            })
            .collect();
        if children.is_empty() {
            return Ok(None);
        }

        let Some(mixed) = build_mixed_context(self.serializer, &children, self.budget)? else {
            return Ok(None);
        };
        let context = mixed.into_text();
        let size = self.serializer.count(&context);
        debug!(community = row.community, size, "Community substituted");
        Ok(Some(ContextRow {
            community: row.community,
            level: row.level,
            nodes: row.nodes.clone(),
            context,
            size,
            exceeds_budget: false,
            state: ContextState::Substituted,
        }))
    }

    fn truncate(&self, row: &ContextRow) -> Result<ContextRow, ContextError> {
        let context = self.serializer.sort(&row.nodes, &[], Some(self.budget))?;
        let size = self.serializer.count(&context);
        debug!(
            community = row.community,
            from = row.size,
            to = size,
            "Community truncated"
        );
        Ok(ContextRow {
            community: row.community,
            level: row.level,
            nodes: row.nodes.clone(),
            context,
            size,
            exceeds_budget: size > self.budget,
            state: ContextState::Truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EdgelessFallback;
    use crate::context::NodeContext;
    use crate::context::sort::tests::{edge, link, node};
    use crate::context::tokens::EstimateCounter;
    use std::sync::Arc;

    fn serializer() -> ContextSerializer {
        ContextSerializer::new(Arc::new(EstimateCounter), EdgelessFallback::Nodes)
    }

    fn row(s: &ContextSerializer, community: i64, level: u32, nodes: Vec<NodeContext>, budget: usize) -> ContextRow {
        let context = s.render_all(&nodes, &[]).unwrap();
        let size = s.count(&context);
        ContextRow {
            community,
            level,
            nodes,
            context,
            size,
            exceeds_budget: size > budget,
            state: if size > budget {
                ContextState::Oversized
            } else {
                ContextState::Fits
            },
        }
    }

    fn report(community: i64, level: u32, summary: &str) -> CommunityReport {
        CommunityReport {
            id: format!("r{community}"),
            human_readable_id: community,
            community,
            level,
            parent: 0,
            children: Vec::new(),
            title: String::new(),
            summary: summary.to_string(),
            full_content: String::new(),
            rank: 0.0,
            rating_explanation: String::new(),
            findings: Vec::new(),
            full_content_json: String::new(),
            period: String::new(),
            size: 0,
        }
    }

    /// Level 0: community 0 with ~500 tokens of detail. Level 1: children 1
    /// and 2 at ~65 and ~45 tokens.
    fn two_level(s: &ContextSerializer, budget: usize) -> (LocalContexts, BTreeMap<i64, BTreeSet<i64>>) {
        let child_one = vec![node("One", 1, 1, &"o".repeat(200))];
        let child_two = vec![node("Two", 2, 1, &"t".repeat(120))];

        let mut parent = vec![node("Hub", 0, 2, &"h".repeat(2_000))];
        parent.extend(child_one.iter().cloned());
        parent.extend(child_two.iter().cloned());
        link(&mut parent, &edge(0, "Hub", "One", 3));
        link(&mut parent, &edge(1, "Hub", "Two", 3));

        let mut local = LocalContexts::new();
        local.insert(0, vec![row(s, 0, 0, parent, budget)]);
        local.insert(
            1,
            vec![row(s, 1, 1, child_one, budget), row(s, 2, 1, child_two, budget)],
        );
        let hierarchy = BTreeMap::from([(0, BTreeSet::from([1, 2]))]);
        (local, hierarchy)
    }

    #[test]
    fn oversized_parent_substitutes_larger_child_report() {
        let s = serializer();
        let (local, hierarchy) = two_level(&s, 100);
        assert!(local[&0][0].size >= 500);
        let reports = [
            report(1, 1, "summary of child one"),
            report(2, 1, "summary of child two"),
        ];

        let rows = LevelContextBuilder::new(&s, 100, SubReportMode::Fixed)
            .build_level(0, &local, &hierarchy, &reports)
            .unwrap();

        assert_eq!(rows.len(), 1);
        let r = &rows[0];
        assert_eq!(r.state, ContextState::Substituted);
        assert!(r.size <= 100);
        assert!(!r.exceeds_budget);
        assert!(r.context.contains("summary of child one"));
    }

    #[test]
    fn legacy_mode_ignores_child_reports() {
        let s = serializer();
        let (local, hierarchy) = two_level(&s, 100);
        let reports = [report(1, 1, "summary of child one")];

        let rows = LevelContextBuilder::new(&s, 100, SubReportMode::Legacy)
            .build_level(0, &local, &hierarchy, &reports)
            .unwrap();

        assert_eq!(rows[0].state, ContextState::Truncated);
        assert!(!rows[0].context.contains("summary of child one"));
    }

    #[test]
    fn fitting_rows_pass_through_unchanged() {
        let s = serializer();
        let (local, hierarchy) = two_level(&s, 100);
        let rows = LevelContextBuilder::new(&s, 100, SubReportMode::Fixed)
            .build_level(1, &local, &hierarchy, &[])
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.state == ContextState::Fits));
        assert_eq!(rows[0].context, local[&1][0].context);
    }

    #[test]
    fn oversized_leaf_is_truncated_within_budget() {
        let s = serializer();
        let mut nodes: Vec<NodeContext> = (0..6)
            .map(|i| node(&format!("N{i}"), i, 1, &"x".repeat(80)))
            .collect();
        for i in 1..6 {
            link(&mut nodes, &edge(i, "N0", &format!("N{i}"), 2));
        }
        let mut local = LocalContexts::new();
        local.insert(2, vec![row(&s, 7, 2, nodes, 60)]);

        let rows = LevelContextBuilder::new(&s, 60, SubReportMode::Fixed)
            .build_level(2, &local, &BTreeMap::new(), &[report(9, 3, "unrelated")])
            .unwrap();
        assert_eq!(rows[0].state, ContextState::Truncated);
        assert!(rows[0].size <= 60);
        assert!(!rows[0].context.is_empty());
    }

    #[test]
    fn missing_level_yields_no_rows() {
        let s = serializer();
        let rows = LevelContextBuilder::new(&s, 10, SubReportMode::Fixed)
            .build_level(4, &LocalContexts::new(), &BTreeMap::new(), &[])
            .unwrap();
        assert!(rows.is_empty());
    }
}
