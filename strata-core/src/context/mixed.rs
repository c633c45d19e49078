// Mixed context: swap oversized child detail for child report summaries.

use tracing::debug;

use crate::error::ContextError;

use super::sort::{ContextSerializer, render_tables};
use super::{NodeContext, ReportSummary};

/// One child community as seen from its parent.
#[derive(Debug, Clone, Copy)]
pub struct SubCommunityContext<'a> {
    pub community: i64,
    pub nodes: &'a [NodeContext],
    /// Token size of the child's own local context.
    pub size: usize,
    /// Summary of the child's report, when one was generated.
    pub report: Option<&'a str>,
}

/// How a mixed context ended up fitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MixedContext {
    /// Some children replaced by report summaries, the rest kept raw.
    Substituted(String),
    /// Only report summaries, added one at a time until the budget.
    ReportsOnly(String),
}

impl MixedContext {
    pub fn into_text(self) -> String {
        match self {
            Self::Substituted(text) | Self::ReportsOnly(text) => text,
        }
    }
}

/// Build a parent context from its children's raw detail and reports.
///
/// Children are visited largest first. Each reported child's raw detail is
/// replaced by its summary; unreported children keep their raw detail. After
/// every step the remaining raw detail plus accumulated summaries is rendered
/// and measured. If no step fits, a reports-only block is grown one summary at
/// a time, keeping the last state that fit. Returns `None` when even one
/// summary overflows.
pub fn build_mixed_context(
    serializer: &ContextSerializer,
    children: &[SubCommunityContext<'_>],
    budget: usize,
) -> Result<Option<MixedContext>, ContextError> {
    let mut sorted: Vec<&SubCommunityContext<'_>> = children.iter().collect();
    sorted.sort_by(|a, b| b.size.cmp(&a.size).then(a.community.cmp(&b.community)));

    let mut summaries: Vec<ReportSummary> = Vec::new();
    let mut kept_raw: Vec<NodeContext> = Vec::new();

    for (idx, child) in sorted.iter().enumerate() {
        match child.report {
            Some(summary) => summaries.push(ReportSummary {
                community: child.community,
                summary: summary.to_string(),
            }),
            None => kept_raw.extend(child.nodes.iter().cloned()),
        }

        let mut nodes: Vec<NodeContext> = sorted[idx + 1..]
            .iter()
            .flat_map(|c| c.nodes.iter().cloned())
            .collect();
        nodes.extend(kept_raw.iter().cloned());

        let candidate = serializer.render_all(&nodes, &summaries)?;
        if serializer.count(&candidate) <= budget {
            debug!(
                substituted = summaries.len(),
                raw_children = sorted.len() - summaries.len(),
                "Mixed context fits"
            );
            return Ok(Some(MixedContext::Substituted(candidate)));
        }
    }

    let mut reports: Vec<ReportSummary> = Vec::new();
    let mut context = String::new();
    for child in &sorted {
        let Some(summary) = child.report else {
            continue;
        };
        reports.push(ReportSummary {
            community: child.community,
            summary: summary.to_string(),
        });
        let candidate = render_tables(&reports, &[], &[], &[])?;
        if serializer.count(&candidate) > budget {
            break;
        }
        context = candidate;
    }

    if context.is_empty() {
        debug!(children = sorted.len(), "No mixed context fits");
        return Ok(None);
    }
    debug!(reports = reports.len(), "Mixed context degraded to reports only");
    Ok(Some(MixedContext::ReportsOnly(context)))
}
