// Community report merge: same id mapping as the communities they describe.

use std::collections::HashSet;

use tracing::debug;

use crate::error::MergeError;
use crate::types::{ArtifactKind, Community, CommunityReport};

use super::communities::CommunityMapping;

/// Rewrite delta reports through `mapping`, append them to `old` and check
/// that every merged report describes a merged community.
pub fn merge_reports(
    old: Vec<CommunityReport>,
    delta: Vec<CommunityReport>,
    mapping: &CommunityMapping,
    communities: &[Community],
) -> Result<Vec<CommunityReport>, MergeError> {
    let known: HashSet<i64> = communities.iter().map(|c| c.community).collect();
    let added = delta.len();
    let mut reports = old;
    reports.reserve(delta.len());

    for mut report in delta {
        let kind = ArtifactKind::CommunityReport;
        report.community = mapping.resolve(kind, &report.id, "community", report.community)?;
        report.parent = mapping.resolve(kind, &report.id, "parent", report.parent)?;
        report.children = report
            .children
            .iter()
            .map(|&child| mapping.resolve(kind, &report.id, "children", child))
            .collect::<Result<_, _>>()?;
        reports.push(report);
    }

    for report in &mut reports {
        if !known.contains(&report.community) {
            return Err(MergeError::DanglingReference {
                kind: ArtifactKind::CommunityReport,
                record: report.id.clone(),
                field: "community",
                value: report.community,
            });
        }
        report.human_readable_id = report.community;
    }

    debug!(total = reports.len(), added, "Community reports merged");
    Ok(reports)
}
