//! Community report generation.
//!
//! Reports are produced bottom-up: each level's contexts are assembled with the
//! reports of the level below already available, then sent to the model with
//! bounded concurrency. A community whose call or parse fails is skipped.

pub mod generator;
pub mod prompt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ReportError;
use crate::llm::strip_code_fence;
use crate::types::{Community, CommunityReport, Finding, today_period};

pub use generator::{ReportGenerator, ReportPipeline, ReportRun};

/// The JSON object a model returns for one community.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default, alias = "rank", deserialize_with = "lenient_rating")]
    pub rating: f64,
    #[serde(default)]
    pub rating_explanation: String,
}

/// Accept a number, a numeric string, or null.
fn lenient_rating<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
        Null(()),
    }
    Ok(match Repr::deserialize(deserializer)? {
        Repr::Number(n) => n,
        Repr::Text(s) => s.trim().parse().unwrap_or(0.0),
        Repr::Null(()) => 0.0,
    })
}

impl ReportPayload {
    /// Parse model output, tolerating a surrounding code fence.
    pub fn parse(community: i64, text: &str) -> Result<Self, ReportError> {
        let payload: Self = serde_json::from_str(strip_code_fence(text)).map_err(|e| {
            ReportError::Malformed {
                community,
                message: e.to_string(),
            }
        })?;
        if payload.title.trim().is_empty() || payload.summary.trim().is_empty() {
            return Err(ReportError::Malformed {
                community,
                message: "title or summary is empty".to_string(),
            });
        }
        Ok(payload)
    }

    /// Markdown form: title heading, summary, one section per finding.
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}\n\n{}", self.title.trim(), self.summary.trim());
        for finding in &self.findings {
            out.push_str("\n\n## ");
            out.push_str(finding.summary.trim());
            out.push_str("\n\n");
            out.push_str(finding.explanation.trim());
        }
        out
    }

    /// Build the stored report for `community`.
    pub fn into_report(self, community: &Community) -> Result<CommunityReport, ReportError> {
        let full_content_json =
            serde_json::to_string(&self).map_err(|e| ReportError::Malformed {
                community: community.community,
                message: e.to_string(),
            })?;
        Ok(CommunityReport {
            id: uuid::Uuid::new_v4().to_string(),
            human_readable_id: community.community,
            community: community.community,
            level: community.level,
            parent: community.parent,
            children: community.children.clone(),
            full_content: self.to_markdown(),
            title: self.title,
            summary: self.summary,
            rank: self.rating,
            rating_explanation: self.rating_explanation,
            findings: self.findings,
            full_content_json,
            period: today_period(),
            size: community.size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"```json
{
  "title": "Anvil makers of Ohio",
  "summary": "ACME and its suppliers.",
  "rating": "7.5",
  "rating_explanation": "Central to the supply chain.",
  "findings": [
    {"summary": "ACME dominates", "explanation": "It supplies most anvils [Data: Entities (0)]."}
  ]
}
```"#;

    fn community() -> Community {
        Community {
            id: "c".to_string(),
            human_readable_id: 4,
            community: 4,
            level: 1,
            parent: 2,
            children: vec![9],
            title: "Community 4".to_string(),
            entity_ids: Vec::new(),
            relationship_ids: Vec::new(),
            text_unit_ids: Vec::new(),
            period: String::new(),
            size: 3,
        }
    }

    #[test]
    fn parses_fenced_json_with_string_rating() {
        let payload = ReportPayload::parse(4, RESPONSE).unwrap();
        assert_eq!(payload.title, "Anvil makers of Ohio");
        assert!((payload.rating - 7.5).abs() < f64::EPSILON);
        assert_eq!(payload.findings.len(), 1);
    }

    #[test]
    fn report_carries_community_shape() {
        let report = ReportPayload::parse(4, RESPONSE)
            .unwrap()
            .into_report(&community())
            .unwrap();
        assert_eq!(report.community, 4);
        assert_eq!(report.human_readable_id, 4);
        assert_eq!((report.level, report.parent), (1, 2));
        assert_eq!(report.children, [9]);
        assert_eq!(report.size, 3);
        assert!(report.full_content.starts_with("# Anvil makers of Ohio\n\nACME and its suppliers."));
        assert!(report.full_content.contains("\n\n## ACME dominates\n\n"));

        let back: ReportPayload = serde_json::from_str(&report.full_content_json).unwrap();
        assert_eq!(back.summary, report.summary);
    }

    #[test]
    fn rejects_non_json_and_empty_reports() {
        assert!(matches!(
            ReportPayload::parse(1, "I cannot help with that."),
            Err(ReportError::Malformed { community: 1, .. })
        ));
        assert!(ReportPayload::parse(1, r#"{"title": "", "summary": "x"}"#).is_err());
    }
}
