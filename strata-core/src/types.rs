use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Sentinel community id meaning "no community" (root parent).
pub const NO_COMMUNITY: i64 = -1;

// ── Artifact kinds and scopes ──────────────────────────────────────

/// Every table the index persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Entity,
    Relationship,
    Community,
    CommunityReport,
    TextUnit,
    Claim,
}

impl ArtifactKind {
    pub const ALL: [Self; 6] = [
        Self::Entity,
        Self::Relationship,
        Self::Community,
        Self::CommunityReport,
        Self::TextUnit,
        Self::Claim,
    ];

    /// Table name used by the store and by import/export file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entity => "entities",
            Self::Relationship => "relationships",
            Self::Community => "communities",
            Self::CommunityReport => "community_reports",
            Self::TextUnit => "text_units",
            Self::Claim => "claims",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which index a table belongs to: the committed one or the pending batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Main,
    Delta,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Delta => "delta",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted record type.
pub trait Artifact: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: ArtifactKind;

    /// Stable opaque identifier.
    fn record_id(&self) -> &str;
}

// ── Descriptions ───────────────────────────────────────────────────

/// Ordered description fragments accumulated across merges.
///
/// Kept as a list until summarization collapses it, so merges never have to
/// re-parse a joined string. Deserializes from either a list or a plain string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Description(Vec<String>);

impl Description {
    pub fn new(fragment: impl Into<String>) -> Self {
        let fragment = fragment.into();
        if fragment.is_empty() {
            Self::default()
        } else {
            Self(vec![fragment])
        }
    }

    pub fn fragments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append fragments in order.
    pub fn extend(&mut self, other: &Description) {
        self.0.extend(other.0.iter().cloned());
    }

    /// Fragments with duplicates removed, first occurrence wins.
    pub fn distinct(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.0
            .iter()
            .map(String::as_str)
            .filter(|f| !f.is_empty() && seen.insert(*f))
            .collect()
    }

    /// Single text form for prompts and context tables.
    pub fn render(&self) -> String {
        self.distinct().join("\n")
    }
}

impl From<&str> for Description {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<Vec<String>> for Description {
    fn from(v: Vec<String>) -> Self {
        Self(v)
    }
}

impl<'de> Deserialize<'de> for Description {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            One(String),
            Many(Vec<String>),
            Null(()),
        }
        Ok(match Repr::deserialize(deserializer)? {
            Repr::One(s) => Self::new(s),
            Repr::Many(v) => Self(v),
            Repr::Null(()) => Self::default(),
        })
    }
}

/// Treat JSON `null` as an empty string so keyless records can be detected
/// and dropped instead of failing the whole table.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_parent() -> i64 {
    NO_COMMUNITY
}

fn default_weight() -> f64 {
    1.0
}

/// Today's date as used for the `period` column.
pub fn today_period() -> String {
    chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

// ── Graph records ──────────────────────────────────────────────────

/// A named entity extracted from text units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    /// `None` only for delta records that have not been merged yet.
    #[serde(default)]
    pub human_readable_id: Option<i64>,
    /// Merge key.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_empty")]
    pub entity_type: String,
    #[serde(default)]
    pub description: Description,
    #[serde(default)]
    pub text_unit_ids: Vec<String>,
    #[serde(default)]
    pub frequency: u64,
    #[serde(default)]
    pub degree: u64,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
}

impl Artifact for Entity {
    const KIND: ArtifactKind = ArtifactKind::Entity;

    fn record_id(&self) -> &str {
        &self.id
    }
}

/// A directed relationship between two entity titles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    #[serde(default)]
    pub human_readable_id: Option<i64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub source: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub target: String,
    #[serde(default)]
    pub description: Description,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub combined_degree: u64,
    #[serde(default)]
    pub text_unit_ids: Vec<String>,
}

impl Artifact for Relationship {
    const KIND: ArtifactKind = ArtifactKind::Relationship;

    fn record_id(&self) -> &str {
        &self.id
    }
}

/// A cluster of entities at one level of the community hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    pub id: String,
    pub human_readable_id: i64,
    pub community: i64,
    pub level: u32,
    #[serde(default = "default_parent")]
    pub parent: i64,
    #[serde(default)]
    pub children: Vec<i64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub entity_ids: Vec<String>,
    #[serde(default)]
    pub relationship_ids: Vec<String>,
    #[serde(default)]
    pub text_unit_ids: Vec<String>,
    #[serde(default)]
    pub period: String,
    #[serde(default)]
    pub size: u64,
}

impl Artifact for Community {
    const KIND: ArtifactKind = ArtifactKind::Community;

    fn record_id(&self) -> &str {
        &self.id
    }
}

/// One structured insight inside a community report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub explanation: String,
}

/// LLM-generated summary of a community.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityReport {
    pub id: String,
    pub human_readable_id: i64,
    pub community: i64,
    pub level: u32,
    #[serde(default = "default_parent")]
    pub parent: i64,
    #[serde(default)]
    pub children: Vec<i64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    /// Markdown rendering of the whole report.
    #[serde(default)]
    pub full_content: String,
    #[serde(default)]
    pub rank: f64,
    #[serde(default)]
    pub rating_explanation: String,
    #[serde(default)]
    pub findings: Vec<Finding>,
    /// The structured payload exactly as parsed from the model.
    #[serde(default)]
    pub full_content_json: String,
    #[serde(default)]
    pub period: String,
    #[serde(default)]
    pub size: u64,
}

impl Artifact for CommunityReport {
    const KIND: ArtifactKind = ArtifactKind::CommunityReport;

    fn record_id(&self) -> &str {
        &self.id
    }
}

/// A chunk of source text that entities and claims were extracted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUnit {
    pub id: String,
    #[serde(default)]
    pub human_readable_id: Option<i64>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub n_tokens: u64,
    #[serde(default)]
    pub document_ids: Vec<String>,
    #[serde(default)]
    pub entity_ids: Vec<String>,
    #[serde(default)]
    pub relationship_ids: Vec<String>,
    #[serde(default)]
    pub covariate_ids: Vec<String>,
}

impl Artifact for TextUnit {
    const KIND: ArtifactKind = ArtifactKind::TextUnit;

    fn record_id(&self) -> &str {
        &self.id
    }
}

/// A claim (covariate) about an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub id: String,
    #[serde(default)]
    pub human_readable_id: Option<i64>,
    #[serde(default = "default_covariate_type")]
    pub covariate_type: String,
    #[serde(rename = "type", default)]
    pub claim_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub subject_id: String,
    #[serde(default)]
    pub object_id: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub source_text: Option<String>,
    #[serde(default)]
    pub text_unit_id: String,
}

fn default_covariate_type() -> String {
    "claim".to_string()
}

impl Artifact for Claim {
    const KIND: ArtifactKind = ArtifactKind::Claim;

    fn record_id(&self) -> &str {
        &self.id
    }
}

// ── Whole index ────────────────────────────────────────────────────

/// All tables of one index scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexTables {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub communities: Vec<Community>,
    pub reports: Vec<CommunityReport>,
    pub text_units: Vec<TextUnit>,
    pub claims: Vec<Claim>,
}

impl IndexTables {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
            && self.relationships.is_empty()
            && self.communities.is_empty()
            && self.reports.is_empty()
            && self.text_units.is_empty()
            && self.claims.is_empty()
    }

    /// Row count for one table.
    pub fn count(&self, kind: ArtifactKind) -> usize {
        match kind {
            ArtifactKind::Entity => self.entities.len(),
            ArtifactKind::Relationship => self.relationships.len(),
            ArtifactKind::Community => self.communities.len(),
            ArtifactKind::CommunityReport => self.reports.len(),
            ArtifactKind::TextUnit => self.text_units.len(),
            ArtifactKind::Claim => self.claims.len(),
        }
    }

    /// Deepest community level present, if any.
    pub fn max_level(&self) -> Option<u32> {
        self.communities.iter().map(|c| c.level).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_accepts_string_list_and_null() {
        let one: Description = serde_json::from_str("\"a cat\"").unwrap();
        assert_eq!(one.fragments(), ["a cat"]);

        let many: Description = serde_json::from_str("[\"a\", \"b\"]").unwrap();
        assert_eq!(many.fragments(), ["a", "b"]);

        let none: Description = serde_json::from_str("null").unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn description_render_dedupes_in_order() {
        let d = Description::from(vec![
            "b".to_string(),
            "a".to_string(),
            "b".to_string(),
            String::new(),
        ]);
        assert_eq!(d.render(), "b\na");
        // Fragments themselves are preserved untouched.
        assert_eq!(d.fragments().len(), 4);
    }

    #[test]
    fn entity_with_null_title_deserializes_empty() {
        let e: Entity = serde_json::from_value(serde_json::json!({
            "id": "e1",
            "title": null,
            "type": "PERSON",
        }))
        .unwrap();
        assert!(e.title.is_empty());
        assert_eq!(e.human_readable_id, None);
        assert_eq!(e.entity_type, "PERSON");
    }

    #[test]
    fn community_parent_defaults_to_sentinel() {
        let c: Community = serde_json::from_value(serde_json::json!({
            "id": "c",
            "human_readable_id": 0,
            "community": 0,
            "level": 0,
        }))
        .unwrap();
        assert_eq!(c.parent, NO_COMMUNITY);
    }

    #[test]
    fn artifact_kind_parse_round_trip() {
        for kind in ArtifactKind::ALL {
            assert_eq!(ArtifactKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ArtifactKind::parse("nodes"), None);
    }
}
