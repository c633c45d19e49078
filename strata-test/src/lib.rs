// Integration test fixtures for Strata: a small committed index, a delta
// batch that overlaps it, and a scripted LLM provider.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use strata_core::error::LlmError;
use strata_core::llm::{CompletionRequest, LlmProvider, TokenUsage};
use strata_core::store::files::write_tables_dir;
use strata_core::store::{IndexStore, SqliteStore};
use strata_core::types::{
    Claim, Community, CommunityReport, Description, Entity, IndexTables, NO_COMMUNITY,
    Relationship, Scope, TextUnit,
};

// ── Record builders ───────────────────────────────────────────────

pub fn entity(id: &str, hrid: Option<i64>, title: &str, description: &str) -> Entity {
    Entity {
        id: id.to_string(),
        human_readable_id: hrid,
        title: title.to_string(),
        entity_type: "ORGANIZATION".to_string(),
        description: Description::new(description),
        text_unit_ids: Vec::new(),
        frequency: 0,
        degree: 0,
        x: None,
        y: None,
    }
}

pub fn relationship(id: &str, hrid: Option<i64>, source: &str, target: &str) -> Relationship {
    Relationship {
        id: id.to_string(),
        human_readable_id: hrid,
        source: source.to_string(),
        target: target.to_string(),
        description: Description::new(format!("{source} works with {target}")),
        weight: 1.0,
        combined_degree: 0,
        text_unit_ids: Vec::new(),
    }
}

pub fn text_unit(id: &str, hrid: Option<i64>, entity_ids: &[&str]) -> TextUnit {
    TextUnit {
        id: id.to_string(),
        human_readable_id: hrid,
        text: format!("Source text of {id}."),
        n_tokens: 5,
        document_ids: vec!["doc-1".to_string()],
        entity_ids: strings(entity_ids),
        relationship_ids: Vec::new(),
        covariate_ids: Vec::new(),
    }
}

pub fn claim(id: &str, hrid: Option<i64>, subject_id: &str) -> Claim {
    Claim {
        id: id.to_string(),
        human_readable_id: hrid,
        covariate_type: "claim".to_string(),
        claim_type: "SUPPLY".to_string(),
        description: format!("{subject_id} supplies anvils"),
        subject_id: subject_id.to_string(),
        object_id: None,
        status: "TRUE".to_string(),
        start_date: None,
        end_date: None,
        source_text: None,
        text_unit_id: "t0".to_string(),
    }
}

pub fn community(
    id: &str,
    community: i64,
    level: u32,
    parent: i64,
    children: &[i64],
    entity_ids: &[&str],
) -> Community {
    Community {
        id: id.to_string(),
        human_readable_id: community,
        community,
        level,
        parent,
        children: children.to_vec(),
        title: format!("Community {community}"),
        entity_ids: strings(entity_ids),
        relationship_ids: Vec::new(),
        text_unit_ids: Vec::new(),
        period: "2024-01-01".to_string(),
        size: entity_ids.len() as u64,
    }
}

pub fn report(id: &str, community: i64, level: u32, parent: i64, summary: &str) -> CommunityReport {
    CommunityReport {
        id: id.to_string(),
        human_readable_id: community,
        community,
        level,
        parent,
        children: Vec::new(),
        title: format!("Report on community {community}"),
        summary: summary.to_string(),
        full_content: format!("# Report on community {community}\n\n{summary}"),
        rank: 5.0,
        rating_explanation: "Moderate.".to_string(),
        findings: Vec::new(),
        full_content_json: "{}".to_string(),
        period: "2024-01-01".to_string(),
        size: 2,
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

// ── Fixture indexes ───────────────────────────────────────────────

/// Committed index: four entities in two leaf communities under one root,
/// with reports for all three communities.
pub fn committed_index() -> IndexTables {
    IndexTables {
        entities: vec![
            entity("e0", Some(0), "ACME", "ACME makes anvils."),
            entity("e1", Some(1), "BOLT", "BOLT sells bolts."),
            entity("e2", Some(2), "COYOTE", "COYOTE buys from ACME."),
            entity("e3", Some(3), "DESERT", "DESERT is where COYOTE lives."),
        ],
        relationships: vec![
            relationship("r0", Some(0), "ACME", "BOLT"),
            relationship("r1", Some(1), "COYOTE", "ACME"),
            relationship("r2", Some(2), "COYOTE", "DESERT"),
        ],
        communities: vec![
            community("c0", 0, 0, NO_COMMUNITY, &[1, 2], &["e0", "e1", "e2", "e3"]),
            community("c1", 1, 1, 0, &[], &["e0", "e1"]),
            community("c2", 2, 1, 0, &[], &["e2", "e3"]),
        ],
        reports: vec![
            report("rep0", 0, 0, NO_COMMUNITY, "The whole anvil economy."),
            report("rep1", 1, 1, 0, "Suppliers ACME and BOLT."),
            report("rep2", 2, 1, 0, "COYOTE and the DESERT."),
        ],
        text_units: vec![
            text_unit("t0", Some(0), &["e0", "e1", "e2"]),
            text_unit("t1", Some(1), &["e2", "e3"]),
        ],
        claims: vec![claim("cl0", Some(0), "e2")],
    }
}

/// Delta batch: ACME again (as `d0`), two new entities, one repeated edge,
/// and a two-level community tree numbered from zero.
pub fn delta_batch() -> IndexTables {
    IndexTables {
        entities: vec![
            entity("d0", None, "ACME", "ACME opened a second factory."),
            entity("d1", None, "FALCON", "FALCON delivers parcels."),
            entity("d2", None, "GADGET", "GADGET is a FALCON product."),
        ],
        relationships: vec![
            relationship("dr0", None, "FALCON", "ACME"),
            relationship("dr1", None, "GADGET", "FALCON"),
            relationship("dr2", None, "ACME", "BOLT"),
        ],
        communities: vec![
            community("dc0", 0, 0, NO_COMMUNITY, &[1], &["d0", "d1", "d2"]),
            community("dc1", 1, 1, 0, &[], &["d1", "d2"]),
        ],
        reports: vec![report("drep1", 1, 1, 0, "FALCON and its GADGET.")],
        text_units: vec![text_unit("t2", None, &["d0", "d1", "d2"])],
        claims: vec![claim("dcl0", None, "d0")],
    }
}

/// In-memory store holding [`committed_index`] in main and [`delta_batch`]
/// in delta.
pub async fn seeded_store() -> SqliteStore {
    let store = SqliteStore::in_memory().expect("in-memory store");
    store
        .save_tables(Scope::Main, &committed_index())
        .await
        .expect("save main");
    store
        .save_tables(Scope::Delta, &delta_batch())
        .await
        .expect("save delta");
    store
}

// ── On-disk project ───────────────────────────────────────────────

/// A temporary directory for CLI runs and table files.
#[derive(Debug)]
pub struct TestProject {
    pub dir: tempfile::TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `tables` as table files under `name`, returning the directory.
    pub fn write_batch(&self, name: &str, tables: &IndexTables) -> PathBuf {
        let out = self.path().join(name);
        write_tables_dir(&out, tables).expect("write table files");
        out
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

// ── Scripted LLM ──────────────────────────────────────────────────

/// Answers every prompt with a numbered report (or a short summary for
/// description prompts). Prompts containing `fail_on` fail.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    calls: AtomicUsize,
    pub fail_on: Option<String>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_on(needle: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_on: Some(needle.to_string()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "scripted-1"
    }

    async fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<(String, TokenUsage), LlmError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(needle) = &self.fail_on {
            if request.prompt.contains(needle.as_str()) {
                return Err(LlmError::ApiError {
                    status: 500,
                    body: "scripted failure".to_string(),
                });
            }
        }
        let usage = TokenUsage {
            input_tokens: (request.prompt.len() / 4) as u64,
            output_tokens: 50,
        };
        let text = if request.json {
            serde_json::json!({
                "title": format!("Scripted report {n}"),
                "summary": format!("Summary number {n}."),
                "rating": 6.5,
                "rating_explanation": "Scripted.",
                "findings": [{"summary": "A finding", "explanation": "Because."}]
            })
            .to_string()
        } else {
            format!("Combined description {n}.")
        };
        Ok((text, usage))
    }

    fn cost_per_1k_input(&self) -> f64 {
        0.001
    }

    fn cost_per_1k_output(&self) -> f64 {
        0.002
    }
}
