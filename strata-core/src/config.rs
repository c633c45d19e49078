use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Whether child-community reports are visible while a parent level is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubReportMode {
    /// Reports generated for level L+1 are used when substituting at level L.
    #[default]
    Fixed,
    /// Lower-level reports are always treated as unavailable; oversized
    /// communities are truncated instead of substituted.
    Legacy,
}

/// What the serializer does when a community has no usable edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EdgelessFallback {
    /// Rank bare node details by degree and include as many as fit.
    #[default]
    Nodes,
    /// Build context from edges only; an edgeless community gets an empty context.
    Disabled,
}

/// Token counting scheme used for every budget comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerKind {
    #[default]
    Cl100kBase,
    O200kBase,
    /// Character-based estimate; needs no BPE tables.
    Estimate,
}

/// Top-level Strata configuration, matching `strata.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrataConfig {
    #[serde(default)]
    pub index: IndexSection,
    #[serde(default)]
    pub merge: MergeSection,
    #[serde(default)]
    pub context: ContextSection,
    #[serde(default)]
    pub reports: ReportsSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub clustering: ClusteringSection,
}

impl StrataConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()).into());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> crate::error::Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.context.max_context_tokens == 0 {
            return Err(ConfigError::Invalid(
                "context.max_context_tokens must be positive".into(),
            ));
        }
        if self.reports.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "reports.max_concurrent must be at least 1".into(),
            ));
        }
        if self.clustering.max_cluster_size == 0 {
            return Err(ConfigError::Invalid(
                "clustering.max_cluster_size must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSection {
    /// Database file, relative to the project root.
    pub db_path: PathBuf,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(".strata/index.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeSection {
    /// Summarize multi-fragment descriptions with the LLM after merging.
    pub summarize_descriptions: bool,
    pub max_summary_tokens: usize,
    /// Clear the delta scope once it has been merged into main.
    pub clear_delta: bool,
}

impl Default for MergeSection {
    fn default() -> Self {
        Self {
            summarize_descriptions: false,
            max_summary_tokens: 500,
            clear_delta: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSection {
    pub max_context_tokens: usize,
    pub tokenizer: TokenizerKind,
    pub sub_report_mode: SubReportMode,
    pub edgeless_fallback: EdgelessFallback,
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            max_context_tokens: 8_000,
            tokenizer: TokenizerKind::default(),
            sub_report_mode: SubReportMode::default(),
            edgeless_fallback: EdgelessFallback::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsSection {
    /// Target length of a report, in words.
    pub max_report_length: usize,
    /// Completion token cap per report call.
    pub max_output_tokens: u32,
    pub max_concurrent: u32,
    pub temperature: f64,
}

impl Default for ReportsSection {
    fn default() -> Self {
        Self {
            max_report_length: 1_500,
            max_output_tokens: 2_000,
            max_concurrent: 4,
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub provider: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub base_url: Option<String>,
    /// Maximum estimated spend in USD; 0 means unlimited.
    pub cost_budget: f64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            cost_budget: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringSection {
    pub max_cluster_size: usize,
    pub use_lcc: bool,
    pub seed: Option<u64>,
}

impl Default for ClusteringSection {
    fn default() -> Self {
        Self {
            max_cluster_size: 10,
            use_lcc: true,
            seed: Some(0xDEAD_BEEF),
        }
    }
}
