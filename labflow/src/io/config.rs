//! Labflow configuration stored in a TOML file (default `labflow.toml`).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::routing::{RouteRule, RoutingTable};
use crate::core::types::AgentId;

/// Labflow configuration (TOML).
///
/// Missing fields default to the values the lab deployment runs with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LabflowConfig {
    #[serde(rename = "loop")]
    pub control: LoopConfig,
    pub llm: LlmConfig,
    pub executor: ExecutorConfig,
    pub knowledge: KnowledgeConfig,
    /// Specialist workers in routing order; the first one is the fallback.
    pub specialists: Vec<SpecialistConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoopConfig {
    /// Consecutive failures of one step that end the run.
    pub max_retries: u32,
    /// Upper bound on node executions per run.
    pub step_budget: u32,
    /// Character budget for the resource snapshot captured at planning.
    pub snapshot_limit_chars: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            step_budget: 50,
            snapshot_limit_chars: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible API root (the client appends `/chat/completions`).
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub path_extraction: PathExtraction,
}

/// How the target directory is pulled out of a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PathExtraction {
    /// Ask the text generator.
    Llm,
    /// First absolute path token; no model call.
    Regex,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.1,
            timeout_secs: 120,
            path_extraction: PathExtraction::Llm,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    Ssh,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutorConfig {
    pub kind: ExecutorKind,
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Conda installation root; when set, each script runs inside `conda activate <env>`.
    pub conda_root: Option<String>,
    /// Environment for scripts that match no specialist marker.
    pub default_env: String,
    pub connect_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub progress_interval_secs: u64,
    pub output_limit_bytes: usize,
    /// Append-only JSONL record of every remote call.
    pub log_path: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            kind: ExecutorKind::Ssh,
            host: "127.0.0.1".to_string(),
            port: 22,
            user: "lab".to_string(),
            conda_root: None,
            default_env: "base".to_string(),
            connect_timeout_secs: 10,
            poll_interval_ms: 1000,
            progress_interval_secs: 30,
            output_limit_bytes: 1_000_000,
            log_path: Some(PathBuf::from("logs/executor.jsonl")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Directory of `.md`/`.txt` snippets; retrieval is disabled when unset.
    pub dir: Option<PathBuf>,
}

/// How much of the error log a specialist shows its generator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorWindow {
    All,
    Last,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SpecialistConfig {
    pub id: String,
    /// One-line role shown to the planner and the generator.
    pub description: String,
    /// Step-text keywords that route a step here at planning time.
    pub step_keywords: Vec<String>,
    /// Script substrings that select `environment` at execution time.
    pub script_markers: Vec<String>,
    pub environment: String,
    /// Prefix prepended to the step text for knowledge retrieval.
    pub retrieval_prefix: String,
    pub retrieval_k: usize,
    pub context_limit_chars: usize,
    pub snapshot_limit_chars: usize,
    pub errors: ErrorWindow,
    pub instructions: String,
}

impl Default for SpecialistConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            description: String::new(),
            step_keywords: Vec::new(),
            script_markers: Vec::new(),
            environment: "base".to_string(),
            retrieval_prefix: String::new(),
            retrieval_k: 3,
            context_limit_chars: 4000,
            snapshot_limit_chars: 2000,
            errors: ErrorWindow::All,
            instructions: String::new(),
        }
    }
}

impl SpecialistConfig {
    pub fn agent_id(&self) -> AgentId {
        AgentId::new(self.id.clone())
    }

    fn obitools() -> Self {
        Self {
            id: "obitools".to_string(),
            description: "OBITools3 expert: sequence import, pairing, merging, demultiplexing, \
                          filtering, dereplication."
                .to_string(),
            step_keywords: Vec::new(),
            script_markers: vec!["obi".to_string(), "OBITools".to_string()],
            environment: "obi3".to_string(),
            retrieval_prefix: "OBITools".to_string(),
            retrieval_k: 3,
            context_limit_chars: 4000,
            snapshot_limit_chars: 2000,
            errors: ErrorWindow::All,
            instructions: "Write shell or Python code for OBITools3. Parse map files to find \
                           sample names and barcodes, loop over samples for batch work, and take \
                           `obi grep` thresholds from the reference material. If an input file is \
                           missing, print an error and exit non-zero."
                .to_string(),
        }
    }

    fn qiime() -> Self {
        Self {
            id: "qiime".to_string(),
            description: "QIIME2 expert: import, denoising (DADA2), taxonomy, diversity analysis."
                .to_string(),
            step_keywords: vec![
                "qiime".to_string(),
                "dada2".to_string(),
                "diversity".to_string(),
            ],
            script_markers: vec!["qiime".to_string()],
            environment: "qiime2-amplicon-2024.2".to_string(),
            retrieval_prefix: "QIIME2".to_string(),
            retrieval_k: 2,
            context_limit_chars: 500,
            snapshot_limit_chars: 1000,
            errors: ErrorWindow::Last,
            instructions: "Output only executable bash. Manifest files are TAB separated: \
                           sample-id, absolute-filepath, direction. Sample ids must be unique; \
                           use full file names when needed."
                .to_string(),
        }
    }
}

impl Default for LabflowConfig {
    fn default() -> Self {
        Self {
            control: LoopConfig::default(),
            llm: LlmConfig::default(),
            executor: ExecutorConfig::default(),
            knowledge: KnowledgeConfig::default(),
            specialists: vec![SpecialistConfig::obitools(), SpecialistConfig::qiime()],
        }
    }
}

impl LabflowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.control.max_retries == 0 {
            return Err(anyhow!("loop.max_retries must be > 0"));
        }
        if self.control.step_budget == 0 {
            return Err(anyhow!("loop.step_budget must be > 0"));
        }
        if self.control.snapshot_limit_chars == 0 {
            return Err(anyhow!("loop.snapshot_limit_chars must be > 0"));
        }
        if self.llm.base_url.trim().is_empty() || self.llm.model.trim().is_empty() {
            return Err(anyhow!("llm.base_url and llm.model must be non-empty"));
        }
        if self.executor.poll_interval_ms == 0 {
            return Err(anyhow!("executor.poll_interval_ms must be > 0"));
        }
        if self.executor.progress_interval_secs == 0 {
            return Err(anyhow!("executor.progress_interval_secs must be > 0"));
        }
        if self.executor.output_limit_bytes == 0 {
            return Err(anyhow!("executor.output_limit_bytes must be > 0"));
        }
        if self.executor.kind == ExecutorKind::Ssh && self.executor.host.trim().is_empty() {
            return Err(anyhow!("executor.host must be set for the ssh executor"));
        }
        if self.specialists.len() < 2 {
            return Err(anyhow!("at least two specialists must be configured"));
        }
        let mut seen = HashSet::new();
        for specialist in &self.specialists {
            if specialist.id.trim().is_empty() {
                return Err(anyhow!("specialist id must be non-empty"));
            }
            if !seen.insert(specialist.id.to_lowercase()) {
                return Err(anyhow!("duplicate specialist id '{}'", specialist.id));
            }
            if specialist.environment.trim().is_empty() {
                return Err(anyhow!(
                    "specialist '{}' must name an environment",
                    specialist.id
                ));
            }
            if specialist.context_limit_chars == 0 || specialist.snapshot_limit_chars == 0 {
                return Err(anyhow!(
                    "specialist '{}' limits must be > 0",
                    specialist.id
                ));
            }
        }
        Ok(())
    }

    /// Routing rules in specialist order.
    pub fn routing_table(&self) -> Result<RoutingTable> {
        let rules = self
            .specialists
            .iter()
            .map(|specialist| RouteRule {
                agent: specialist.agent_id(),
                step_keywords: specialist.step_keywords.clone(),
                script_markers: specialist.script_markers.clone(),
                environment: specialist.environment.clone(),
            })
            .collect();
        RoutingTable::new(rules, self.executor.default_env.clone())
            .ok_or_else(|| anyhow!("no specialists configured"))
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LabflowConfig::default()`.
pub fn load_config(path: &Path) -> Result<LabflowConfig> {
    if !path.exists() {
        let cfg = LabflowConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LabflowConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &LabflowConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
