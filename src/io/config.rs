//! Worker configuration stored as TOML.
//!
//! The job request (`io/request`) describes one job; this file describes the
//! worker installation: which agent CLI to spawn, operation timeouts, and the
//! API bases for the deployment and pitch collaborators. The bases exist so
//! tests can point HTTP calls at a local receiver.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Worker configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to production
/// values matching the hosted worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Template directory materialized into the working tree before the
    /// agent starts. `None` skips materialization.
    pub template_dir: Option<PathBuf>,

    /// Timeout for `git push` in seconds.
    pub push_timeout_secs: u64,

    /// Timeout per callback POST in seconds.
    pub callback_timeout_secs: u64,

    /// Timeout for the deployment-creation POST in seconds.
    pub deploy_timeout_secs: u64,

    /// Timeout for the pitch-generation POST in seconds.
    pub pitch_timeout_secs: u64,

    /// Commit subjects keep this many characters of the step summary.
    pub commit_subject_chars: usize,

    /// Truncate captured git output beyond this many bytes.
    pub git_output_limit_bytes: usize,

    /// Base URL of the deployment API.
    pub deploy_api_base: String,

    /// Base URL of the pitch-generation API.
    pub pitch_api_base: String,

    /// Model id requested from the pitch-generation API.
    pub pitch_model: String,

    pub agent: AgentConfig,
}

/// Agent CLI invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Command to spawn for the agent (e.g. `["claude", "-p", ...]`). The
    /// task prompt is written to the process's stdin; the system prompt is
    /// appended as a `--system-prompt` argument.
    pub command: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "claude".to_string(),
                "-p".to_string(),
                "--output-format".to_string(),
                "stream-json".to_string(),
                "--verbose".to_string(),
                "--permission-mode".to_string(),
                "acceptEdits".to_string(),
                "--allowed-tools".to_string(),
                "Read Write Edit Bash Glob".to_string(),
            ],
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            template_dir: None,
            push_timeout_secs: 120,
            callback_timeout_secs: 10,
            deploy_timeout_secs: 30,
            pitch_timeout_secs: 15,
            commit_subject_chars: 72,
            git_output_limit_bytes: 100_000,
            deploy_api_base: "https://api.vercel.com".to_string(),
            pitch_api_base: "https://openrouter.ai/api".to_string(),
            pitch_model: "google/gemma-2-9b-it".to_string(),
            agent: AgentConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.push_timeout_secs == 0 {
            return Err(anyhow!("push_timeout_secs must be > 0"));
        }
        if self.callback_timeout_secs == 0 {
            return Err(anyhow!("callback_timeout_secs must be > 0"));
        }
        if self.commit_subject_chars == 0 {
            return Err(anyhow!("commit_subject_chars must be > 0"));
        }
        if self.git_output_limit_bytes == 0 {
            return Err(anyhow!("git_output_limit_bytes must be > 0"));
        }
        if self.agent.command.is_empty() || self.agent.command[0].trim().is_empty() {
            return Err(anyhow!("agent.command must be a non-empty array"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `WorkerConfig::default()`.
pub fn load_config(path: &Path) -> Result<WorkerConfig> {
    if !path.exists() {
        let cfg = WorkerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: WorkerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &WorkerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, &buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
