//! Verifier configuration stored under `.verifier/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::hardener::HardenerSettings;
use crate::workflow::TestType;

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".verifier/config.toml";

/// Verifier configuration (TOML).
///
/// Meant to be edited by humans. Missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerifierConfig {
    /// Directory that receives one sub-directory per run.
    pub record_dir: PathBuf,

    /// Timeout for command steps without `timeout_seconds`.
    pub default_command_timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    pub ui_bridge: UiBridgeConfig,
    pub agent: AgentConfig,
    pub interpreters: InterpreterConfig,
    pub hardener: HardenerSettings,
}

/// How ui_bridge steps share the one browser the UI bridge drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// The deployment guarantees one workflow per browser; take no lock.
    Exclusive,
    /// Runs in this process take turns on the browser.
    Serialized,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UiBridgeConfig {
    /// Root of the UI bridge, e.g. `http://localhost:9876/ui-bridge`.
    pub base_url: String,
    /// Timeout for ui_bridge steps without `timeout_ms`.
    pub default_timeout_ms: u64,
    pub session: SessionMode,
}

impl Default for UiBridgeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9876/ui-bridge".to_string(),
            default_timeout_ms: 30_000,
            session: SessionMode::Serialized,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent argv; the rendered prompt is written to its stdin.
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: vec!["claude".to_string(), "-p".to_string()],
            timeout_secs: 600,
        }
    }
}

/// Interpreter argv per code-carrying `test_type`; the code goes to stdin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InterpreterConfig {
    pub python: Vec<String>,
    pub playwright: Vec<String>,
    pub qontinui_vision: Vec<String>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        let argv = |program: &str| vec![program.to_string(), "-".to_string()];
        Self {
            python: argv("python3"),
            playwright: argv("node"),
            qontinui_vision: argv("python3"),
        }
    }
}

impl InterpreterConfig {
    /// Interpreter for a code body; unknown or command-running test types
    /// fall back to python.
    pub fn argv_for(&self, test_type: Option<&TestType>) -> &[String] {
        match test_type {
            Some(TestType::Playwright) => &self.playwright,
            Some(TestType::QontinuiVision) => &self.qontinui_vision,
            _ => &self.python,
        }
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            record_dir: PathBuf::from(".verifier/runs"),
            default_command_timeout_secs: 600,
            output_limit_bytes: 100_000,
            ui_bridge: UiBridgeConfig::default(),
            agent: AgentConfig::default(),
            interpreters: InterpreterConfig::default(),
            hardener: HardenerSettings::default(),
        }
    }
}

fn require_argv(name: &str, argv: &[String]) -> Result<()> {
    if argv.first().is_none_or(|program| program.trim().is_empty()) {
        return Err(anyhow!("{name} must be a non-empty array"));
    }
    Ok(())
}

impl VerifierConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_command_timeout_secs == 0 {
            return Err(anyhow!("default_command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.ui_bridge.default_timeout_ms == 0 {
            return Err(anyhow!("ui_bridge.default_timeout_ms must be > 0"));
        }
        if self.ui_bridge.base_url.trim().is_empty() {
            return Err(anyhow!("ui_bridge.base_url must not be empty"));
        }
        if self.agent.timeout_secs == 0 {
            return Err(anyhow!("agent.timeout_secs must be > 0"));
        }
        require_argv("agent.command", &self.agent.command)?;
        require_argv("interpreters.python", &self.interpreters.python)?;
        require_argv("interpreters.playwright", &self.interpreters.playwright)?;
        require_argv("interpreters.qontinui_vision", &self.interpreters.qontinui_vision)?;
        if self.hardener.fallback_check.command.trim().is_empty() {
            return Err(anyhow!("hardener.fallback_check.command must not be empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `VerifierConfig::default()`.
pub fn load_config(path: &Path) -> Result<VerifierConfig> {
    if !path.exists() {
        let cfg = VerifierConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: VerifierConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &VerifierConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, VerifierConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".verifier").join("config.toml");
        let cfg = VerifierConfig::default();
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    /// Partial files only override what they name.
    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "output_limit_bytes = 2048\n\n[ui_bridge]\nsession = \"exclusive\"\n\n[hardener.python]\nlint = \"ruff check src\"\ntypecheck = \"mypy src\"\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.output_limit_bytes, 2048);
        assert_eq!(cfg.ui_bridge.session, SessionMode::Exclusive);
        assert_eq!(cfg.ui_bridge.default_timeout_ms, 30_000);
        assert_eq!(cfg.hardener.python.lint, "ruff check src");
        assert_eq!(cfg.hardener.rust, HardenerSettings::default().rust);
    }

    #[test]
    fn empty_agent_command_is_rejected() {
        let mut cfg = VerifierConfig::default();
        cfg.agent.command.clear();
        let err = cfg.validate().expect_err("invalid");
        assert!(err.to_string().contains("agent.command"));
    }

    #[test]
    fn interpreter_follows_test_type() {
        let interpreters = InterpreterConfig::default();
        assert_eq!(interpreters.argv_for(Some(&TestType::Playwright))[0], "node");
        assert_eq!(interpreters.argv_for(None)[0], "python3");
    }
}
