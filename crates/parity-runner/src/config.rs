use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use parity_contracts::PARITY_CONFIG_SCHEMA_VERSION;
use parity_sandbox::{is_valid_env_name, ResourceLimits, DEFAULT_MODULE_PATH_VAR};
use serde::{Deserialize, Serialize};

pub const ENV_PROJECTS_DIR: &str = "PARITY_PROJECTS_DIR";
pub const ENV_SOURCE_INTERPRETER: &str = "PARITY_SOURCE_INTERPRETER";
pub const ENV_TARGET_INTERPRETER: &str = "PARITY_TARGET_INTERPRETER";
pub const ENV_TIMEOUT_SECONDS: &str = "PARITY_TIMEOUT_SECONDS";
pub const ENV_MAX_TIMEOUT_SECONDS: &str = "PARITY_MAX_TIMEOUT_SECONDS";
pub const ENV_MEMORY_LIMIT_MB: &str = "PARITY_MEMORY_LIMIT_MB";
pub const ENV_MAX_OUTPUT_BYTES: &str = "PARITY_MAX_OUTPUT_BYTES";
pub const ENV_KILL_GRACE_MS: &str = "PARITY_KILL_GRACE_MS";
pub const ENV_MODULE_PATH_VAR: &str = "PARITY_MODULE_PATH_VAR";
pub const ENV_SCRATCH_DIR: &str = "PARITY_SCRATCH_DIR";

/// Runner settings, layered as defaults, then an optional JSON file, then
/// `PARITY_*` environment variables, then command-line flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    pub projects_dir: PathBuf,
    pub source_interpreter: PathBuf,
    pub target_interpreter: PathBuf,
    pub timeout_seconds: u64,
    pub max_timeout_seconds: u64,
    pub memory_limit_mb: u64,
    pub max_output_bytes: usize,
    pub kill_grace_ms: u64,
    /// Empty disables setting a module search path for guests.
    pub module_path_var: String,
    /// Parent of the per-run working copies; the system temp dir when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let limits = ResourceLimits::default();
        Self {
            schema_version: None,
            projects_dir: std::env::temp_dir().join("parity_projects"),
            source_interpreter: PathBuf::from("python2"),
            target_interpreter: PathBuf::from("python3"),
            timeout_seconds: limits.timeout_seconds,
            max_timeout_seconds: 300,
            memory_limit_mb: limits.memory_limit_mb,
            max_output_bytes: limits.max_output_bytes,
            kill_grace_ms: limits.kill_grace.as_millis() as u64,
            module_path_var: DEFAULT_MODULE_PATH_VAR.to_string(),
            scratch_dir: None,
        }
    }
}

impl RunnerConfig {
    /// Defaults, overlaid with `path` when given, overlaid with the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        cfg.apply_env_with(|name| std::env::var(name).ok())?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let txt = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        let cfg: RunnerConfig = serde_json::from_str(&txt)
            .with_context(|| format!("parse config JSON: {}", path.display()))?;
        if let Some(v) = &cfg.schema_version {
            if v != PARITY_CONFIG_SCHEMA_VERSION {
                anyhow::bail!(
                    "config schema_version mismatch in {}: expected {PARITY_CONFIG_SCHEMA_VERSION} got {v:?}",
                    path.display()
                );
            }
        }
        Ok(cfg)
    }

    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_PROJECTS_DIR).filter(|v| !v.is_empty()) {
            self.projects_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_SOURCE_INTERPRETER).filter(|v| !v.is_empty()) {
            self.source_interpreter = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_TARGET_INTERPRETER).filter(|v| !v.is_empty()) {
            self.target_interpreter = PathBuf::from(v);
        }
        if let Some(v) = env_parse(&lookup, ENV_TIMEOUT_SECONDS)? {
            self.timeout_seconds = v;
        }
        if let Some(v) = env_parse(&lookup, ENV_MAX_TIMEOUT_SECONDS)? {
            self.max_timeout_seconds = v;
        }
        if let Some(v) = env_parse(&lookup, ENV_MEMORY_LIMIT_MB)? {
            self.memory_limit_mb = v;
        }
        if let Some(v) = env_parse(&lookup, ENV_MAX_OUTPUT_BYTES)? {
            self.max_output_bytes = v;
        }
        if let Some(v) = env_parse(&lookup, ENV_KILL_GRACE_MS)? {
            self.kill_grace_ms = v;
        }
        if let Some(v) = lookup(ENV_MODULE_PATH_VAR) {
            self.module_path_var = v;
        }
        if let Some(v) = lookup(ENV_SCRATCH_DIR).filter(|v| !v.is_empty()) {
            self.scratch_dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_seconds == 0 {
            anyhow::bail!("timeout_seconds must be >= 1");
        }
        if self.max_timeout_seconds == 0 {
            anyhow::bail!("max_timeout_seconds must be >= 1");
        }
        if self.timeout_seconds > self.max_timeout_seconds {
            anyhow::bail!(
                "timeout_seconds ({}) exceeds max_timeout_seconds ({})",
                self.timeout_seconds,
                self.max_timeout_seconds
            );
        }
        if self.memory_limit_mb == 0 {
            anyhow::bail!("memory_limit_mb must be >= 1");
        }
        if self.max_output_bytes == 0 {
            anyhow::bail!("max_output_bytes must be >= 1");
        }
        if self.kill_grace_ms == 0 {
            anyhow::bail!("kill_grace_ms must be >= 1");
        }
        if self.source_interpreter.as_os_str().is_empty()
            || self.target_interpreter.as_os_str().is_empty()
        {
            anyhow::bail!("source_interpreter and target_interpreter must be set");
        }
        if !self.module_path_var.is_empty() && !is_valid_env_name(&self.module_path_var) {
            anyhow::bail!(
                "module_path_var is not a valid environment variable name: {:?}",
                self.module_path_var
            );
        }
        Ok(())
    }

    pub fn module_path_var(&self) -> Option<&str> {
        (!self.module_path_var.is_empty()).then_some(self.module_path_var.as_str())
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn limits(&self, timeout_seconds: u64) -> ResourceLimits {
        ResourceLimits {
            timeout_seconds,
            memory_limit_mb: self.memory_limit_mb,
            max_output_bytes: self.max_output_bytes,
            kill_grace: Duration::from_millis(self.kill_grace_ms),
        }
    }
}

fn env_parse<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>()
        .map(Some)
        .map_err(|err| anyhow::anyhow!("invalid {name}={raw:?}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = RunnerConfig::default();
        cfg.validate().expect("valid defaults");
        assert_eq!(cfg.timeout_seconds, 30);
        assert_eq!(cfg.max_output_bytes, 10_485_760);
        assert_eq!(cfg.kill_grace_ms, 2000);
        assert_eq!(cfg.module_path_var(), Some("PYTHONPATH"));
        assert_eq!(cfg.scratch_dir(), std::env::temp_dir());
    }

    #[test]
    fn env_overrides_defaults() {
        let mut cfg = RunnerConfig::default();
        cfg.apply_env_with(lookup(&[
            (ENV_TARGET_INTERPRETER, "/opt/py/bin/python3.12"),
            (ENV_TIMEOUT_SECONDS, "5"),
            (ENV_MODULE_PATH_VAR, ""),
            (ENV_SCRATCH_DIR, "/srv/parity/scratch"),
        ]))
        .expect("apply env");
        assert_eq!(cfg.scratch_dir(), PathBuf::from("/srv/parity/scratch"));
        assert_eq!(cfg.target_interpreter, PathBuf::from("/opt/py/bin/python3.12"));
        assert_eq!(cfg.timeout_seconds, 5);
        assert_eq!(cfg.module_path_var(), None);
        assert_eq!(cfg.source_interpreter, PathBuf::from("python2"));
    }

    #[test]
    fn invalid_numbers_name_the_variable() {
        let mut cfg = RunnerConfig::default();
        let err = cfg
            .apply_env_with(lookup(&[(ENV_MEMORY_LIMIT_MB, "lots")]))
            .expect_err("bad number");
        assert!(err.to_string().contains(ENV_MEMORY_LIMIT_MB), "{err}");
    }

    #[test]
    fn validate_rejects_bad_limits() {
        let mut cfg = RunnerConfig {
            timeout_seconds: 0,
            ..RunnerConfig::default()
        };
        assert!(cfg.validate().is_err());

        cfg.timeout_seconds = 301;
        assert!(cfg.validate().is_err());

        cfg.timeout_seconds = 10;
        cfg.module_path_var = "NOT VALID".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_file_is_partial_and_strict() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("parity.json");
        std::fs::write(
            &path,
            r#"{"schema_version":"parity.config@0.1.0","timeout_seconds":7}"#,
        )
        .expect("write");
        let cfg = RunnerConfig::from_file(&path).expect("load");
        assert_eq!(cfg.timeout_seconds, 7);
        assert_eq!(cfg.memory_limit_mb, 256);

        std::fs::write(&path, r#"{"timeout":7}"#).expect("write");
        assert!(RunnerConfig::from_file(&path).is_err());

        std::fs::write(&path, r#"{"schema_version":"parity.config@9"}"#).expect("write");
        let err = RunnerConfig::from_file(&path).expect_err("schema mismatch");
        assert!(format!("{err:#}").contains("schema_version mismatch"));
    }
}
