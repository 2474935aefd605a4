//! Runs one program under an interpreter in a disposable copy of its tree,
//! with a sanitized environment, kernel resource limits, and group-wide
//! teardown.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

mod capture;
mod env;
mod error;
#[cfg(unix)]
mod exec;
mod limits;
mod probe;
mod process_group;
mod workspace;

pub use capture::{decode_output, read_to_end_capped, CappedBuffer, StreamCapture};
pub use env::{
    is_valid_env_name, sanitized_env, sanitized_env_from, DEFAULT_MODULE_PATH_VAR, DEFAULT_PATH,
    ENV_ALLOW_LIST,
};
pub use error::{FaultKind, SandboxError, SandboxFault};
pub use limits::{ChildLimits, MEMORY_LIMIT_SUPPORTED};
pub use probe::{is_interpreter_available, is_interpreter_available_within, PROBE_TIMEOUT};
pub use process_group::{escalate, Escalation, ProcessGroup};
#[cfg(unix)]
pub use process_group::UnixProcessGroup;
pub use workspace::{ensure_safe_rel_path, ScopedDir};

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_MEMORY_LIMIT_MB: u64 = 256;
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub timeout_seconds: u64,
    pub memory_limit_mb: u64,
    pub max_output_bytes: usize,
    pub kill_grace: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }
}

/// Everything needed for one sandboxed run.
///
/// The request owns its working directory, so handing the request to [`run`]
/// guarantees the directory is gone by the time `run` returns.
#[derive(Debug)]
pub struct ExecutionRequest {
    pub entry_file: PathBuf,
    pub interpreter: PathBuf,
    pub workspace: ScopedDir,
    pub stdin_input: Option<String>,
    pub limits: ResourceLimits,
    pub module_path_var: Option<String>,
}

impl ExecutionRequest {
    pub fn new(
        interpreter: impl Into<PathBuf>,
        workspace: ScopedDir,
        entry_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            entry_file: entry_file.into(),
            interpreter: interpreter.into(),
            workspace,
            stdin_input: None,
            limits: ResourceLimits::default(),
            module_path_var: Some(DEFAULT_MODULE_PATH_VAR.to_string()),
        }
    }

    pub fn with_stdin(mut self, input: Option<String>) -> Self {
        self.stdin_input = input;
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_module_path_var(mut self, var: Option<String>) -> Self {
        self.module_path_var = var;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
    pub timed_out: bool,
    pub execution_time_ms: f64,
    pub memory_limit_enforced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<SandboxFault>,
}

impl ExecutionResult {
    /// Stand-in for a run that could not be started at all.
    pub fn from_fault(fault: SandboxFault) -> Self {
        Self {
            exit_code: None,
            exit_signal: None,
            stdout: String::new(),
            stderr: fault.message.clone(),
            truncated: false,
            timed_out: false,
            execution_time_ms: 0.0,
            memory_limit_enforced: false,
            fault: Some(fault),
        }
    }

    pub fn started(&self) -> bool {
        self.fault.is_none()
    }
}

/// Executes `request.interpreter request.entry_file` inside
/// `request.workspace`.
///
/// Guest failures (non-zero exit, crash, timeout) are `Ok` results. `Err` is
/// reserved for faults of the sandbox itself.
pub fn run(request: ExecutionRequest) -> Result<ExecutionResult, SandboxError> {
    #[cfg(unix)]
    {
        exec::run_request(request)
    }
    #[cfg(not(unix))]
    {
        drop(request);
        Err(SandboxError::LimitsUnsupported)
    }
}

pub(crate) fn round_ms(d: Duration) -> f64 {
    (d.as_secs_f64() * 100_000.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_limits() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.timeout_seconds, 30);
        assert_eq!(limits.memory_limit_mb, 256);
        assert_eq!(limits.max_output_bytes, 10_485_760);
        assert_eq!(limits.kill_grace, Duration::from_secs(2));
    }

    #[test]
    fn milliseconds_are_rounded_to_two_places() {
        assert_eq!(round_ms(Duration::from_micros(12_346)), 12.35);
        assert_eq!(round_ms(Duration::from_secs(1)), 1000.0);
        assert_eq!(round_ms(Duration::ZERO), 0.0);
    }

    #[test]
    fn fault_result_has_no_exit_code_and_carries_message() {
        let r = ExecutionResult::from_fault(SandboxFault {
            kind: FaultKind::Isolation,
            message: "disk full".to_string(),
        });
        assert_eq!(r.exit_code, None);
        assert!(!r.timed_out);
        assert!(!r.started());
        assert_eq!(r.stderr, "disk full");
    }

    #[test]
    fn result_json_omits_absent_fault() {
        let r = ExecutionResult {
            exit_code: Some(0),
            exit_signal: None,
            stdout: "hi\n".to_string(),
            stderr: String::new(),
            truncated: false,
            timed_out: false,
            execution_time_ms: 1.5,
            memory_limit_enforced: true,
            fault: None,
        };
        let v = serde_json::to_value(&r).expect("json");
        assert_eq!(v["exit_code"], 0);
        assert!(v.get("fault").is_none());
        assert!(v.get("exit_signal").is_none());
    }
}
