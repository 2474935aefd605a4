use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    InterpreterUnavailable,
    Isolation,
    UnsafePath,
    Spawn,
    Limits,
    Io,
}

impl FaultKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FaultKind::InterpreterUnavailable => "interpreter_unavailable",
            FaultKind::Isolation => "isolation",
            FaultKind::UnsafePath => "unsafe_path",
            FaultKind::Spawn => "spawn",
            FaultKind::Limits => "limits",
            FaultKind::Io => "io",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable summary of a [`SandboxError`], attached to results that stand
/// in for a run that never started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxFault {
    pub kind: FaultKind,
    pub message: String,
}

/// Faults of the sandbox itself. Anything the guest program does (non-zero
/// exit, crash, timeout) is reported through `ExecutionResult` instead.
#[derive(Debug)]
pub enum SandboxError {
    InterpreterUnavailable {
        interpreter: PathBuf,
        source: std::io::Error,
    },
    Isolation {
        message: String,
    },
    UnsafePath {
        path: PathBuf,
    },
    Spawn {
        interpreter: PathBuf,
        source: std::io::Error,
    },
    LimitsUnsupported,
    Io {
        context: &'static str,
        source: std::io::Error,
    },
}

impl SandboxError {
    pub(crate) fn spawn(interpreter: &std::path::Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            SandboxError::InterpreterUnavailable {
                interpreter: interpreter.to_path_buf(),
                source,
            }
        } else {
            SandboxError::Spawn {
                interpreter: interpreter.to_path_buf(),
                source,
            }
        }
    }

    pub fn isolation(err: anyhow::Error) -> Self {
        SandboxError::Isolation {
            message: format!("{err:#}"),
        }
    }

    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        SandboxError::Io { context, source }
    }

    pub fn kind(&self) -> FaultKind {
        match self {
            SandboxError::InterpreterUnavailable { .. } => FaultKind::InterpreterUnavailable,
            SandboxError::Isolation { .. } => FaultKind::Isolation,
            SandboxError::UnsafePath { .. } => FaultKind::UnsafePath,
            SandboxError::Spawn { .. } => FaultKind::Spawn,
            SandboxError::LimitsUnsupported => FaultKind::Limits,
            SandboxError::Io { .. } => FaultKind::Io,
        }
    }

    pub fn fault(&self) -> SandboxFault {
        SandboxFault {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

impl fmt::Display for SandboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SandboxError::InterpreterUnavailable {
                interpreter,
                source,
            } => write!(
                f,
                "interpreter not invocable: {}: {source}",
                interpreter.display()
            ),
            SandboxError::Isolation { message } => {
                write!(f, "failed to prepare isolated working directory: {message}")
            }
            SandboxError::UnsafePath { path } => {
                write!(f, "expected safe relative path, got {}", path.display())
            }
            SandboxError::Spawn {
                interpreter,
                source,
            } => write!(f, "spawn {}: {source}", interpreter.display()),
            SandboxError::LimitsUnsupported => f.write_str(
                "refusing to run: CPU time limits are not available on this platform",
            ),
            SandboxError::Io { context, source } => write!(f, "{context}: {source}"),
        }
    }
}

impl std::error::Error for SandboxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SandboxError::InterpreterUnavailable { source, .. }
            | SandboxError::Spawn { source, .. }
            | SandboxError::Io { source, .. } => Some(source),
            SandboxError::Isolation { .. }
            | SandboxError::UnsafePath { .. }
            | SandboxError::LimitsUnsupported => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_not_found_is_interpreter_unavailable() {
        let err = SandboxError::spawn(
            std::path::Path::new("/nope/python9"),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert_eq!(err.kind(), FaultKind::InterpreterUnavailable);
        let fault = err.fault();
        assert!(fault.message.contains("/nope/python9"), "{}", fault.message);
    }

    #[test]
    fn spawn_other_errors_stay_spawn_faults() {
        let err = SandboxError::spawn(
            std::path::Path::new("/bin/sh"),
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert_eq!(err.kind(), FaultKind::Spawn);
    }

    #[test]
    fn io_fault_names_its_context() {
        let err = SandboxError::io(
            "wait for guest",
            std::io::Error::from(std::io::ErrorKind::Interrupted),
        );
        assert_eq!(err.kind(), FaultKind::Io);
        assert!(err.to_string().starts_with("wait for guest: "), "{err}");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn fault_kind_serializes_snake_case() {
        let v = serde_json::to_value(FaultKind::InterpreterUnavailable).unwrap();
        assert_eq!(v, serde_json::json!("interpreter_unavailable"));
        assert_eq!(FaultKind::Isolation.as_str(), "isolation");
    }
}
