use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Runtime {
    Source,
    Target,
}

impl Runtime {
    pub fn as_str(self) -> &'static str {
        match self {
            Runtime::Source => "source",
            Runtime::Target => "target",
        }
    }

    pub(crate) fn dir_prefix(self) -> &'static str {
        match self {
            Runtime::Source => "parity_src",
            Runtime::Target => "parity_dst",
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons a comparison is refused before either program runs.
#[derive(Debug)]
pub enum CompareError {
    InvalidRequest { message: String },
    InvalidProjectId { project_id: String },
    ProjectNotFound { project_id: String },
    PathTraversal { file_path: PathBuf },
    FileNotFound { file_path: PathBuf },
    NotMigrated { file_path: PathBuf },
    InterpreterUnavailable { runtime: Runtime, interpreter: PathBuf },
    Store(anyhow::Error),
}

impl CompareError {
    pub fn kind(&self) -> &'static str {
        match self {
            CompareError::InvalidRequest { .. } => "invalid_request",
            CompareError::InvalidProjectId { .. } => "invalid_project_id",
            CompareError::ProjectNotFound { .. } => "project_not_found",
            CompareError::PathTraversal { .. } => "path_traversal",
            CompareError::FileNotFound { .. } => "file_not_found",
            CompareError::NotMigrated { .. } => "not_migrated",
            CompareError::InterpreterUnavailable { .. } => "interpreter_unavailable",
            CompareError::Store(_) => "store",
        }
    }
}

impl fmt::Display for CompareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareError::InvalidRequest { message } => write!(f, "invalid request: {message}"),
            CompareError::InvalidProjectId { project_id } => {
                write!(f, "invalid project id {project_id:?} (expected [A-Za-z0-9_-]{{1,64}})")
            }
            CompareError::ProjectNotFound { project_id } => {
                write!(f, "project not found: {project_id}")
            }
            CompareError::PathTraversal { file_path } => write!(
                f,
                "file path escapes the project root: {}",
                file_path.display()
            ),
            CompareError::FileNotFound { file_path } => {
                write!(f, "file not found in project source: {}", file_path.display())
            }
            CompareError::NotMigrated { file_path } => write!(
                f,
                "{} has not been transformed yet; migrate it before running a comparison",
                file_path.display()
            ),
            CompareError::InterpreterUnavailable {
                runtime,
                interpreter,
            } => write!(
                f,
                "{runtime} runtime not available: {} did not answer --version",
                interpreter.display()
            ),
            CompareError::Store(err) => write!(f, "project store: {err:#}"),
        }
    }
}

impl std::error::Error for CompareError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompareError::Store(err) => Some(&**err),
            _ => None,
        }
    }
}
