use std::path::{Path, PathBuf};

use parity_compare::{compare, scan_pre_run, ComparisonReport};
use parity_sandbox::{
    ensure_safe_rel_path, is_interpreter_available, run, ExecutionRequest, ExecutionResult,
    FaultKind, ResourceLimits, SandboxError, SandboxFault, ScopedDir,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RunnerConfig;
use crate::error::{CompareError, Runtime};
use crate::store::{is_safe_project_id, ProjectStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompareOptions {
    pub timeout_seconds: Option<u64>,
    pub stdin_input: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareStatus {
    Completed,
    SourceFailed,
    TargetFailed,
    BothFailed,
}

impl CompareStatus {
    fn from_results(source: &ExecutionResult, target: &ExecutionResult) -> Self {
        match (source.started(), target.started()) {
            (true, true) => CompareStatus::Completed,
            (false, true) => CompareStatus::SourceFailed,
            (true, false) => CompareStatus::TargetFailed,
            (false, false) => CompareStatus::BothFailed,
        }
    }
}

/// Both raw runs plus their comparison. The source-runtime run comes first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareOutcome {
    pub project_id: String,
    pub file_path: String,
    pub status: CompareStatus,
    pub source: ExecutionResult,
    pub target: ExecutionResult,
    pub report: ComparisonReport,
}

impl CompareOutcome {
    /// True when both sides ran and agree on stdout and exit code.
    pub fn is_match(&self) -> bool {
        self.status == CompareStatus::Completed
            && self.report.outputs_match
            && self.report.exit_codes_match
    }
}

pub struct Orchestrator<S> {
    config: RunnerConfig,
    store: S,
}

struct Side<'a> {
    runtime: Runtime,
    tree: &'a Path,
    interpreter: &'a Path,
}

impl<S: ProjectStore + Sync> Orchestrator<S> {
    pub fn new(config: RunnerConfig, store: S) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn compare(
        &self,
        project_id: &str,
        file_path: &str,
        options: &CompareOptions,
    ) -> Result<CompareOutcome, CompareError> {
        let timeout_seconds = self.timeout_for(options)?;

        if !is_safe_project_id(project_id) {
            return Err(CompareError::InvalidProjectId {
                project_id: project_id.to_string(),
            });
        }

        if file_path.is_empty() {
            return Err(CompareError::InvalidRequest {
                message: "file path is empty".to_string(),
            });
        }
        let rel = Path::new(file_path);
        if ensure_safe_rel_path(rel).is_err() {
            return Err(CompareError::PathTraversal {
                file_path: rel.to_path_buf(),
            });
        }

        let source_root = self
            .store
            .source_tree(project_id)
            .map_err(CompareError::Store)?
            .ok_or_else(|| CompareError::ProjectNotFound {
                project_id: project_id.to_string(),
            })?;
        let source_file = resolve_inside(&source_root, rel)?.ok_or_else(|| {
            CompareError::FileNotFound {
                file_path: rel.to_path_buf(),
            }
        })?;

        let not_migrated = || CompareError::NotMigrated {
            file_path: rel.to_path_buf(),
        };
        if !self
            .store
            .is_file_migrated(project_id, rel)
            .map_err(CompareError::Store)?
        {
            return Err(not_migrated());
        }
        let migrated_root = self
            .store
            .migrated_tree(project_id)
            .map_err(CompareError::Store)?
            .ok_or_else(not_migrated)?;
        resolve_inside(&migrated_root, rel)?.ok_or_else(not_migrated)?;

        for (runtime, interpreter) in [
            (Runtime::Source, &self.config.source_interpreter),
            (Runtime::Target, &self.config.target_interpreter),
        ] {
            if !is_interpreter_available(interpreter) {
                return Err(CompareError::InterpreterUnavailable {
                    runtime,
                    interpreter: interpreter.clone(),
                });
            }
        }

        let source_text = std::fs::read(&source_file).map_err(|err| {
            CompareError::Store(anyhow::Error::new(err).context(format!(
                "read source file: {}",
                source_file.display()
            )))
        })?;
        let pre_run = scan_pre_run(&String::from_utf8_lossy(&source_text));

        info!(project_id, file_path, timeout_seconds, "running comparison");
        let limits = self.config.limits(timeout_seconds);
        let source_side = Side {
            runtime: Runtime::Source,
            tree: &source_root,
            interpreter: &self.config.source_interpreter,
        };
        let target_side = Side {
            runtime: Runtime::Target,
            tree: &migrated_root,
            interpreter: &self.config.target_interpreter,
        };
        let (source, target) = std::thread::scope(|s| {
            let src = s.spawn(|| self.run_side(&source_side, rel, limits, options));
            let dst = s.spawn(|| self.run_side(&target_side, rel, limits, options));
            (
                join_side(src, Runtime::Source),
                join_side(dst, Runtime::Target),
            )
        });

        let status = CompareStatus::from_results(&source, &target);
        let mut report = compare(&source, &target);
        report.warnings = merge_warnings(pre_run, report.warnings, &source, &target);
        debug!(?status, outputs_match = report.outputs_match, "comparison finished");

        Ok(CompareOutcome {
            project_id: project_id.to_string(),
            file_path: file_path.to_string(),
            status,
            source,
            target,
            report,
        })
    }

    fn timeout_for(&self, options: &CompareOptions) -> Result<u64, CompareError> {
        let timeout = options
            .timeout_seconds
            .unwrap_or(self.config.timeout_seconds);
        if timeout == 0 || timeout > self.config.max_timeout_seconds {
            return Err(CompareError::InvalidRequest {
                message: format!(
                    "timeout_seconds must be between 1 and {}, got {timeout}",
                    self.config.max_timeout_seconds
                ),
            });
        }
        Ok(timeout)
    }

    fn run_side(
        &self,
        side: &Side<'_>,
        entry: &Path,
        limits: ResourceLimits,
        options: &CompareOptions,
    ) -> ExecutionResult {
        let scratch = self.config.scratch_dir();
        let prefix = side.runtime.dir_prefix();
        let workspace = match ScopedDir::seeded_from_in(&scratch, side.tree, prefix) {
            Ok(dir) => dir,
            Err(err) => {
                let err = SandboxError::isolation(err);
                warn!(runtime = %side.runtime, %err, "could not prepare working copy");
                return ExecutionResult::from_fault(err.fault());
            }
        };

        let request = ExecutionRequest::new(side.interpreter, workspace, entry)
            .with_stdin(options.stdin_input.clone())
            .with_limits(limits)
            .with_module_path_var(self.config.module_path_var().map(str::to_string));

        match run(request) {
            Ok(result) => result,
            Err(err) => {
                warn!(runtime = %side.runtime, %err, "sandbox fault");
                ExecutionResult::from_fault(err.fault())
            }
        }
    }
}

fn join_side(
    handle: std::thread::ScopedJoinHandle<'_, ExecutionResult>,
    runtime: Runtime,
) -> ExecutionResult {
    handle.join().unwrap_or_else(|_| {
        ExecutionResult::from_fault(SandboxFault {
            kind: FaultKind::Io,
            message: format!("{runtime} run panicked"),
        })
    })
}

/// Canonical path of `rel` under `root`, `None` when it does not name a
/// regular file. Symlinks that lead outside `root` are traversal. Symlinks
/// that stay inside also yield `None`: working copies do not carry links, so
/// the guest would not find the entry.
fn resolve_inside(root: &Path, rel: &Path) -> Result<Option<PathBuf>, CompareError> {
    let root = std::fs::canonicalize(root).map_err(|err| {
        CompareError::Store(
            anyhow::Error::new(err).context(format!("resolve project tree: {}", root.display())),
        )
    })?;
    let candidate = match std::fs::canonicalize(root.join(rel)) {
        Ok(path) => path,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(CompareError::Store(
                anyhow::Error::new(err).context(format!("resolve {}", rel.display())),
            ))
        }
    };
    if !candidate.starts_with(&root) {
        return Err(CompareError::PathTraversal {
            file_path: rel.to_path_buf(),
        });
    }
    if candidate != root.join(rel) {
        debug!(path = %rel.display(), "entry is reached through a symlink");
        return Ok(None);
    }
    Ok(candidate.is_file().then_some(candidate))
}

fn merge_warnings(
    pre_run: Vec<String>,
    comparator: Vec<String>,
    source: &ExecutionResult,
    target: &ExecutionResult,
) -> Vec<String> {
    let mut warnings = pre_run;
    warnings.extend(comparator);
    for (runtime, result) in [(Runtime::Source, source), (Runtime::Target, target)] {
        if let Some(fault) = &result.fault {
            warnings.push(format!(
                "The {runtime} runtime could not run ({}): {}",
                fault.kind, fault.message
            ));
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_result() -> ExecutionResult {
        ExecutionResult {
            exit_code: Some(0),
            exit_signal: None,
            stdout: String::new(),
            stderr: String::new(),
            truncated: false,
            timed_out: false,
            execution_time_ms: 1.0,
            memory_limit_enforced: true,
            fault: None,
        }
    }

    fn failed() -> ExecutionResult {
        ExecutionResult::from_fault(SandboxFault {
            kind: FaultKind::Isolation,
            message: "copy failed".to_string(),
        })
    }

    #[test]
    fn status_reflects_which_side_failed_to_start() {
        assert_eq!(
            CompareStatus::from_results(&ok_result(), &ok_result()),
            CompareStatus::Completed
        );
        assert_eq!(
            CompareStatus::from_results(&failed(), &ok_result()),
            CompareStatus::SourceFailed
        );
        assert_eq!(
            CompareStatus::from_results(&ok_result(), &failed()),
            CompareStatus::TargetFailed
        );
        assert_eq!(
            CompareStatus::from_results(&failed(), &failed()),
            CompareStatus::BothFailed
        );
    }

    #[test]
    fn timed_out_run_still_counts_as_started() {
        let mut r = ok_result();
        r.exit_code = None;
        r.timed_out = true;
        assert_eq!(
            CompareStatus::from_results(&r, &ok_result()),
            CompareStatus::Completed
        );
    }

    #[test]
    fn warnings_are_pre_run_then_comparator_then_faults() {
        let merged = merge_warnings(
            vec!["pre".to_string()],
            vec!["cmp".to_string()],
            &ok_result(),
            &failed(),
        );
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0], "pre");
        assert_eq!(merged[1], "cmp");
        assert!(merged[2].starts_with("The target runtime could not run (isolation)"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_root_is_traversal() {
        let outside = tempfile::tempdir().expect("tempdir");
        std::fs::write(outside.path().join("secret.py"), "x").expect("write");
        let root = tempfile::tempdir().expect("tempdir");
        std::os::unix::fs::symlink(outside.path().join("secret.py"), root.path().join("a.py"))
            .expect("symlink");

        let err = resolve_inside(root.path(), Path::new("a.py")).expect_err("escape");
        assert_eq!(err.kind(), "path_traversal");
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_entry_inside_root_is_not_an_entry_file() {
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::write(root.path().join("real.py"), "x").expect("write");
        std::fs::create_dir(root.path().join("pkg")).expect("mkdir");
        std::fs::write(root.path().join("pkg/mod.py"), "x").expect("write");
        std::os::unix::fs::symlink("real.py", root.path().join("alias.py")).expect("symlink");
        std::os::unix::fs::symlink("pkg", root.path().join("linkdir")).expect("symlink");

        for rel in ["alias.py", "linkdir/mod.py"] {
            assert!(
                resolve_inside(root.path(), Path::new(rel))
                    .expect("resolve")
                    .is_none(),
                "{rel}"
            );
        }
        assert!(resolve_inside(root.path(), Path::new("pkg/mod.py"))
            .expect("resolve")
            .is_some());
    }

    #[test]
    fn directories_are_not_entry_files() {
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(root.path().join("pkg")).expect("mkdir");
        assert!(resolve_inside(root.path(), Path::new("pkg"))
            .expect("resolve")
            .is_none());
        assert!(resolve_inside(root.path(), Path::new("nope.py"))
            .expect("resolve")
            .is_none());
    }
}
