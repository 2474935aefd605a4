//! Behavioral comparison of two sandboxed runs of the same program.
//!
//! Everything here is pure: the inputs are two finished
//! [`ExecutionResult`]s (or, for [`scan_pre_run`], source text) and nothing
//! touches the filesystem or spawns processes.

use std::borrow::Cow;

use parity_sandbox::ExecutionResult;
use serde::{Deserialize, Serialize};
use tracing::debug;

mod diff;
mod gaps;
mod heuristics;
mod prerun;

pub use diff::{similarity_pct, unified_diff_lines, CONTEXT_LINES, SOURCE_HEADER, TARGET_HEADER};
pub use gaps::{migration_gap_warnings, LegacyName, LEGACY_BUILTINS, LEGACY_METHODS, LEGACY_MODULES};
pub use heuristics::{
    DIVISION_WARNING, LONG_SUFFIX_WARNING, MAPPING_ORDER_WARNING, STRING_PREFIX_WARNING,
    TYPE_REPR_WARNING,
};
pub use prerun::scan_pre_run;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub outputs_match: bool,
    pub exit_codes_match: bool,
    pub diff_lines: Vec<String>,
    pub similarity_pct: f64,
    pub warnings: Vec<String>,
}

/// Compares a source-runtime result against a target-runtime result.
///
/// Only stdout decides `outputs_match`; stderr is consulted solely for
/// migration-gap fingerprints on the target side.
pub fn compare(source: &ExecutionResult, target: &ExecutionResult) -> ComparisonReport {
    let src = normalize(&source.stdout);
    let dst = normalize(&target.stdout);

    let outputs_match = src == dst;
    let exit_codes_match = source.exit_code == target.exit_code;
    let diff_lines = diff::unified_diff_lines(&src, &dst);
    let similarity_pct = diff::similarity_pct(&src, &dst);

    let changed = heuristics::ChangedLines::from_diff(&diff_lines);
    let mut warnings = heuristics::false_positive_warnings(&src, &dst, &changed);
    warnings.extend(gaps::migration_gap_warnings(&target.stderr));

    debug!(
        outputs_match,
        exit_codes_match,
        similarity_pct,
        warnings = warnings.len(),
        "compared runs"
    );

    ComparisonReport {
        outputs_match,
        exit_codes_match,
        diff_lines,
        similarity_pct,
        warnings,
    }
}

fn normalize(stdout: &str) -> Cow<'_, str> {
    if stdout.contains("\r\n") {
        Cow::Owned(stdout.replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(stdout: &str, stderr: &str, exit_code: Option<i32>) -> ExecutionResult {
        ExecutionResult {
            exit_code,
            exit_signal: None,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            truncated: false,
            timed_out: false,
            execution_time_ms: 1.0,
            memory_limit_enforced: true,
            fault: None,
        }
    }

    #[test]
    fn line_endings_are_normalized() {
        let a = result("a\r\nb\r\n", "", Some(0));
        let b = result("a\nb\n", "", Some(0));
        let report = compare(&a, &b);
        assert!(report.outputs_match);
        assert_eq!(report.similarity_pct, 100.0);
        assert!(report.diff_lines.is_empty());
    }

    #[test]
    fn trailing_whitespace_is_significant() {
        let report = compare(&result("a \n", "", Some(0)), &result("a\n", "", Some(0)));
        assert!(!report.outputs_match);
    }

    #[test]
    fn stderr_alone_does_not_break_match() {
        let report = compare(
            &result("ok\n", "DeprecationWarning: x\n", Some(0)),
            &result("ok\n", "", Some(0)),
        );
        assert!(report.outputs_match);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn exit_codes_compared_independently() {
        let report = compare(&result("", "", Some(0)), &result("", "", Some(1)));
        assert!(report.outputs_match);
        assert!(!report.exit_codes_match);
    }
}
