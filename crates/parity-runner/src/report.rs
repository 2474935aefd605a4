//! JSON documents written to stdout by the `parity-runner` binary.

use std::path::Path;

use parity_contracts::{
    PARITY_COMPARE_REPORT_SCHEMA_VERSION, PARITY_PROBE_REPORT_SCHEMA_VERSION,
    PARITY_RUN_REPORT_SCHEMA_VERSION,
};
use parity_sandbox::ExecutionResult;
use serde_json::{json, Value};

use crate::orchestrator::CompareOutcome;

pub fn compare_report(outcome: &CompareOutcome) -> Value {
    let r = &outcome.report;
    json!({
        "schema_version": PARITY_COMPARE_REPORT_SCHEMA_VERSION,
        "ok": true,
        "project_id": outcome.project_id,
        "file_path": outcome.file_path,
        "status": outcome.status,
        "outputs_match": r.outputs_match,
        "exit_codes_match": r.exit_codes_match,
        "similarity_pct": r.similarity_pct,
        "diff_lines": r.diff_lines,
        "warnings": r.warnings,
        "source": outcome.source,
        "target": outcome.target,
    })
}

pub fn run_report(interpreter: &Path, entry: &Path, result: &ExecutionResult) -> Value {
    json!({
        "schema_version": PARITY_RUN_REPORT_SCHEMA_VERSION,
        "ok": true,
        "interpreter": interpreter.display().to_string(),
        "entry_file": entry.display().to_string(),
        "result": result,
    })
}

pub fn probe_report(interpreter: &Path, available: bool) -> Value {
    json!({
        "schema_version": PARITY_PROBE_REPORT_SCHEMA_VERSION,
        "interpreter": interpreter.display().to_string(),
        "available": available,
    })
}

pub fn error_report(schema_version: &str, kind: &str, message: &str) -> Value {
    json!({
        "schema_version": schema_version,
        "ok": false,
        "error": {
            "kind": kind,
            "message": message,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_report_shape() {
        let v = error_report(
            PARITY_COMPARE_REPORT_SCHEMA_VERSION,
            "not_migrated",
            "main.py has not been transformed yet",
        );
        assert_eq!(v["ok"], false);
        assert_eq!(v["schema_version"], "parity.compare.report@0.1.0");
        assert_eq!(v["error"]["kind"], "not_migrated");
    }

    #[test]
    fn probe_report_shape() {
        let v = probe_report(Path::new("/usr/bin/python3"), true);
        assert_eq!(v["available"], true);
        assert_eq!(v["interpreter"], "/usr/bin/python3");
        assert_eq!(v["schema_version"], PARITY_PROBE_REPORT_SCHEMA_VERSION);
    }
}
