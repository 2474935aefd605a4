//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for the `schema_version`
//! strings that appear in every machine-readable document the parity tools
//! read or write. Bump the suffix whenever a field is removed or changes
//! meaning; adding optional fields does not require a bump.

pub const PARITY_RUN_REPORT_SCHEMA_VERSION: &str = "parity.run.report@0.1.0";
pub const PARITY_COMPARE_REPORT_SCHEMA_VERSION: &str = "parity.compare.report@0.1.0";
pub const PARITY_PROBE_REPORT_SCHEMA_VERSION: &str = "parity.probe.report@0.1.0";

pub const PARITY_CONFIG_SCHEMA_VERSION: &str = "parity.config@0.1.0";
