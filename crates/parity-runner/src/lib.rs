//! Runs a file under the source and target runtimes side by side and reports
//! whether the migrated program still behaves like the original.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod store;

pub use config::RunnerConfig;
pub use error::{CompareError, Runtime};
pub use orchestrator::{CompareOptions, CompareOutcome, CompareStatus, Orchestrator};
pub use store::{DirProjectStore, ProjectStore};
