//! Scenario runner binary glue: configuration, scenario files, live
//! executors, and the per-scenario run loop. The engine itself lives in the
//! workspace crates.

pub mod config;
pub mod executors;
pub mod runner;
pub mod scenario;

pub use config::EngineConfig;
pub use executors::{BridgeBrowserExecutor, HttpApiExecutor, NoopBrowserExecutor};
pub use runner::{RunSummary, ScenarioReport, ScenarioRunner, ScenarioStatus};
