//! Default Environment Harness - checks the environment Cloud Foundry hands
//! to apps while staging, while running, and inside one-off tasks.
//!
//! The crate builds a buildpack that dumps its environment, drives the
//! platform CLI through the app lifecycle, reconstructs environment
//! snapshots from logs or HTTP responses, and validates them per context.

pub mod cli;
pub mod config;
pub mod error;
pub mod fixture;
pub mod http;
pub mod logs;
pub mod orchestrator;
pub mod poll;
pub mod scenario;
pub mod snapshot;
pub mod tasks;
pub mod validator;

pub use cli::{CfCli, CommandOutput, CommandRunner};
pub use config::{HarnessConfig, Validate, ValidationResult};
pub use error::{Error, Result};
pub use fixture::BuildpackFixture;
pub use http::{AppClient, HttpAppClient};
pub use logs::{
    extract_environment, extract_task, extract_windowed, window, Extraction, LogLine, SkipReason,
    SkippedLine, SourceTag, TaskOutputFilter, WindowMarkers,
};
pub use orchestrator::{LifecycleOrchestrator, PushOptions};
pub use poll::{eventually, wait_until, PollConfig, PollOutcome};
pub use scenario::{ScenarioContext, ScenarioKind, ScenarioResult, ScenarioRunner};
pub use snapshot::EnvironmentSnapshot;
pub use tasks::{TaskRecord, TaskState};
pub use validator::{EnvironmentValidator, ExecutionContext, ValidationReport};
