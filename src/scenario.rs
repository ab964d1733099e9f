//! End-to-end scenarios: staging, running app and task.
//!
//! Every scenario owns a [`ScenarioContext`] holding the names of the
//! resources it creates. Teardown runs after the scenario body whatever the
//! body's outcome, and its own failures are reported separately.

use std::fmt;
use std::path::PathBuf;

use crate::error::Result;
use crate::fixture::BuildpackFixture;
use crate::logs::{extract_task, extract_windowed, Extraction, SkippedLine, TaskOutputFilter};
use crate::orchestrator::{LifecycleOrchestrator, PushOptions};
use crate::snapshot::EnvironmentSnapshot;
use crate::validator::{EnvironmentValidator, ExecutionContext, ValidationReport};

/// Command run as the environment-dumping task.
pub const TASK_COMMAND: &str = "env";

/// Exit code of `cf start` when staging fails.
pub const STAGING_FAILED_EXIT_CODE: i32 = 1;

/// Builds `{prefix}-{kind}-{8 hex chars}`.
pub fn unique_name(prefix: &str, kind: &str) -> String {
    let short_uuid = &uuid::Uuid::new_v4().simple().to_string()[..8];
    format!("{}-{}-{}", prefix, kind, short_uuid)
}

/// Remote resources owned by one scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioContext {
    /// App pushed by the scenario.
    pub app_name: String,
    /// Buildpack the scenario created or attempted to create.
    pub buildpack_name: Option<String>,
    /// Name given to the task.
    pub task_name: String,
}

impl ScenarioContext {
    /// Creates a context with a fresh app name.
    pub fn new(prefix: &str, task_name: impl Into<String>) -> Self {
        Self {
            app_name: unique_name(prefix, "APP"),
            buildpack_name: None,
            task_name: task_name.into(),
        }
    }
}

/// Which scenario ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioKind {
    /// Environment seen by the buildpack while staging.
    Staging,
    /// Environment of a running instance and of a task.
    Running,
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioKind::Staging => f.write_str("staging"),
            ScenarioKind::Running => f.write_str("running-and-task"),
        }
    }
}

/// What a scenario observed.
#[derive(Debug, Default)]
struct Captures {
    snapshots: Vec<(ExecutionContext, EnvironmentSnapshot)>,
    validations: Vec<(ExecutionContext, ValidationReport)>,
    skipped_lines: Vec<SkippedLine>,
}

impl Captures {
    /// Stores the snapshot and its report, then fails fast on the first
    /// violated expectation.
    fn check(&mut self, context: ExecutionContext, snapshot: EnvironmentSnapshot) -> Result<()> {
        tracing::info!(
            context = context.as_str(),
            variables = snapshot.len(),
            "captured environment"
        );
        let report = EnvironmentValidator::report(&snapshot, context);
        let outcome = EnvironmentValidator::check_context(&snapshot, context);
        self.validations.push((context, report));
        self.snapshots.push((context, snapshot));
        outcome
    }

    fn check_extraction(&mut self, context: ExecutionContext, extraction: Extraction) -> Result<()> {
        if !extraction.skipped.is_empty() {
            tracing::warn!(
                context = context.as_str(),
                skipped = extraction.skipped.len(),
                "some log lines were not assignments"
            );
        }
        self.skipped_lines.extend(extraction.skipped);
        self.check(context, extraction.snapshot)
    }
}

/// Result of one scenario run.
#[derive(Debug)]
pub struct ScenarioResult {
    /// The scenario that ran.
    pub kind: ScenarioKind,
    /// Resources the scenario used.
    pub context: ScenarioContext,
    /// Overall pass/fail.
    pub passed: bool,
    /// Why the scenario did not run, if it was skipped.
    pub skip_reason: Option<String>,
    /// Error that aborted the scenario body.
    pub error: Option<String>,
    /// Captured snapshots per execution context.
    pub snapshots: Vec<(ExecutionContext, EnvironmentSnapshot)>,
    /// Validation reports per execution context.
    pub validations: Vec<(ExecutionContext, ValidationReport)>,
    /// Log lines skipped during extraction.
    pub skipped_lines: Vec<SkippedLine>,
    /// Failures while tearing down resources.
    pub teardown_errors: Vec<String>,
}

impl ScenarioResult {
    fn skipped(kind: ScenarioKind, context: ScenarioContext, reason: String) -> Self {
        Self {
            kind,
            context,
            passed: true,
            skip_reason: Some(reason),
            error: None,
            snapshots: Vec::new(),
            validations: Vec::new(),
            skipped_lines: Vec::new(),
            teardown_errors: Vec::new(),
        }
    }

    /// Returns the snapshot captured in `context`, if any.
    pub fn snapshot(&self, context: ExecutionContext) -> Option<&EnvironmentSnapshot> {
        self.snapshots
            .iter()
            .find(|(c, _)| *c == context)
            .map(|(_, snapshot)| snapshot)
    }
}

/// Runs scenarios against the platform.
pub struct ScenarioRunner {
    orchestrator: LifecycleOrchestrator,
    /// Where buildpack fixtures are written; the system temp dir if unset.
    fixture_dir: Option<PathBuf>,
}

impl ScenarioRunner {
    /// Creates a runner around an orchestrator.
    pub fn new(orchestrator: LifecycleOrchestrator) -> Self {
        Self {
            orchestrator,
            fixture_dir: None,
        }
    }

    /// Writes buildpack fixtures under `dir` instead of the system temp dir.
    pub fn with_fixture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fixture_dir = Some(dir.into());
        self
    }

    /// Runs every scenario in sequence.
    pub async fn run_all(&self) -> Vec<ScenarioResult> {
        vec![self.run_staging().await, self.run_running().await]
    }

    /// Runs the scenario of the given kind.
    pub async fn run(&self, kind: ScenarioKind) -> ScenarioResult {
        match kind {
            ScenarioKind::Staging => self.run_staging().await,
            ScenarioKind::Running => self.run_running().await,
        }
    }

    /// Captures the staging environment through a failing buildpack.
    pub async fn run_staging(&self) -> ScenarioResult {
        let config = self.orchestrator.config();
        let mut context = ScenarioContext::new(&config.name_prefix, config.task_name.clone());

        if !config.supports_staging_capture() {
            let reason = format!("staging capture is not supported on backend '{}'", config.backend);
            tracing::info!(%reason, "skipping staging scenario");
            return ScenarioResult::skipped(ScenarioKind::Staging, context, reason);
        }

        tracing::info!(app = %context.app_name, "running staging scenario");
        let mut captures = Captures::default();
        let outcome = self.staging_body(&mut context, &mut captures).await;
        let teardown_errors = self.teardown(&context).await;
        finish(ScenarioKind::Staging, context, captures, outcome, teardown_errors)
    }

    async fn staging_body(
        &self,
        context: &mut ScenarioContext,
        captures: &mut Captures,
    ) -> Result<()> {
        let config = self.orchestrator.config();
        let fixture = match &self.fixture_dir {
            Some(dir) => BuildpackFixture::create_in(dir)?,
            None => BuildpackFixture::create()?,
        };
        let markers = BuildpackFixture::markers();

        // Set before creation; teardown deletes it even if creation fails.
        let buildpack = unique_name(&config.name_prefix, "BPK");
        context.buildpack_name = Some(buildpack.clone());
        self.orchestrator
            .create_buildpack(&buildpack, fixture.archive_path())
            .await?;

        let push = PushOptions::from_config(config, &config.hello_world_asset, buildpack);
        self.orchestrator.push(&context.app_name, &push).await?;
        self.orchestrator
            .start(&context.app_name, STAGING_FAILED_EXIT_CODE)
            .await?;

        let logs = self
            .orchestrator
            .wait_for_logs_containing(&context.app_name, &markers.end)
            .await?;

        captures.check_extraction(ExecutionContext::Staging, extract_windowed(&logs, &markers))
    }

    /// Captures the environment of a running instance, then of a task.
    pub async fn run_running(&self) -> ScenarioResult {
        let config = self.orchestrator.config();
        let context = ScenarioContext::new(&config.name_prefix, config.task_name.clone());

        tracing::info!(app = %context.app_name, "running app and task scenario");
        let mut captures = Captures::default();
        let outcome = self.running_body(&context, &mut captures).await;
        let teardown_errors = self.teardown(&context).await;
        finish(ScenarioKind::Running, context, captures, outcome, teardown_errors)
    }

    async fn running_body(&self, context: &ScenarioContext, captures: &mut Captures) -> Result<()> {
        let config = self.orchestrator.config();
        let app = context.app_name.as_str();

        let push = PushOptions::from_config(config, &config.binary_asset, config.binary_buildpack.clone());
        self.orchestrator.push(app, &push).await?;
        self.orchestrator.start(app, 0).await?;

        let running = self.orchestrator.fetch_env(app).await?;
        captures.check(ExecutionContext::Running, running)?;

        self.orchestrator
            .run_task(app, TASK_COMMAND, &context.task_name)
            .await?;
        let record = self.orchestrator.wait_for_task(app, &context.task_name).await?;
        tracing::info!(task = %record.name, index = record.index, "task succeeded");

        let task_tag = format!("[APP/TASK/{}/", context.task_name);
        let logs = self
            .orchestrator
            .wait_for_logs_containing(app, &task_tag)
            .await?;
        let filter = TaskOutputFilter::new(context.task_name.as_str());

        captures.check_extraction(ExecutionContext::Task, extract_task(&logs, &filter))
    }

    /// Deletes everything `context` names. Never short-circuits.
    async fn teardown(&self, context: &ScenarioContext) -> Vec<String> {
        self.orchestrator.app_report(&context.app_name).await;

        let mut errors = Vec::new();
        if let Some(buildpack) = &context.buildpack_name {
            if let Err(e) = self.orchestrator.delete_buildpack(buildpack).await {
                tracing::warn!(buildpack = %buildpack, error = %e, "failed to delete buildpack");
                errors.push(format!("delete buildpack {}: {}", buildpack, e));
            }
        }
        if let Err(e) = self.orchestrator.delete_app(&context.app_name).await {
            tracing::warn!(app = %context.app_name, error = %e, "failed to delete app");
            errors.push(format!("delete app {}: {}", context.app_name, e));
        }
        errors
    }
}

fn finish(
    kind: ScenarioKind,
    context: ScenarioContext,
    captures: Captures,
    outcome: Result<()>,
    teardown_errors: Vec<String>,
) -> ScenarioResult {
    let error = outcome.err().map(|e| {
        tracing::error!(scenario = %kind, error = %e, "scenario failed");
        e.to_string()
    });
    let passed = error.is_none() && teardown_errors.is_empty();

    ScenarioResult {
        kind,
        context,
        passed,
        skip_reason: None,
        error,
        snapshots: captures.snapshots,
        validations: captures.validations,
        skipped_lines: captures.skipped_lines,
        teardown_errors,
    }
}
