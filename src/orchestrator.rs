//! Platform lifecycle operations with bounded completion waits.
//!
//! Each operation is issued exactly once. Waits re-evaluate a completion
//! predicate (process exit, log content, task state) through
//! [`crate::poll`], never the platform action itself.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::cli::{CommandOutput, CommandRunner};
use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::http::AppClient;
use crate::poll::wait_until;
use crate::snapshot::EnvironmentSnapshot;
use crate::tasks::{latest_named, parse_task_table, TaskRecord, TaskState};

/// Path served by the environment-echoing app.
pub const ENV_PATH: &str = "/env";

/// Arguments for `cf push`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOptions {
    /// App bits to upload.
    pub path: PathBuf,
    /// Buildpack to stage with.
    pub buildpack: String,
    /// Memory limit, e.g. `256M`.
    pub memory_limit: String,
    /// Domain for the default route.
    pub domain: Option<String>,
}

impl PushOptions {
    /// Push options using the configured memory limit and domain.
    pub fn from_config(
        config: &HarnessConfig,
        path: impl Into<PathBuf>,
        buildpack: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            buildpack: buildpack.into(),
            memory_limit: config.memory_limit.clone(),
            domain: config.apps_domain.clone(),
        }
    }
}

/// Drives the platform through the CLI and app routes.
pub struct LifecycleOrchestrator {
    runner: Box<dyn CommandRunner>,
    apps: Box<dyn AppClient>,
    config: HarnessConfig,
}

impl LifecycleOrchestrator {
    /// Creates an orchestrator.
    pub fn new(
        runner: Box<dyn CommandRunner>,
        apps: Box<dyn AppClient>,
        config: HarnessConfig,
    ) -> Self {
        Self {
            runner,
            apps,
            config,
        }
    }

    /// Returns the harness settings.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Issues `args` once and requires `expected_exit_code` within `timeout`.
    pub async fn run_operation(
        &self,
        args: &[&str],
        expected_exit_code: i32,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        let output = self.runner.run(&args, timeout).await?;

        if output.exit_code != Some(expected_exit_code) {
            return Err(Error::UnexpectedExit {
                command: args.join(" "),
                expected: expected_exit_code,
                actual: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Registers a buildpack from a local archive.
    pub async fn create_buildpack(&self, name: &str, archive: &Path) -> Result<()> {
        tracing::info!(buildpack = %name, "creating buildpack");
        let archive = archive.to_string_lossy();
        let position = self.config.buildpack_position.to_string();
        self.run_operation(
            &["create-buildpack", name, &*archive, position.as_str()],
            0,
            self.config.default_timeout(),
        )
        .await?;
        Ok(())
    }

    pub async fn delete_buildpack(&self, name: &str) -> Result<()> {
        tracing::info!(buildpack = %name, "deleting buildpack");
        self.run_operation(
            &["delete-buildpack", name, "-f"],
            0,
            self.config.default_timeout(),
        )
        .await?;
        Ok(())
    }

    /// Pushes app bits without starting the app.
    pub async fn push(&self, app: &str, options: &PushOptions) -> Result<()> {
        tracing::info!(app = %app, buildpack = %options.buildpack, "pushing app");
        let path = options.path.to_string_lossy();
        let mut args = vec![
            "push",
            app,
            "-p",
            &*path,
            "--no-start",
            "-b",
            options.buildpack.as_str(),
            "-m",
            options.memory_limit.as_str(),
        ];
        if let Some(domain) = &options.domain {
            args.extend(["-d", domain.as_str()]);
        }

        self.run_operation(&args, 0, self.config.default_timeout())
            .await?;
        Ok(())
    }

    /// Starts an app, which stages it first.
    ///
    /// Staging with the capturing buildpack fails by design, so callers pass
    /// the exit code they expect.
    pub async fn start(&self, app: &str, expected_exit_code: i32) -> Result<CommandOutput> {
        tracing::info!(app = %app, expected_exit_code, "starting app");
        self.run_operation(&["start", app], expected_exit_code, self.config.push_timeout())
            .await
    }

    /// Returns the app's recent log buffer.
    pub async fn recent_logs(&self, app: &str) -> Result<String> {
        let output = self
            .run_operation(&["logs", "--recent", app], 0, self.config.default_timeout())
            .await?;
        Ok(output.stdout)
    }

    /// Polls recent logs until they contain `sentinel` and returns them.
    pub async fn wait_for_logs_containing(&self, app: &str, sentinel: &str) -> Result<String> {
        let operation = format!("logs of {} to contain {}", app, sentinel);
        wait_until(
            self.config.poll(self.config.default_timeout()),
            &operation,
            || async move {
                let logs = self.recent_logs(app).await?;
                Ok::<_, Error>(logs.contains(sentinel).then_some(logs))
            },
        )
        .await
    }

    /// Starts a one-off task.
    pub async fn run_task(&self, app: &str, command: &str, name: &str) -> Result<()> {
        tracing::info!(app = %app, task = %name, "running task");
        self.run_operation(
            &["run-task", app, command, "--name", name],
            0,
            self.config.default_timeout(),
        )
        .await?;
        Ok(())
    }

    /// Lists the app's tasks.
    pub async fn list_tasks(&self, app: &str) -> Result<Vec<TaskRecord>> {
        let output = self
            .run_operation(&["tasks", app], 0, self.config.default_timeout())
            .await?;
        parse_task_table(&output.stdout)
    }

    /// Returns the latest run of the named task.
    pub async fn task_record(&self, app: &str, task: &str) -> Result<TaskRecord> {
        let records = self.list_tasks(app).await?;
        latest_named(&records, task)
            .cloned()
            .ok_or_else(|| Error::TaskNotFound {
                app: app.to_string(),
                task: task.to_string(),
            })
    }

    /// Returns the state of the latest run of the named task.
    pub async fn task_state(&self, app: &str, task: &str) -> Result<TaskState> {
        Ok(self.task_record(app, task).await?.state)
    }

    /// Polls until the task is terminal; a FAILED task is an error.
    pub async fn wait_for_task(&self, app: &str, task: &str) -> Result<TaskRecord> {
        let operation = format!("task {} of {} to finish", task, app);
        let last_state: Mutex<Option<TaskState>> = Mutex::new(None);
        let last_state = &last_state;

        let record = wait_until(
            self.config.poll(self.config.default_timeout()),
            &operation,
            || async move {
                let record = match self.task_record(app, task).await {
                    Ok(record) => record,
                    // The task list can lag behind run-task.
                    Err(Error::TaskNotFound { .. }) => return Ok(None),
                    Err(e) => return Err(e),
                };

                if let Ok(mut last) = last_state.lock() {
                    if let Some(previous) = *last {
                        if !previous.can_transition_to(record.state) {
                            tracing::warn!(
                                task = %task,
                                from = %previous,
                                to = %record.state,
                                "task state moved backwards"
                            );
                        }
                    }
                    *last = Some(record.state);
                }

                tracing::debug!(task = %task, state = %record.state, "polled task state");
                Ok::<_, Error>(record.state.is_terminal().then_some(record))
            },
        )
        .await?;

        if record.state == TaskState::Failed {
            return Err(Error::TaskFailed {
                app: app.to_string(),
                task: task.to_string(),
            });
        }
        Ok(record)
    }

    /// Fetches `/env` from a running app and decodes it.
    ///
    /// The request is repeated until it succeeds, since the route may not
    /// be registered the moment `start` returns.
    pub async fn fetch_env(&self, app: &str) -> Result<EnvironmentSnapshot> {
        let operation = format!("GET {} from {}", ENV_PATH, app);
        let body = wait_until(
            self.config.poll(self.config.default_timeout()),
            &operation,
            || async move {
                match self.apps.get(app, ENV_PATH).await {
                    Ok(body) => Ok(Some(body)),
                    Err(Error::Http(reason)) => {
                        tracing::debug!(app = %app, %reason, "app not reachable yet");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            },
        )
        .await?;

        EnvironmentSnapshot::from_json(&body)
    }

    /// Deletes an app and its routes.
    pub async fn delete_app(&self, app: &str) -> Result<()> {
        tracing::info!(app = %app, "deleting app");
        self.run_operation(&["delete", app, "-f", "-r"], 0, self.config.push_timeout())
            .await?;
        Ok(())
    }

    /// Logs app status and recent logs for diagnosis. Never fails.
    pub async fn app_report(&self, app: &str) {
        let timeout = self.config.default_timeout();
        for args in [vec!["app", app], vec!["logs", "--recent", app]] {
            match self.run_operation(&args, 0, timeout).await {
                Ok(output) => {
                    tracing::debug!(app = %app, command = %args.join(" "), output = %output.stdout, "app report")
                }
                Err(e) => {
                    tracing::debug!(app = %app, command = %args.join(" "), error = %e, "app report unavailable")
                }
            }
        }
    }
}
