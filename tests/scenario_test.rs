//! Scenario tests against a scripted platform.
//!
//! The CLI and app route are replaced by in-memory fakes that answer by
//! subcommand, so the full lifecycle runs without a platform.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use default_env_harness::{
    AppClient, CommandOutput, CommandRunner, Error, ExecutionContext, HarnessConfig,
    LifecycleOrchestrator, Result, ScenarioRunner, TaskState,
};

/// Answers CLI invocations from per-subcommand queues.
///
/// The last queued answer for a subcommand keeps being returned once the
/// queue is down to one entry. Unscripted subcommands succeed silently.
#[derive(Clone, Default)]
struct ScriptedCli {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    responses: Arc<Mutex<HashMap<String, VecDeque<CommandOutput>>>>,
    hung: Arc<Mutex<Vec<String>>>,
}

impl ScriptedCli {
    fn respond(self, subcommand: &str, output: CommandOutput) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(subcommand.to_string())
            .or_default()
            .push_back(output);
        self
    }

    /// Makes every invocation of `subcommand` hit its deadline.
    fn hang(self, subcommand: &str) -> Self {
        self.hung.lock().unwrap().push(subcommand.to_string());
        self
    }

    fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    fn subcommands(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call[0].clone()).collect()
    }

    fn call(&self, subcommand: &str) -> Option<Vec<String>> {
        self.calls().into_iter().find(|call| call[0] == subcommand)
    }
}

#[async_trait]
impl CommandRunner for ScriptedCli {
    async fn run(&self, args: &[String], timeout: Duration) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(args.to_vec());

        if self.hung.lock().unwrap().contains(&args[0]) {
            return Err(Error::Timeout {
                operation: format!("cf {}", args.join(" ")),
                elapsed: timeout,
            });
        }

        let mut responses = self.responses.lock().unwrap();
        let output = match responses.get_mut(&args[0]) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => CommandOutput::new(0, ""),
        };
        Ok(output)
    }
}

/// Serves `/env` bodies from a queue; the last entry repeats.
#[derive(Clone, Default)]
struct FakeApps {
    requests: Arc<Mutex<Vec<String>>>,
    bodies: Arc<Mutex<VecDeque<std::result::Result<String, String>>>>,
}

impl FakeApps {
    fn unavailable(self, reason: &str) -> Self {
        self.bodies.lock().unwrap().push_back(Err(reason.to_string()));
        self
    }

    fn serving(self, body: &str) -> Self {
        self.bodies.lock().unwrap().push_back(Ok(body.to_string()));
        self
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl AppClient for FakeApps {
    async fn get(&self, app_name: &str, path: &str) -> Result<String> {
        self.requests
            .lock()
            .unwrap()
            .push(format!("{}{}", app_name, path));

        let mut bodies = self.bodies.lock().unwrap();
        let next = if bodies.len() > 1 {
            bodies.pop_front()
        } else {
            bodies.front().cloned()
        };
        match next {
            Some(Ok(body)) => Ok(body),
            Some(Err(reason)) => Err(Error::Http(reason)),
            None => Err(Error::Http("404 Not Found".to_string())),
        }
    }
}

fn test_config() -> HarnessConfig {
    HarnessConfig {
        apps_domain: Some("apps.example.com".to_string()),
        default_timeout_secs: 5,
        push_timeout_secs: 10,
        poll_interval_ms: 10,
        ..HarnessConfig::default()
    }
}

fn runner(cli: &ScriptedCli, apps: &FakeApps, config: HarnessConfig) -> ScenarioRunner {
    ScenarioRunner::new(orchestrator(cli, apps, config))
}

fn orchestrator(cli: &ScriptedCli, apps: &FakeApps, config: HarnessConfig) -> LifecycleOrchestrator {
    LifecycleOrchestrator::new(Box::new(cli.clone()), Box::new(apps.clone()), config)
}

fn exit(code: i32) -> CommandOutput {
    CommandOutput::new(code, "")
}

const STAGING_LOGS: &str = "\
Retrieving logs for app ENV-APP-1234abcd in org acceptance / space env as admin...

   2024-05-01T10:00:00.00+0000 [API/0] OUT Updated app with guid 1234
   2024-05-01T10:00:01.00+0000 [STG/0] OUT Downloading buildpacks...
   2024-05-01T10:00:06.00+0000 [STG/0] OUT START_ENV_CMD
   2024-05-01T10:00:06.01+0000 [STG/0] OUT CF_INSTANCE_ADDR=
   2024-05-01T10:00:06.01+0000 [STG/0] OUT CF_INSTANCE_INTERNAL_IP=10.255.0.7
   2024-05-01T10:00:06.01+0000 [STG/0] OUT CF_INSTANCE_IP=10.0.16.5
   2024-05-01T10:00:06.01+0000 [STG/0] OUT CF_INSTANCE_PORT=
   2024-05-01T10:00:06.01+0000 [STG/0] OUT CF_INSTANCE_PORTS=[]
   2024-05-01T10:00:06.02+0000 [STG/0] OUT CF_STACK=cflinuxfs3
   2024-05-01T10:00:06.02+0000 [STG/0] OUT LANG=en_US.UTF-8
   2024-05-01T10:00:06.02+0000 [STG/0] OUT VCAP_APPLICATION={\"application_name\":\"ENV-APP-1234abcd\",\"limits\":{\"mem\":256}}
   2024-05-01T10:00:06.02+0000 [STG/0] OUT VCAP_SERVICES={}
   2024-05-01T10:00:06.03+0000 [STG/0] OUT END_ENV_CMD
   2024-05-01T10:00:06.04+0000 [STG/0] ERR Failed to compile droplet: exit status 1
";

const RUNNING_ENV: &str = r#"{
  "CF_INSTANCE_ADDR": "10.0.16.5:61001",
  "CF_INSTANCE_GUID": "8b0d9a0e-7c1f-4b57-6a3d-21f0",
  "CF_INSTANCE_INDEX": "0",
  "CF_INSTANCE_INTERNAL_IP": "10.255.0.7",
  "CF_INSTANCE_IP": "10.0.16.5",
  "CF_INSTANCE_PORT": "61001",
  "CF_INSTANCE_PORTS": "[{\"external\":61001,\"internal\":8080}]",
  "LANG": "en_US.UTF-8",
  "VCAP_APPLICATION": "{\"application_name\":\"ENV-APP-1234abcd\"}",
  "VCAP_APP_HOST": "0.0.0.0",
  "VCAP_APP_PORT": "8080",
  "VCAP_SERVICES": "{}"
}"#;

const TASK_LOGS: &str = "\
Retrieving logs for app ENV-APP-1234abcd in org acceptance / space env as admin...

   2024-05-01T10:01:00.00+0000 [APP/PROC/WEB/0] OUT LANG=C
   2024-05-01T10:01:02.00+0000 [CELL/0] OUT Creating container for task
   2024-05-01T10:01:03.00+0000 [APP/TASK/get-env/0] OUT CF_INSTANCE_ADDR=
   2024-05-01T10:01:03.00+0000 [APP/TASK/get-env/0] OUT CF_INSTANCE_INTERNAL_IP=10.255.0.9
   2024-05-01T10:01:03.00+0000 [APP/TASK/get-env/0] OUT CF_INSTANCE_IP=10.0.16.5
   2024-05-01T10:01:03.00+0000 [APP/TASK/get-env/0] OUT CF_INSTANCE_PORT=
   2024-05-01T10:01:03.00+0000 [APP/TASK/get-env/0] OUT CF_INSTANCE_PORTS=[]
   2024-05-01T10:01:03.00+0000 [APP/TASK/get-env/0] OUT LANG=en_US.UTF-8
   2024-05-01T10:01:03.00+0000 [APP/TASK/get-env/0] OUT VCAP_APPLICATION={\"application_name\":\"ENV-APP-1234abcd\"}
   2024-05-01T10:01:03.00+0000 [APP/TASK/get-env/0] OUT VCAP_SERVICES={}
   2024-05-01T10:01:04.00+0000 [APP/TASK/get-env/0] OUT Exit status 0
";

fn task_table(state: Option<&str>) -> CommandOutput {
    let mut table = String::from(
        "Getting tasks for app ENV-APP-1234abcd in org acceptance / space env as admin...\nOK\n\n\
         id   name      state       start time                      command\n",
    );
    if let Some(state) = state {
        table.push_str(&format!(
            "1    get-env   {}   Wed, 01 May 2024 10:01:00 UTC   env\n",
            state
        ));
    }
    CommandOutput::new(0, table)
}

fn staging_cli() -> ScriptedCli {
    ScriptedCli::default()
        .respond("start", exit(1))
        .respond("logs", CommandOutput::new(0, STAGING_LOGS))
}

fn running_cli() -> ScriptedCli {
    ScriptedCli::default()
        .respond("logs", CommandOutput::new(0, TASK_LOGS))
        .respond("tasks", task_table(None))
        .respond("tasks", task_table(Some("RUNNING")))
        .respond("tasks", task_table(Some("SUCCEEDED")))
}

#[tokio::test]
async fn staging_scenario_captures_environment() {
    let cli = staging_cli();
    let apps = FakeApps::default();

    let result = runner(&cli, &apps, test_config()).run_staging().await;

    assert!(result.passed, "scenario failed: {:?}", result.error);
    let snapshot = result.snapshot(ExecutionContext::Staging).unwrap();
    assert_eq!(snapshot.get("CF_STACK"), Some("cflinuxfs3"));
    assert_eq!(snapshot.get("CF_INSTANCE_ADDR"), Some(""));
    assert!(!snapshot.contains("START_ENV_CMD"));
    assert!(result.validations.iter().all(|(_, report)| report.passed));
    assert!(result.skipped_lines.is_empty());
}

#[tokio::test]
async fn staging_scenario_issues_lifecycle_in_order() {
    let cli = staging_cli();
    let apps = FakeApps::default();

    let result = runner(&cli, &apps, test_config()).run_staging().await;

    assert_eq!(
        cli.subcommands(),
        vec!["create-buildpack", "push", "start", "logs", "app", "logs", "delete-buildpack", "delete"]
    );

    let create = cli.call("create-buildpack").unwrap();
    let buildpack = result.context.buildpack_name.clone().unwrap();
    assert!(buildpack.starts_with("ENV-BPK-"));
    assert_eq!(create[1], buildpack);
    assert!(create[2].ends_with(".zip"));
    assert_eq!(create[3], "999");
    assert!(
        !Path::new(&create[2]).exists(),
        "buildpack archive outlived the scenario"
    );

    let push = cli.call("push").unwrap();
    assert_eq!(
        push,
        vec![
            "push".to_string(),
            result.context.app_name.clone(),
            "-p".to_string(),
            "assets/hello-world".to_string(),
            "--no-start".to_string(),
            "-b".to_string(),
            buildpack.clone(),
            "-m".to_string(),
            "256M".to_string(),
            "-d".to_string(),
            "apps.example.com".to_string(),
        ]
    );

    assert_eq!(
        cli.call("delete-buildpack").unwrap(),
        vec!["delete-buildpack", buildpack.as_str(), "-f"]
    );
    assert_eq!(
        cli.call("delete").unwrap(),
        vec!["delete", result.context.app_name.as_str(), "-f", "-r"]
    );
}

#[tokio::test]
async fn staging_scenario_is_skipped_off_diego() {
    let cli = staging_cli();
    let apps = FakeApps::default();
    let config = HarnessConfig {
        backend: "dea".to_string(),
        ..test_config()
    };

    let result = runner(&cli, &apps, config).run_staging().await;

    assert!(result.skip_reason.is_some());
    assert!(result.passed);
    assert!(cli.calls().is_empty());
}

#[tokio::test]
async fn staging_that_unexpectedly_succeeds_still_tears_down() {
    let cli = ScriptedCli::default().respond("start", exit(0));
    let apps = FakeApps::default();

    let result = runner(&cli, &apps, test_config()).run_staging().await;

    assert!(!result.passed);
    let error = result.error.unwrap();
    assert!(error.contains("expected 1"), "unexpected error: {}", error);

    let subcommands = cli.subcommands();
    assert!(subcommands.contains(&"app".to_string()));
    assert_eq!(
        &subcommands[subcommands.len() - 2..],
        &["delete-buildpack".to_string(), "delete".to_string()]
    );
}

#[tokio::test]
async fn failed_buildpack_creation_still_deletes_buildpack() {
    let cli = ScriptedCli::default().respond("create-buildpack", exit(1));
    let apps = FakeApps::default();

    let result = runner(&cli, &apps, test_config()).run_staging().await;

    assert!(!result.passed);
    let buildpack = result.context.buildpack_name.clone().unwrap();
    let subcommands = cli.subcommands();
    assert!(!subcommands.contains(&"push".to_string()));
    assert_eq!(
        cli.call("delete-buildpack").unwrap(),
        vec!["delete-buildpack", buildpack.as_str(), "-f"]
    );
    assert_eq!(subcommands.last().map(String::as_str), Some("delete"));
}

#[tokio::test]
async fn timed_out_buildpack_creation_still_deletes_buildpack() {
    let cli = ScriptedCli::default().hang("create-buildpack");
    let apps = FakeApps::default();

    let result = runner(&cli, &apps, test_config()).run_staging().await;

    let error = result.error.unwrap();
    assert!(error.contains("timed out"), "unexpected error: {}", error);

    let created = cli.call("create-buildpack").unwrap();
    let deleted = cli.call("delete-buildpack").unwrap();
    assert_eq!(deleted[1], created[1]);
    assert_eq!(
        cli.subcommands(),
        vec!["create-buildpack", "app", "logs", "delete-buildpack", "delete"]
    );
}

#[tokio::test]
async fn fixture_failure_aborts_before_platform_calls() {
    let base = tempfile::TempDir::new().unwrap();
    let missing = base.path().join("no-such-dir");
    let cli = staging_cli();
    let apps = FakeApps::default();

    let result = runner(&cli, &apps, test_config())
        .with_fixture_dir(&missing)
        .run_staging()
        .await;

    assert!(!result.passed);
    let error = result.error.unwrap();
    assert!(
        error.starts_with("failed to create buildpack fixture"),
        "unexpected error: {}",
        error
    );
    assert!(result.context.buildpack_name.is_none());

    let subcommands = cli.subcommands();
    assert!(!subcommands.contains(&"create-buildpack".to_string()));
    assert!(!subcommands.contains(&"push".to_string()));
    assert!(!subcommands.contains(&"delete-buildpack".to_string()));
    assert_eq!(subcommands, vec!["app", "logs", "delete"]);
}

#[tokio::test]
async fn teardown_failure_is_reported_separately() {
    let cli = staging_cli().respond("delete", exit(1));
    let apps = FakeApps::default();

    let result = runner(&cli, &apps, test_config()).run_staging().await;

    assert!(result.error.is_none());
    assert!(!result.passed);
    assert_eq!(result.teardown_errors.len(), 1);
    assert!(result.teardown_errors[0].starts_with("delete app ENV-APP-"));
    assert!(result.snapshot(ExecutionContext::Staging).is_some());
}

#[tokio::test]
async fn teardown_failure_does_not_mask_body_error() {
    let cli = ScriptedCli::default()
        .respond("start", exit(0))
        .respond("delete-buildpack", exit(1));
    let apps = FakeApps::default();

    let result = runner(&cli, &apps, test_config()).run_staging().await;

    assert!(result.error.unwrap().contains("start"));
    assert_eq!(result.teardown_errors.len(), 1);
    assert!(result.teardown_errors[0].starts_with("delete buildpack"));
    // App deletion still ran after the buildpack deletion failed.
    assert_eq!(cli.subcommands().last().map(String::as_str), Some("delete"));
}

#[tokio::test]
async fn staging_with_wrong_lang_fails_validation() {
    let logs = STAGING_LOGS.replace("LANG=en_US.UTF-8", "LANG=C");
    let cli = ScriptedCli::default()
        .respond("start", exit(1))
        .respond("logs", CommandOutput::new(0, logs));
    let apps = FakeApps::default();

    let result = runner(&cli, &apps, test_config()).run_staging().await;

    assert!(!result.passed);
    assert!(result.error.unwrap().contains("LANG"));
    let (_, report) = &result.validations[0];
    assert!(!report.passed);
    assert!(report.messages.iter().any(|m| m.contains("\"C\"")));
}

#[tokio::test]
async fn running_scenario_captures_app_and_task_environment() {
    let cli = running_cli();
    let apps = FakeApps::default()
        .unavailable("404 Not Found")
        .unavailable("502 Bad Gateway")
        .serving(RUNNING_ENV);

    let result = runner(&cli, &apps, test_config()).run_running().await;

    assert!(result.passed, "scenario failed: {:?}", result.error);
    assert!(apps.request_count() >= 3);

    let running = result.snapshot(ExecutionContext::Running).unwrap();
    assert_eq!(running.get("VCAP_APP_PORT"), Some("8080"));
    assert_eq!(running.get("CF_INSTANCE_INDEX"), Some("0"));

    let task = result.snapshot(ExecutionContext::Task).unwrap();
    assert_eq!(task.get("LANG"), Some("en_US.UTF-8"));
    assert_eq!(task.get("CF_INSTANCE_INTERNAL_IP"), Some("10.255.0.9"));
    assert!(!task.contains("Exit status 0"));
    assert_eq!(task.len(), 8);
}

#[tokio::test]
async fn running_scenario_pushes_binary_app_and_runs_env_task() {
    let cli = running_cli();
    let apps = FakeApps::default().serving(RUNNING_ENV);

    let result = runner(&cli, &apps, test_config()).run_running().await;
    let app = result.context.app_name.as_str();

    let push = cli.call("push").unwrap();
    assert_eq!(push[3], "assets/binary");
    assert_eq!(push[6], "binary_buildpack");
    assert_eq!(cli.call("start").unwrap(), vec!["start", app]);
    assert_eq!(
        cli.call("run-task").unwrap(),
        vec!["run-task", app, "env", "--name", "get-env"]
    );

    let tasks_polls = cli
        .subcommands()
        .iter()
        .filter(|s| s.as_str() == "tasks")
        .count();
    assert_eq!(tasks_polls, 3);
    assert!(!cli.subcommands().contains(&"delete-buildpack".to_string()));
    assert_eq!(cli.subcommands().last().map(String::as_str), Some("delete"));
}

#[tokio::test]
async fn failed_task_fails_scenario() {
    let cli = ScriptedCli::default()
        .respond("tasks", task_table(Some("RUNNING")))
        .respond("tasks", task_table(Some("FAILED")));
    let apps = FakeApps::default().serving(RUNNING_ENV);

    let result = runner(&cli, &apps, test_config()).run_running().await;

    assert!(!result.passed);
    assert!(result.error.as_ref().unwrap().contains("task get-env"));
    assert!(result.snapshot(ExecutionContext::Running).is_some());
    assert!(result.snapshot(ExecutionContext::Task).is_none());
    assert_eq!(cli.subcommands().last().map(String::as_str), Some("delete"));
}

#[tokio::test]
async fn wait_for_task_reports_failure() {
    let cli = ScriptedCli::default().respond("tasks", task_table(Some("FAILED")));
    let apps = FakeApps::default();

    let err = tokio_test::assert_err!(
        orchestrator(&cli, &apps, test_config())
            .wait_for_task("ENV-APP-1234abcd", "get-env")
            .await
    );

    assert!(matches!(err, Error::TaskFailed { .. }));
}

#[tokio::test]
async fn task_state_reads_latest_run() {
    let table = "\
Getting tasks for app ENV-APP-1234abcd in org acceptance / space env as admin...
OK

id   name      state       start time                      command
2    get-env   RUNNING     Wed, 01 May 2024 10:02:00 UTC   env
1    get-env   FAILED      Wed, 01 May 2024 10:01:00 UTC   env
";
    let cli = ScriptedCli::default().respond("tasks", CommandOutput::new(0, table));
    let apps = FakeApps::default();

    let state = tokio_test::assert_ok!(
        orchestrator(&cli, &apps, test_config())
            .task_state("ENV-APP-1234abcd", "get-env")
            .await
    );

    assert_eq!(state, TaskState::Running);
}

#[tokio::test(start_paused = true)]
async fn logs_without_sentinel_time_out() {
    let cli = ScriptedCli::default().respond(
        "logs",
        CommandOutput::new(0, "   2024-05-01T10:00:01.00+0000 [STG/0] OUT Downloading buildpacks...\n"),
    );
    let apps = FakeApps::default();

    let err = orchestrator(&cli, &apps, test_config())
        .wait_for_logs_containing("ENV-APP-1234abcd", "END_ENV_CMD")
        .await
        .unwrap_err();

    match err {
        Error::Timeout { elapsed, .. } => assert_eq!(elapsed, Duration::from_secs(5)),
        other => panic!("expected timeout, got {:?}", other),
    }
    // One initial check plus one per 10ms interval up to the 5s deadline.
    let polls = cli.calls().len();
    assert_eq!(polls, 501);
}

#[tokio::test(start_paused = true)]
async fn unreachable_app_times_out() {
    let cli = ScriptedCli::default();
    let apps = FakeApps::default().unavailable("503 Service Unavailable");

    let err = orchestrator(&cli, &apps, test_config())
        .fetch_env("ENV-APP-1234abcd")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout { .. }));
}

#[tokio::test]
async fn malformed_env_body_is_parse_error() {
    let cli = ScriptedCli::default();
    let apps = FakeApps::default().serving("<html>not json</html>");

    let err = orchestrator(&cli, &apps, test_config())
        .fetch_env("ENV-APP-1234abcd")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Parse(_)));
}

#[tokio::test]
async fn unexpected_exit_carries_stderr() {
    let cli = ScriptedCli::default().respond(
        "push",
        CommandOutput {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "App name is taken\n".to_string(),
        },
    );
    let apps = FakeApps::default();

    let err = orchestrator(&cli, &apps, test_config())
        .push(
            "ENV-APP-1234abcd",
            &default_env_harness::PushOptions::from_config(&test_config(), "assets/binary", "binary_buildpack"),
        )
        .await
        .unwrap_err();

    match err {
        Error::UnexpectedExit {
            expected,
            actual,
            stderr,
            ..
        } => {
            assert_eq!(expected, 0);
            assert_eq!(actual, Some(1));
            assert_eq!(stderr, "App name is taken");
        }
        other => panic!("expected unexpected exit, got {:?}", other),
    }
}
