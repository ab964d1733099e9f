//! Default Environment Harness CLI
//!
//! Runs the default-environment scenarios against the targeted platform.

use std::path::PathBuf;

use default_env_harness::{
    CfCli, HarnessConfig, HttpAppClient, LifecycleOrchestrator, ScenarioKind, ScenarioResult,
    ScenarioRunner, Validate,
};

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} [staging|running|all] [--config PATH]", program);
    eprintln!("\nChecks the default environment of staging, running apps and tasks.");
    eprintln!("\nEnvironment variables:");
    eprintln!("  CF_HARNESS_APPS_DOMAIN=<domain>  Domain apps are routed on");
    eprintln!("  CF_HARNESS_BACKEND=diego|...     Platform backend");
    eprintln!("  RUST_LOG=<filter>                Log filter");
    std::process::exit(2);
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("default-env-harness");

    let mut scenarios = vec![ScenarioKind::Staging, ScenarioKind::Running];
    let mut config_path: Option<PathBuf> = None;
    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "staging" => scenarios = vec![ScenarioKind::Staging],
            "running" => scenarios = vec![ScenarioKind::Running],
            "all" => scenarios = vec![ScenarioKind::Staging, ScenarioKind::Running],
            "--config" => match rest.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => usage(program),
            },
            _ => usage(program),
        }
    }

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let apps = match HttpAppClient::from_config(&config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Cannot reach apps: {}", e);
            std::process::exit(1);
        }
    };
    let cli = CfCli::with_binary(config.cf_binary.clone()).with_interval(config.poll_interval());
    let runner = ScenarioRunner::new(LifecycleOrchestrator::new(
        Box::new(cli),
        Box::new(apps),
        config,
    ));

    let mut results = Vec::new();
    for kind in scenarios {
        results.push(runner.run(kind).await);
    }

    print_summary(&results);
    if results.iter().any(|result| !result.passed) {
        std::process::exit(1);
    }
}

fn load_config(path: Option<PathBuf>) -> default_env_harness::Result<HarnessConfig> {
    let config = match path {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    }
    .with_env_overrides()?;

    for warning in config.validate().into_result()? {
        tracing::warn!(%warning, "configuration warning");
    }
    Ok(config)
}

fn print_summary(results: &[ScenarioResult]) {
    println!("\n{}", "=".repeat(60));
    println!("Default Environment Harness");
    println!("{}", "=".repeat(60));

    for result in results {
        let status = match (&result.skip_reason, result.passed) {
            (Some(_), _) => "SKIPPED",
            (None, true) => "PASSED",
            (None, false) => "FAILED",
        };
        println!();
        println!("{} [{}] app={}", result.kind, status, result.context.app_name);

        if let Some(reason) = &result.skip_reason {
            println!("  reason: {}", reason);
        }
        for (context, snapshot) in &result.snapshots {
            println!("  {}: {} variables", context.as_str(), snapshot.len());
        }
        for (context, report) in &result.validations {
            for message in &report.messages {
                println!("  {}: {}", context.as_str(), message);
            }
        }
        if !result.skipped_lines.is_empty() {
            println!("  skipped log lines: {}", result.skipped_lines.len());
        }
        if let Some(error) = &result.error {
            println!("  error: {}", error);
        }
        for error in &result.teardown_errors {
            println!("  teardown: {}", error);
        }
    }
}
