//! Harness configuration.
//!
//! Loaded from a TOML or YAML file and overridable through `CF_HARNESS_*`
//! environment variables. Validated before any platform call is made.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::poll::PollConfig;

/// Prefix of environment variables that override file settings.
pub const ENV_PREFIX: &str = "CF_HARNESS_";

/// Backend on which staging environment capture is supported.
pub const DIEGO_BACKEND: &str = "diego";

/// Settings shared by every scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Platform CLI executable.
    #[serde(default = "default_cf_binary")]
    pub cf_binary: String,

    /// Shared domain apps are routed on; required to reach `/env`.
    #[serde(default)]
    pub apps_domain: Option<String>,

    /// Scheme used to reach apps.
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Accept self-signed certificates when reaching apps.
    #[serde(default)]
    pub skip_ssl_validation: bool,

    /// Platform backend; staging capture only runs on diego.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Timeout for ordinary CLI operations, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Timeout for `start`, which includes staging, in seconds.
    #[serde(default = "default_push_timeout_secs")]
    pub push_timeout_secs: u64,

    /// Interval between polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Memory limit passed to `push -m`.
    #[serde(default = "default_memory_limit")]
    pub memory_limit: String,

    /// App pushed with the capturing buildpack.
    #[serde(default = "default_hello_world_asset")]
    pub hello_world_asset: PathBuf,

    /// App serving `/env`, pushed with the binary buildpack.
    #[serde(default = "default_binary_asset")]
    pub binary_asset: PathBuf,

    /// Buildpack used for the running-app scenario.
    #[serde(default = "default_binary_buildpack")]
    pub binary_buildpack: String,

    /// Position given to `create-buildpack`.
    #[serde(default = "default_buildpack_position")]
    pub buildpack_position: u32,

    /// Name of the environment-dumping task.
    #[serde(default = "default_task_name")]
    pub task_name: String,

    /// Prefix for generated resource names.
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
}

fn default_cf_binary() -> String {
    "cf".to_string()
}

fn default_protocol() -> String {
    "https".to_string()
}

fn default_backend() -> String {
    DIEGO_BACKEND.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_push_timeout_secs() -> u64 {
    120 // 2 minutes
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_memory_limit() -> String {
    "256M".to_string()
}

fn default_hello_world_asset() -> PathBuf {
    PathBuf::from("assets/hello-world")
}

fn default_binary_asset() -> PathBuf {
    PathBuf::from("assets/binary")
}

fn default_binary_buildpack() -> String {
    "binary_buildpack".to_string()
}

fn default_buildpack_position() -> u32 {
    999
}

fn default_task_name() -> String {
    "get-env".to_string()
}

fn default_name_prefix() -> String {
    "ENV".to_string()
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            cf_binary: default_cf_binary(),
            apps_domain: None,
            protocol: default_protocol(),
            skip_ssl_validation: false,
            backend: default_backend(),
            default_timeout_secs: default_timeout_secs(),
            push_timeout_secs: default_push_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            memory_limit: default_memory_limit(),
            hello_world_asset: default_hello_world_asset(),
            binary_asset: default_binary_asset(),
            binary_buildpack: default_binary_buildpack(),
            buildpack_position: default_buildpack_position(),
            task_name: default_task_name(),
            name_prefix: default_name_prefix(),
        }
    }
}

impl HarnessConfig {
    /// Loads a config file; the format follows the extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content)
                .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e))),
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e))),
            _ => Err(Error::Config(format!(
                "unsupported config format: {}",
                path.display()
            ))),
        }
    }

    /// Applies `CF_HARNESS_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides looked up through `lookup` by full variable name.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |suffix: &str| lookup(&format!("{}{}", ENV_PREFIX, suffix));

        if let Some(v) = var("CF_BINARY") {
            self.cf_binary = v;
        }
        if let Some(v) = var("APPS_DOMAIN") {
            self.apps_domain = Some(v);
        }
        if let Some(v) = var("PROTOCOL") {
            self.protocol = v;
        }
        if let Some(v) = var("BACKEND") {
            self.backend = v;
        }
        if let Some(v) = var("SKIP_SSL_VALIDATION") {
            self.skip_ssl_validation = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = var("DEFAULT_TIMEOUT") {
            self.default_timeout_secs = parse_number("DEFAULT_TIMEOUT", &v)?;
        }
        if let Some(v) = var("PUSH_TIMEOUT") {
            self.push_timeout_secs = parse_number("PUSH_TIMEOUT", &v)?;
        }
        if let Some(v) = var("POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_number("POLL_INTERVAL_MS", &v)?;
        }

        Ok(self)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Poll settings for an operation bounded by `timeout`.
    pub fn poll(&self, timeout: Duration) -> PollConfig {
        PollConfig::new(self.poll_interval(), timeout)
    }

    /// Returns true if the staging scenario can run on this backend.
    pub fn supports_staging_capture(&self) -> bool {
        self.backend == DIEGO_BACKEND
    }
}

fn parse_number(name: &str, value: &str) -> Result<u64> {
    value.trim().parse().map_err(|_| {
        Error::Config(format!(
            "{}{} must be a non-negative integer, got {:?}",
            ENV_PREFIX, name, value
        ))
    })
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

impl Validate for HarnessConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.cf_binary.trim().is_empty() {
            result.add_error("cf_binary cannot be empty");
        }

        if self.poll_interval_ms == 0 {
            result.add_error("poll_interval_ms must be greater than zero");
        }

        if self.default_timeout_secs == 0 || self.push_timeout_secs == 0 {
            result.add_error("timeouts must be greater than zero");
        }

        if self.poll_interval() >= self.default_timeout() {
            result.add_error("poll_interval_ms must be shorter than default_timeout_secs");
        }

        if self.task_name.trim().is_empty() || self.task_name.contains(char::is_whitespace) {
            result.add_error("task_name must be a single non-empty word");
        }

        if !matches!(self.protocol.as_str(), "http" | "https") {
            result.add_error(format!("protocol must be http or https, got '{}'", self.protocol));
        }

        match &self.apps_domain {
            None => result.add_warning("apps_domain is not set; the running-app scenario cannot reach /env"),
            Some(domain) if domain.trim().is_empty() => result.add_error("apps_domain cannot be empty"),
            Some(_) => {}
        }

        // Staging includes the 5 second sleep in the capturing buildpack.
        if self.push_timeout_secs < 10 {
            result.add_warning("push_timeout_secs under 10 seconds will likely expire during staging");
        }

        if !self.supports_staging_capture() {
            result.add_warning(format!(
                "backend '{}' does not support staging capture; that scenario will be skipped",
                self.backend
            ));
        }

        result
    }
}
