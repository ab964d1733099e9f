//! Assertions over a captured environment snapshot.

use crate::error::{Error, Result};
use crate::snapshot::EnvironmentSnapshot;

/// Variables every execution context must carry.
pub const COMMON_KEYS: &[&str] = &[
    "CF_INSTANCE_ADDR",
    "CF_INSTANCE_INTERNAL_IP",
    "CF_INSTANCE_IP",
    "CF_INSTANCE_PORT",
    "CF_INSTANCE_PORTS",
];

/// Variables that must hold JSON documents.
pub const JSON_KEYS: &[&str] = &["VCAP_APPLICATION", "VCAP_SERVICES"];

/// Expected locale.
pub const EXPECTED_LANG: &str = "en_US.UTF-8";

/// Where the snapshot was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Buildpack compile step.
    Staging,
    /// Long-running app instance.
    Running,
    /// One-off task.
    Task,
}

impl ExecutionContext {
    /// All variables that must be present in this context.
    pub fn required_keys(&self) -> Vec<&'static str> {
        let extra: &[&str] = match self {
            ExecutionContext::Staging => &["CF_STACK"],
            ExecutionContext::Running => &[
                "CF_INSTANCE_GUID",
                "CF_INSTANCE_INDEX",
                "VCAP_APP_HOST",
                "VCAP_APP_PORT",
            ],
            ExecutionContext::Task => &[],
        };
        COMMON_KEYS.iter().chain(extra).copied().collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionContext::Staging => "staging",
            ExecutionContext::Running => "running",
            ExecutionContext::Task => "task",
        }
    }
}

/// Outcome of a collecting validation pass.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Whether every check passed.
    pub passed: bool,
    /// One message per check, failures included.
    pub messages: Vec<String>,
}

/// Pure checks over an [`EnvironmentSnapshot`].
pub struct EnvironmentValidator;

impl EnvironmentValidator {
    /// Fails on the first key that is absent.
    pub fn require_present(snapshot: &EnvironmentSnapshot, keys: &[&str]) -> Result<()> {
        for key in keys {
            if !snapshot.contains(key) {
                return Err(Error::MissingKey {
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Requires each key to be present and to decode as JSON.
    pub fn require_json_parseable(snapshot: &EnvironmentSnapshot, keys: &[&str]) -> Result<()> {
        for key in keys {
            let value = snapshot.get(key).ok_or_else(|| Error::MissingKey {
                key: key.to_string(),
            })?;
            if let Err(e) = serde_json::from_str::<serde_json::Value>(value) {
                return Err(Error::MalformedValue {
                    key: key.to_string(),
                    value: value.to_string(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Requires `key` to equal `expected` exactly.
    pub fn require_equals(snapshot: &EnvironmentSnapshot, key: &str, expected: &str) -> Result<()> {
        let actual = snapshot.get(key).ok_or_else(|| Error::MissingKey {
            key: key.to_string(),
        })?;
        if actual != expected {
            return Err(Error::UnexpectedValue {
                key: key.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }

    /// Runs every check for `context`, stopping at the first failure.
    pub fn check_context(snapshot: &EnvironmentSnapshot, context: ExecutionContext) -> Result<()> {
        Self::require_equals(snapshot, "LANG", EXPECTED_LANG)?;
        Self::require_json_parseable(snapshot, JSON_KEYS)?;
        Self::require_present(snapshot, &context.required_keys())
    }

    /// Runs every check for `context` and collects all outcomes.
    pub fn report(snapshot: &EnvironmentSnapshot, context: ExecutionContext) -> ValidationReport {
        let mut messages = Vec::new();
        let mut passed = true;

        let mut record = |outcome: Result<()>, ok_message: String| match outcome {
            Ok(()) => messages.push(ok_message),
            Err(e) => {
                messages.push(e.to_string());
                passed = false;
            }
        };

        record(
            Self::require_equals(snapshot, "LANG", EXPECTED_LANG),
            format!("LANG is {}", EXPECTED_LANG),
        );
        for key in JSON_KEYS.iter().copied() {
            record(
                Self::require_json_parseable(snapshot, &[key]),
                format!("{} is valid JSON", key),
            );
        }
        for key in context.required_keys() {
            record(
                Self::require_present(snapshot, &[key]),
                format!("{} is present", key),
            );
        }

        ValidationReport { passed, messages }
    }
}
