//! Error types for the default environment harness.

use std::time::Duration;

use thiserror::Error;

/// Top-level error type for harness operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A polled condition never became true before its deadline.
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout { operation: String, elapsed: Duration },

    /// The buildpack fixture could not be written.
    #[error("failed to create buildpack fixture: {0}")]
    Fixture(String),

    /// Writing the buildpack archive failed.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// IO error while spawning commands or touching the filesystem.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A platform command exited with a different code than expected.
    #[error("`{command}` exited with {actual:?}, expected {expected}: {stderr}")]
    UnexpectedExit {
        command: String,
        expected: i32,
        actual: Option<i32>,
        stderr: String,
    },

    /// A task reached the FAILED state.
    #[error("task {task} of app {app} failed")]
    TaskFailed { app: String, task: String },

    /// No task with the given name is listed for the app.
    #[error("task {task} not found for app {app}")]
    TaskNotFound { app: String, task: String },

    /// A required environment variable is absent.
    #[error("missing environment variable {key}")]
    MissingKey { key: String },

    /// An environment variable is present but not valid JSON.
    #[error("environment variable {key} is not valid JSON ({reason}): {value}")]
    MalformedValue {
        key: String,
        value: String,
        reason: String,
    },

    /// An environment variable holds an unexpected literal value.
    #[error("environment variable {key} is {actual:?}, expected {expected:?}")]
    UnexpectedValue {
        key: String,
        expected: String,
        actual: String,
    },

    /// HTTP request to a running app failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Harness configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Platform output could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, Error>;
