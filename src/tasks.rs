//! One-off task records as listed by `cf tasks`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    /// Returns true once the task can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }

    /// Returns whether moving from `self` to `next` respects the lifecycle.
    ///
    /// Terminal states never change; otherwise a task only moves forward.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        match self {
            TaskState::Pending => true,
            TaskState::Running => next != TaskState::Pending,
            TaskState::Succeeded | TaskState::Failed => next == *self,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Running => "RUNNING",
            TaskState::Succeeded => "SUCCEEDED",
            TaskState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(TaskState::Pending),
            "RUNNING" => Ok(TaskState::Running),
            "SUCCEEDED" => Ok(TaskState::Succeeded),
            "FAILED" => Ok(TaskState::Failed),
            other => Err(Error::Parse(format!("unknown task state: {}", other))),
        }
    }
}

/// One row of the task table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task name given to `run-task --name`.
    pub name: String,
    /// Sequence id assigned by the platform.
    pub index: u32,
    /// Current state.
    pub state: TaskState,
}

/// Parses the table printed by `cf tasks APP`.
///
/// Everything up to the `id name state ...` header is preamble. An app
/// without tasks yields an empty list.
pub fn parse_task_table(output: &str) -> Result<Vec<TaskRecord>> {
    let rows = output
        .lines()
        .skip_while(|line| !is_header(line))
        .skip(1)
        .filter(|line| !line.trim().is_empty());

    let mut records = Vec::new();
    for row in rows {
        let mut columns = row.split_whitespace();
        let (Some(id), Some(name), Some(state)) = (columns.next(), columns.next(), columns.next())
        else {
            return Err(Error::Parse(format!("truncated task row: {:?}", row)));
        };

        let index = id
            .parse::<u32>()
            .map_err(|_| Error::Parse(format!("invalid task id {:?} in row {:?}", id, row)))?;

        records.push(TaskRecord {
            name: name.to_string(),
            index,
            state: state.parse::<TaskState>()?,
        });
    }

    Ok(records)
}

fn is_header(line: &str) -> bool {
    let mut columns = line.split_whitespace();
    columns.next() == Some("id") && columns.next() == Some("name") && columns.next() == Some("state")
}

/// Returns the most recent run of the task called `name`.
pub fn latest_named<'a>(records: &'a [TaskRecord], name: &str) -> Option<&'a TaskRecord> {
    records
        .iter()
        .filter(|record| record.name == name)
        .max_by_key(|record| record.index)
}
