//! Selection of a single task's stdout from a multiplexed log stream.

use super::line::{Channel, LogLine, SourceTag};

/// Matches stdout lines of one named task that carry a `KEY=VALUE` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutputFilter {
    name: String,
    index: Option<u32>,
}

impl TaskOutputFilter {
    /// Matches any instance of the task called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: None,
        }
    }

    /// Restricts matching to one instance index.
    pub fn with_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    /// Returns true if `line` is an assignment printed by this task.
    pub fn matches(&self, line: &str) -> bool {
        let Some(parsed) = LogLine::parse(line) else {
            return false;
        };

        let source_matches = match &parsed.source {
            SourceTag::Task { name, index } => {
                *name == self.name && self.index.map_or(true, |wanted| wanted == *index)
            }
            _ => false,
        };

        source_matches && parsed.channel == Channel::Out && parsed.message.contains('=')
    }

    /// Keeps only matching lines, preserving order.
    pub fn filter<'a, S: AsRef<str>>(&self, lines: &'a [S]) -> Vec<&'a str> {
        lines
            .iter()
            .map(|line| line.as_ref())
            .filter(|line| self.matches(line))
            .collect()
    }
}
