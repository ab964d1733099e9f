//! Parsing `KEY=VALUE` payloads out of framed log lines.

use std::fmt;

use crate::snapshot::EnvironmentSnapshot;

use super::line::split_fields;

/// Number of whitespace-separated fields in an environment line; the last
/// one is the `KEY=VALUE` payload.
pub const FIELD_COUNT: usize = 4;

/// Why a line was left out of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Fewer than [`FIELD_COUNT`] fields.
    TooFewFields { found: usize },
    /// The payload has no `=`.
    MissingSeparator,
    /// The payload starts with `=`.
    EmptyKey,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::TooFewFields { found } => {
                write!(f, "expected {} fields, found {}", FIELD_COUNT, found)
            }
            SkipReason::MissingSeparator => write!(f, "payload has no '='"),
            SkipReason::EmptyKey => write!(f, "payload has an empty key"),
        }
    }
}

/// A line that did not yield an assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// One-based position in the input.
    pub line_number: usize,
    /// The raw line.
    pub line: String,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// Snapshot plus the lines that could not be parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub snapshot: EnvironmentSnapshot,
    pub skipped: Vec<SkippedLine>,
}

/// Parses one framed line into `(key, value)`.
///
/// The value is everything after the first `=`, so values may themselves
/// contain `=` or spaces.
pub fn parse_assignment(line: &str) -> Result<(&str, &str), SkipReason> {
    let fields = split_fields(line, FIELD_COUNT);
    if fields.len() < FIELD_COUNT {
        return Err(SkipReason::TooFewFields {
            found: fields.len(),
        });
    }

    let payload = fields[FIELD_COUNT - 1];
    let (key, value) = payload
        .split_once('=')
        .ok_or(SkipReason::MissingSeparator)?;
    if key.is_empty() {
        return Err(SkipReason::EmptyKey);
    }
    Ok((key, value))
}

/// Builds a snapshot from framed log lines.
///
/// Blank lines are ignored. Other non-conforming lines are logged and
/// reported in [`Extraction::skipped`]. A repeated key keeps its last value.
pub fn extract_environment<I, S>(lines: I) -> Extraction
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut pairs = Vec::new();
    let mut skipped = Vec::new();

    for (i, line) in lines.into_iter().enumerate() {
        let line = line.as_ref();
        if line.trim().is_empty() {
            continue;
        }

        match parse_assignment(line) {
            Ok((key, value)) => pairs.push((key.to_string(), value.to_string())),
            Err(reason) => {
                tracing::warn!(line_number = i + 1, %reason, line, "skipping log line");
                skipped.push(SkippedLine {
                    line_number: i + 1,
                    line: line.to_string(),
                    reason,
                });
            }
        }
    }

    Extraction {
        snapshot: pairs.into_iter().collect(),
        skipped,
    }
}
