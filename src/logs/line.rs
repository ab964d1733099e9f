//! Tokenizer for the platform's log-line framing.
//!
//! A recent-logs line looks like
//! `2024-05-01T10:00:00.00+0000 [APP/TASK/get-env/0] OUT LANG=en_US.UTF-8`:
//! a timestamp, a bracketed source tag, a channel and the message. The
//! timestamp is optional so that already-trimmed lines still tokenize.

use std::fmt;

/// Output channel of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Standard output.
    Out,
    /// Standard error.
    Err,
}

impl Channel {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "OUT" => Some(Channel::Out),
            "ERR" => Some(Channel::Err),
            _ => None,
        }
    }
}

/// Origin of a log line, taken from its bracketed prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceTag {
    /// `[STG/<index>]`: staging output.
    Staging { index: u32 },
    /// `[APP/PROC/<type>/<index>]`: a long-running process instance.
    AppProcess { process_type: String, index: u32 },
    /// `[APP/TASK/<name>/<index>]`: a one-off task.
    Task { name: String, index: u32 },
    /// `[CELL/<index>]`
    Cell { index: u32 },
    /// `[API/<index>]`
    Api { index: u32 },
    /// `[RTR/<index>]`
    Router { index: u32 },
    /// Any other bracketed tag, kept verbatim without brackets.
    Other(String),
}

impl SourceTag {
    /// Parses a bracketed tag such as `[APP/TASK/get-env/0]`.
    ///
    /// Returns `None` if `token` is not bracketed.
    pub fn parse(token: &str) -> Option<Self> {
        let inner = token.strip_prefix('[')?.strip_suffix(']')?;
        let parts: Vec<&str> = inner.split('/').collect();

        let tag = match parts.as_slice() {
            ["STG", index] => index.parse().ok().map(|index| SourceTag::Staging { index }),
            ["APP", "PROC", process_type, index] => {
                index.parse().ok().map(|index| SourceTag::AppProcess {
                    process_type: process_type.to_string(),
                    index,
                })
            }
            ["APP", "TASK", name, index] if !name.is_empty() => {
                index.parse().ok().map(|index| SourceTag::Task {
                    name: name.to_string(),
                    index,
                })
            }
            ["CELL", index] => index.parse().ok().map(|index| SourceTag::Cell { index }),
            ["API", index] => index.parse().ok().map(|index| SourceTag::Api { index }),
            ["RTR", index] => index.parse().ok().map(|index| SourceTag::Router { index }),
            _ => None,
        };

        Some(tag.unwrap_or_else(|| SourceTag::Other(inner.to_string())))
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceTag::Staging { index } => write!(f, "[STG/{}]", index),
            SourceTag::AppProcess {
                process_type,
                index,
            } => write!(f, "[APP/PROC/{}/{}]", process_type, index),
            SourceTag::Task { name, index } => write!(f, "[APP/TASK/{}/{}]", name, index),
            SourceTag::Cell { index } => write!(f, "[CELL/{}]", index),
            SourceTag::Api { index } => write!(f, "[API/{}]", index),
            SourceTag::Router { index } => write!(f, "[RTR/{}]", index),
            SourceTag::Other(raw) => write!(f, "[{}]", raw),
        }
    }
}

/// A tokenized log line borrowing from the raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine<'a> {
    /// Leading timestamp, if present.
    pub timestamp: Option<&'a str>,
    /// Source tag.
    pub source: SourceTag,
    /// Output channel.
    pub channel: Channel,
    /// Everything after the channel, leading whitespace removed.
    pub message: &'a str,
}

impl<'a> LogLine<'a> {
    /// Tokenizes a raw line, returning `None` if it does not follow the
    /// `[timestamp] [SOURCE] CHANNEL message` framing.
    pub fn parse(line: &'a str) -> Option<Self> {
        let mut rest = line;

        let first = next_token(&mut rest)?;
        let (timestamp, source) = match SourceTag::parse(first) {
            Some(source) => (None, source),
            None => (Some(first), SourceTag::parse(next_token(&mut rest)?)?),
        };
        let channel = Channel::parse(next_token(&mut rest)?)?;
        let message = trim_line_end(rest.trim_start());

        Some(Self {
            timestamp,
            source,
            channel,
            message,
        })
    }
}

/// Splits `line` into at most `max` whitespace-separated fields.
///
/// Runs of whitespace count as one separator. The last field keeps the
/// remainder of the line verbatim (minus line terminators), so a payload
/// containing spaces survives intact.
pub fn split_fields(line: &str, max: usize) -> Vec<&str> {
    let mut fields = Vec::with_capacity(max);
    let mut rest = line;

    while fields.len() + 1 < max {
        match next_token(&mut rest) {
            Some(token) => fields.push(token),
            None => return fields,
        }
    }

    let remainder = trim_line_end(rest.trim_start());
    if !remainder.is_empty() {
        fields.push(remainder);
    }
    fields
}

/// Pops the next whitespace-delimited token off the front of `rest`.
fn next_token<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let trimmed = rest.trim_start();
    if trimmed.is_empty() {
        *rest = trimmed;
        return None;
    }

    let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
    let (token, tail) = trimmed.split_at(end);
    *rest = tail;
    Some(token)
}

fn trim_line_end(s: &str) -> &str {
    s.trim_end_matches(['\r', '\n'])
}
