//! Sentinel-bounded windows over a log stream.

/// Start/end sentinels bounding an environment dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowMarkers {
    /// Line printed just before the dump.
    pub start: String,
    /// Line printed just after the dump.
    pub end: String,
}

impl WindowMarkers {
    /// Creates a marker pair.
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

impl Default for WindowMarkers {
    fn default() -> Self {
        Self::new("START_ENV_CMD", "END_ENV_CMD")
    }
}

/// Returns the lines strictly between the first start marker and the first
/// end marker after it.
///
/// Without a start marker the input is returned unchanged. With a start
/// marker but no end marker, everything after the start line is returned.
pub fn window<'a, S: AsRef<str>>(lines: &'a [S], markers: &WindowMarkers) -> &'a [S] {
    let Some(start) = lines
        .iter()
        .position(|line| line.as_ref().contains(markers.start.as_str()))
    else {
        return lines;
    };

    let body = &lines[start + 1..];
    match body
        .iter()
        .position(|line| line.as_ref().contains(markers.end.as_str()))
    {
        Some(end) => &body[..end],
        None => {
            tracing::warn!(
                end_marker = %markers.end,
                "start marker found without end marker, using open window"
            );
            body
        }
    }
}
