//! Reconstruction of environment snapshots from raw platform logs.
//!
//! Staging output is bounded by sentinels ([`window`]); task output is
//! selected by source tag ([`TaskOutputFilter`]). Either way the surviving
//! lines go through [`extract_environment`].

pub mod extract;
pub mod filter;
pub mod line;
pub mod window;

pub use extract::{extract_environment, parse_assignment, Extraction, SkipReason, SkippedLine};
pub use filter::TaskOutputFilter;
pub use line::{split_fields, Channel, LogLine, SourceTag};
pub use window::{window, WindowMarkers};

/// Splits captured CLI output into lines.
pub fn lines(output: &str) -> Vec<&str> {
    output.lines().collect()
}

/// Extracts the environment dumped between `markers` in a staging log.
pub fn extract_windowed(output: &str, markers: &WindowMarkers) -> Extraction {
    let all = lines(output);
    extract_environment(window(&all, markers))
}

/// Extracts the environment printed by one task.
pub fn extract_task(output: &str, filter: &TaskOutputFilter) -> Extraction {
    let all = lines(output);
    let task_lines = filter.filter(&all);
    extract_environment(window(&task_lines, &WindowMarkers::default()))
}
