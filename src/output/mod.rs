/// Writes the analysis report to disk.
pub mod formatter;
/// Builds a Markdown report from the passes a hook ran.
pub mod report;
