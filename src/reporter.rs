use crate::types::{CycleReport, ExitSummary};

/// Emit a cycle report as a single JSON line to stdout.
pub fn report_cycle(report: &CycleReport) {
    if let Ok(json) = serde_json::to_string(report) {
        println!("{json}");
    }
}

/// Emit the exit summary as pretty-printed JSON to stdout.
pub fn report_exit_summary(summary: &ExitSummary) {
    if let Ok(json) = serde_json::to_string_pretty(summary) {
        println!("{json}");
    }
}
