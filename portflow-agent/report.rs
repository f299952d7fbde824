// Console report: one line per tick, one bracketed group per core

use std::fmt::Write;

use crate::orchestrator::Sample;

/// Render a tick as `[ pp.pp% ... ] ` per core, without trailing newline
pub fn format_line(sample: &Sample) -> String {
    let mut line = String::new();
    for core in &sample.cores {
        line.push('[');
        for percent in &core.utilization {
            let _ = write!(line, "{percent:6.2}%");
        }
        line.push_str("] ");
    }
    line
}
