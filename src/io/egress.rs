//! Cycle report egress - writes emitted cycles to file
//!
//! Reports are written in JSONL format (one JSON object per line) to the
//! file specified in config. The downstream inventory updater consumes
//! this stream (or the in-process channel).

use crate::domain::cycle::CycleReport;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{error, info};

/// Egress writer for cycle reports
pub struct CycleEgress {
    file_path: String,
}

impl CycleEgress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write a cycle report to the egress file
    /// Returns true if successful, false otherwise
    pub fn write_report(&self, report: &CycleReport) -> bool {
        let json = report.to_json();

        match self.append_line(&json) {
            Ok(()) => {
                info!(
                    cid = %report.cid,
                    aborted = %report.aborted,
                    zones = %report.zones.len(),
                    records = %report.records.len(),
                    "cycle_egressed"
                );
                true
            }
            Err(e) => {
                error!(
                    cid = %report.cid,
                    error = %e,
                    "cycle_egress_failed"
                );
                false
            }
        }
    }

    /// Append a line to the egress file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cycle::epoch_ms;

    #[test]
    fn test_reports_append_as_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cycles.jsonl");
        let egress = CycleEgress::new(path.to_str().unwrap());

        assert!(egress.write_report(&CycleReport::new(epoch_ms())));
        assert!(egress.write_report(&CycleReport::new(epoch_ms())));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("cid").is_some());
        }
    }

    #[test]
    fn test_parent_dirs_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/output/cycles.jsonl");
        let egress = CycleEgress::new(path.to_str().unwrap());

        assert!(egress.write_report(&CycleReport::new(epoch_ms())));
        assert!(path.exists());
    }
}
