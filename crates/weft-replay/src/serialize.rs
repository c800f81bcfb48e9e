//! Serialization for bug records and bug reports.

use crate::record::{BugRecord, FORMAT_VERSION};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during serialization.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported bug record format {found} (expected {})", FORMAT_VERSION)]
    UnsupportedFormat { found: u32 },
}

/// Save a bug record to a JSON file.
pub fn save_bug_record(record: &BugRecord, path: &Path) -> Result<(), SerializeError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, record)?;
    writer.flush()?;
    Ok(())
}

/// Load a bug record from a JSON file.
pub fn load_bug_record(path: &Path) -> Result<BugRecord, SerializeError> {
    let file = File::open(path)?;
    let record: BugRecord = serde_json::from_reader(BufReader::new(file))?;
    if record.format_version != FORMAT_VERSION {
        return Err(SerializeError::UnsupportedFormat { found: record.format_version });
    }
    Ok(record)
}

/// Save a bug record as a human-readable markdown file.
pub fn save_bug_report(record: &BugRecord, path: &Path) -> Result<(), SerializeError> {
    let markdown = format_bug_markdown(record);
    let mut file = File::create(path)?;
    file.write_all(markdown.as_bytes())?;
    Ok(())
}

/// Format a bug record as markdown.
pub fn format_bug_markdown(record: &BugRecord) -> String {
    let mut md = String::new();

    // Header
    md.push_str(&format!("# {}: {}\n\n", record.program, record.outcome.label()));
    md.push_str(&format!("**Outcome:** {}\n\n", record.outcome));
    md.push_str(&format!(
        "Found by the `{}` strategy (seed {}) in iteration {}.\n\n",
        record.strategy, record.seed, record.iteration
    ));

    // Reproduction
    md.push_str("## How to Reproduce\n\n");
    md.push_str("```sh\n");
    md.push_str(&format!("weft replay {}.json\n", record.file_stem()));
    md.push_str("```\n\n");

    // Schedule
    let schedule: Vec<String> = record.trace.schedule().iter().map(|t| t.to_string()).collect();
    md.push_str("## Schedule\n\n");
    md.push_str(&format!("{} grants: {}\n\n", schedule.len(), schedule.join(" ")));

    // Timeline
    md.push_str("## Timeline\n\n");
    md.push_str("| # | Grant | Event |\n");
    md.push_str("|---|-------|-------|\n");
    for (i, event) in record.trace.events.iter().enumerate() {
        let grant = record
            .trace
            .window_of(i)
            .map(|w| w.to_string())
            .unwrap_or_else(|| "-".to_string());
        md.push_str(&format!("| {} | {} | `{}` |\n", i, grant, event));
    }
    md.push('\n');

    // Summary
    md.push_str("## Event Summary\n\n");
    for (kind, count) in record.trace.summary() {
        md.push_str(&format!("- **{}:** {}\n", kind, count));
    }
    md.push('\n');

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use weft_runtime::{DeadlockKind, Outcome};
    use weft_trace::{Event, EventKind, ExecutionTrace, MonitorId, ThreadId};

    fn deadlock_record() -> BugRecord {
        let mut trace = ExecutionTrace::new();
        trace.record_grant(ThreadId(1));
        trace.push(Event::new(ThreadId(1), 1, EventKind::EnterMonitor { monitor: MonitorId(0) }));
        trace.record_grant(ThreadId(2));
        trace.push(Event::new(ThreadId(2), 1, EventKind::EnterMonitor { monitor: MonitorId(1) }));
        trace.push(Event::new(ThreadId(2), 2, EventKind::MonitorRequest { monitor: MonitorId(0) }));
        trace.record_grant(ThreadId(1));
        trace.push(Event::new(ThreadId(1), 2, EventKind::MonitorRequest { monitor: MonitorId(1) }));
        trace.push(Event::new(
            ThreadId(1),
            3,
            EventKind::Deadlock { cycle: vec![ThreadId(1), ThreadId(2)] },
        ));
        BugRecord::new(
            "lock-order",
            "random",
            42,
            7,
            Outcome::Deadlock(DeadlockKind::Cycle { threads: vec![ThreadId(1), ThreadId(2)] }),
            trace,
        )
    }

    #[test]
    fn bug_record_save_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bug.json");
        let record = deadlock_record();

        save_bug_record(&record, &path).unwrap();
        let loaded = load_bug_record(&path).unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn newer_format_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bug.json");
        let mut record = deadlock_record();
        record.format_version = FORMAT_VERSION + 1;
        save_bug_record(&record, &path).unwrap();

        let err = load_bug_record(&path).unwrap_err();
        assert!(matches!(err, SerializeError::UnsupportedFormat { found } if found == FORMAT_VERSION + 1));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = load_bug_record(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, SerializeError::Io(_)));
    }

    #[test]
    fn markdown_report_contents() {
        let md = format_bug_markdown(&deadlock_record());
        assert!(md.contains("# lock-order: deadlock"));
        assert!(md.contains("seed 42"));
        assert!(md.contains("weft replay lock-order-deadlock-0007.json"));
        assert!(md.contains("3 grants: T1 T2 T1"));
        assert!(md.contains("## Timeline"));
        assert!(md.contains("DEADLOCK"));
    }

    #[test]
    fn markdown_report_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bug.md");
        save_bug_report(&deadlock_record(), &path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("# lock-order"));
    }
}
