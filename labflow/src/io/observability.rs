//! Append-only record of remote executor calls.
//!
//! # Separation of Concerns
//!
//! - **Tracing (`logging`)**: dev diagnostics via `RUST_LOG`, stderr only.
//! - **Observability sink (this module)**: product log of every remote call
//!   (request, response, elapsed time) plus progress ticks for long calls.
//!   Always written when configured, unaffected by `RUST_LOG`, never read back.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;

/// One record in the observability log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObservabilityEvent {
    Call(CallRecord),
    Progress(ProgressRecord),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRecord {
    pub ts: String,
    pub environment: String,
    pub cwd: Option<PathBuf>,
    pub script: String,
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressRecord {
    pub ts: String,
    pub environment: String,
    pub elapsed_secs: u64,
}

impl ProgressRecord {
    pub fn new(environment: &str, elapsed: Duration) -> Self {
        Self {
            ts: timestamp(),
            environment: environment.to_string(),
            elapsed_secs: elapsed.as_secs(),
        }
    }
}

/// Destination for observability events.
pub trait ObservabilitySink {
    fn record(&self, event: &ObservabilityEvent) -> Result<()>;
}

/// Sink that drops every event.
pub struct NullSink;

impl ObservabilitySink for NullSink {
    fn record(&self, _event: &ObservabilityEvent) -> Result<()> {
        Ok(())
    }
}

/// Sink appending one JSON object per line to a file.
pub struct JsonlSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlSink {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log dir {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ObservabilitySink for JsonlSink {
    fn record(&self, event: &ObservabilityEvent) -> Result<()> {
        let mut line = serde_json::to_string(event).context("serialize observability event")?;
        line.push('\n');
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("observability log lock poisoned"))?;
        writer
            .write_all(line.as_bytes())
            .with_context(|| format!("append {}", self.path.display()))?;
        // Flush per record so a long-running call is visible while it runs.
        writer
            .flush()
            .with_context(|| format!("flush {}", self.path.display()))
    }
}

/// RFC 3339 timestamp for event records.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(exit_status: i32) -> ObservabilityEvent {
        ObservabilityEvent::Call(CallRecord {
            ts: "2026-01-01T00:00:00Z".to_string(),
            environment: "obi3".to_string(),
            cwd: Some(PathBuf::from("/data/run1")),
            script: "obi import".to_string(),
            exit_status,
            stdout: String::new(),
            stderr: String::new(),
            elapsed_ms: 12,
        })
    }

    #[test]
    fn jsonl_sink_appends_tagged_lines() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("logs/executor.jsonl");
        let sink = JsonlSink::open(&path).expect("open");
        sink.record(&call(0)).expect("record");
        sink.record(&ObservabilityEvent::Progress(ProgressRecord::new(
            "obi3",
            Duration::from_secs(31),
        )))
        .expect("record");

        let contents = fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(first["kind"], "call");
        assert_eq!(first["cwd"], "/data/run1");
        let second: serde_json::Value = serde_json::from_str(lines[1]).expect("json");
        assert_eq!(second["kind"], "progress");
        assert_eq!(second["elapsed_secs"], 31);
    }

    #[test]
    fn reopening_appends_instead_of_truncating() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("executor.jsonl");
        JsonlSink::open(&path)
            .expect("open")
            .record(&call(0))
            .expect("record");
        JsonlSink::open(&path)
            .expect("reopen")
            .record(&call(1))
            .expect("record");

        let contents = fs::read_to_string(&path).expect("read");
        assert_eq!(contents.lines().count(), 2);
    }
}
