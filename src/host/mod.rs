//! Host runtime boundary.
//!
//! The host owns the lifecycle (`init` → schema → data gathering), credential
//! persistence and table ingestion. The connector calls back into it only to
//! append rows, report progress, and abort a run with a user-visible message.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;
use tracing::warn;

use crate::rows::OutputRow;
use crate::schema::TableId;

/// Lifecycle phase the host is running the connector in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Interactive,
    Auth,
    GatherData,
}

/// Callbacks offered by the host runtime.
///
/// All methods take `&self`; implementations synchronize internally.
pub trait Host: Send + Sync {
    /// Appends rows to a table. Append-only and order-preserving; may be
    /// called several times per table.
    fn append_rows(&self, table: TableId, rows: Vec<OutputRow>);

    /// Best-effort human-readable status.
    fn report_progress(&self, message: &str);

    /// Ends the run with a user-visible message.
    fn abort_with_error(&self, message: &str);
}

#[derive(Debug, Default)]
struct Recorded {
    tables: HashMap<TableId, Vec<OutputRow>>,
    append_calls: usize,
    progress: Vec<String>,
    aborts: Vec<String>,
}

/// In-memory host that records everything it receives.
#[derive(Debug, Default)]
pub struct RecordingHost {
    inner: Mutex<Recorded>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows appended to `table` so far, in append order.
    pub fn rows(&self, table: TableId) -> Vec<OutputRow> {
        self.inner
            .lock()
            .unwrap()
            .tables
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of `append_rows` calls across all tables.
    pub fn append_calls(&self) -> usize {
        self.inner.lock().unwrap().append_calls
    }

    pub fn progress(&self) -> Vec<String> {
        self.inner.lock().unwrap().progress.clone()
    }

    pub fn aborts(&self) -> Vec<String> {
        self.inner.lock().unwrap().aborts.clone()
    }
}

impl Host for RecordingHost {
    fn append_rows(&self, table: TableId, rows: Vec<OutputRow>) {
        let mut inner = self.inner.lock().unwrap();
        inner.append_calls += 1;
        inner.tables.entry(table).or_default().extend(rows);
    }

    fn report_progress(&self, message: &str) {
        self.inner.lock().unwrap().progress.push(message.to_string());
    }

    fn abort_with_error(&self, message: &str) {
        self.inner.lock().unwrap().aborts.push(message.to_string());
    }
}

/// Host that writes each row as one JSON line: `{"table": .., "row": {..}}`.
///
/// Progress goes to the log; aborts are logged and remembered so a headless
/// caller can turn them into an exit status.
pub struct JsonLinesHost<W: Write + Send> {
    out: Mutex<W>,
    aborted: Mutex<Option<String>>,
}

impl<W: Write + Send> JsonLinesHost<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            aborted: Mutex::new(None),
        }
    }

    /// First abort message received, if any.
    pub fn abort_message(&self) -> Option<String> {
        self.aborted.lock().unwrap().clone()
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write + Send> Host for JsonLinesHost<W> {
    fn append_rows(&self, table: TableId, rows: Vec<OutputRow>) {
        let mut out = self.out.lock().unwrap();
        for row in rows {
            let line = serde_json::json!({ "table": table, "row": row });
            if let Err(e) = writeln!(out, "{}", line) {
                warn!(table = %table, error = %e, "Failed to write row");
                return;
            }
        }
        if let Err(e) = out.flush() {
            warn!(table = %table, error = %e, "Failed to flush rows");
        }
    }

    fn report_progress(&self, message: &str) {
        tracing::info!(progress = %message, "Progress");
    }

    fn abort_with_error(&self, message: &str) {
        tracing::error!(reason = %message, "Run aborted");
        let mut aborted = self.aborted.lock().unwrap();
        if aborted.is_none() {
            *aborted = Some(message.to_string());
        }
    }
}
