//! Append-only audit log of completed prints.
//!
//! One UTF-8 line per completed dispatch:
//!
//! ```text
//! 2026-03-14 09:26:53.589793 - Printed to \\printserver\Card Printer 2 (Triple Keychain)
//! ```

use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::error::CardError;
use crate::layout::LayoutMode;
use crate::printer::PrinterIdentity;

/// Timestamp format of audit lines.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Local>,
    pub printer: PrinterIdentity,
    pub mode: LayoutMode,
}

impl AuditLogEntry {
    pub fn now(printer: PrinterIdentity, mode: LayoutMode) -> Self {
        Self {
            timestamp: Local::now(),
            printer,
            mode,
        }
    }

    /// The line written to the log, without the trailing newline.
    pub fn line(&self) -> String {
        format!(
            "{} - Printed to {} ({})",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.printer,
            self.mode.label()
        )
    }
}

/// Serialized appender for the audit file.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry.
    pub fn append(&self, entry: &AuditLogEntry) -> Result<(), CardError> {
        // A poisoned lock only means another append panicked; the file is still usable.
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", entry.line())?;
        debug!(path = %self.path.display(), "Audit line appended");
        Ok(())
    }

    /// Append one entry, logging instead of failing.
    pub fn record(&self, entry: &AuditLogEntry) {
        if let Err(e) = self.append(entry) {
            warn!(path = %self.path.display(), error = %e, "Could not write audit log");
        }
    }
}
