//! Append-only audit trail of every monitor decision
//!
//! Each event is one `yyyy-MM-dd HH:mm:ss: <message>` line. The file is opened and
//! closed per write so operators can move or delete it between events.

use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::Local;
use tracing::{info, warn};

pub const DEFAULT_LOG_FILE: &str = "/var/log/service-portmon.log";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records an event. Write failures are reported on the diagnostic channel and dropped.
    pub fn log(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!(audit = true, "{message}");

        if let Err(err) = self.append(message) {
            warn!(
                path = %self.path.display(),
                error = %err,
                "error writing to log file"
            );
        }
    }

    fn append(&self, message: &str) -> io::Result<()> {
        let line = format_line(&Local::now().format(TIMESTAMP_FORMAT).to_string(), message);

        // A poisoned lock only means another writer panicked mid-line.
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()
    }
}

fn format_line(timestamp: &str, message: &str) -> String {
    format!("{timestamp}: {message}\n")
}
