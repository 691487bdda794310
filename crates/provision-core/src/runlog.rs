//! Append-only run log.
//!
//! One file per entry point per calendar day, `<script>-<YYYY-MM-DD>.log`,
//! never truncated or rotated here. Every line is mirrored to `tracing` so the
//! terminal sees the same record. Timestamps and file dates are UTC.
//!
//! Lines are written as given. Secret values never reach a message: `Secret`
//! formats as a mask and `CommandSpec::display` leaves out stdin and env.

use crate::error::Result;
use chrono::{NaiveDate, SecondsFormat, Utc};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

pub struct RunLog {
    path: PathBuf,
    file: File,
}

impl RunLog {
    pub fn file_name(script: &str, date: NaiveDate) -> String {
        format!("{script}-{}.log", date.format("%Y-%m-%d"))
    }

    /// Open (or create) today's log for `script` under `dir`.
    pub fn open(dir: &Path, script: &str) -> Result<Self> {
        Self::open_for_date(dir, script, Utc::now().date_naive())
    }

    pub fn open_for_date(dir: &Path, script: &str, date: NaiveDate) -> Result<Self> {
        crate::io::ensure_dir(dir)?;
        let path = dir.join(Self::file_name(script, date));
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&mut self, message: impl AsRef<str>) {
        self.append(LogLevel::Info, message.as_ref());
    }

    pub fn warn(&mut self, message: impl AsRef<str>) {
        self.append(LogLevel::Warn, message.as_ref());
    }

    pub fn error(&mut self, message: impl AsRef<str>) {
        self.append(LogLevel::Error, message.as_ref());
    }

    fn append(&mut self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let line = format!("{stamp} {} {message}\n", level.as_str());
        // A log write failure must not change the run's outcome.
        if let Err(e) = self.file.write_all(line.as_bytes()) {
            tracing::warn!(path = %self.path.display(), "run log write failed: {e}");
        }
    }
}
