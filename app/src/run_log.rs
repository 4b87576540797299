// ==============================================================================
// run_log.rs - Per-Run File Log
// ==============================================================================
// Description: Timestamped run log passed explicitly into each processing call
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================
// Line format (appended, one entry per line):
//   2026-10-17 14:03:11 - Matched SNPs in this file: 1824
// ==============================================================================

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::SoftwareType;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RunLogEntry {
    pub timestamp: DateTime<Local>,
    pub severity: LogSeverity,
    pub message: String,
}

impl RunLogEntry {
    pub fn new(severity: LogSeverity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            severity,
            message: message.into(),
        }
    }

    pub fn format_line(&self) -> String {
        format!("{} - {}", self.timestamp.format(TIMESTAMP_FORMAT), self.message)
    }
}

/// Log file scoped to one processing run
///
/// Every entry is mirrored to tracing so the console sees it too. A failed
/// write is reported once through tracing and does not interrupt the run.
pub struct RunLog {
    path: PathBuf,
    file: File,
    run_id: Uuid,
    entries_written: usize,
    write_failed: bool,
}

impl RunLog {
    /// Open (append) a log file
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            run_id: Uuid::new_v4(),
            entries_written: 0,
            write_failed: false,
        })
    }

    pub fn matching_file_name(software: SoftwareType) -> String {
        format!("snp_matching_{}.log", software)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn entries_written(&self) -> usize {
        self.entries_written
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let entry = RunLogEntry::new(LogSeverity::Info, message);
        info!("{}", entry.message);
        self.record(&entry);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let entry = RunLogEntry::new(LogSeverity::Warning, message);
        warn!("{}", entry.message);
        self.record(&entry);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let entry = RunLogEntry::new(LogSeverity::Error, message);
        error!("{}", entry.message);
        self.record(&entry);
    }

    fn record(&mut self, entry: &RunLogEntry) {
        let result = writeln!(self.file, "{}", entry.format_line()).and_then(|_| self.file.flush());

        match result {
            Ok(()) => self.entries_written += 1,
            Err(e) if !self.write_failed => {
                self.write_failed = true;
                warn!("Failed to write run log {:?}: {}", self.path, e);
            }
            Err(_) => {}
        }
    }
}
