// ==============================================================================
// validator.rs - Input and Artifact Validation
// ==============================================================================
// Description: Column-layout sampling, gzip/BGZF magic checks, SHA-256 digests
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufRead, Read};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::{ColumnMapping, LayoutError};
use crate::models::SoftwareType;
use crate::parsers::open_text;

/// Gzip member header (deflate)
const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// BGZF block header: gzip with FEXTRA set
const BGZF_MAGIC: [u8; 4] = [0x1f, 0x8b, 0x08, 0x04];

/// BGZF extra subfield identifier at offset 12
const BGZF_SUBFIELD: [u8; 2] = [b'B', b'C'];

/// Data rows inspected when checking a column layout
pub const DEFAULT_SAMPLE_LINES: usize = 1000;

/// Read up to `len` leading bytes; shorter files return what they have
pub fn read_magic_number(path: &Path, len: usize) -> std::io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut buffer = Vec::with_capacity(len);
    file.take(len as u64).read_to_end(&mut buffer)?;
    Ok(buffer)
}

pub fn has_gzip_magic(path: &Path) -> std::io::Result<bool> {
    Ok(read_magic_number(path, GZIP_MAGIC.len())?.starts_with(&GZIP_MAGIC))
}

/// True when the file starts with a BGZF block (what bgzip writes and tabix needs)
pub fn is_bgzf(path: &Path) -> std::io::Result<bool> {
    let header = read_magic_number(path, 14)?;
    Ok(header.len() == 14 && header.starts_with(&BGZF_MAGIC) && header[12..14] == BGZF_SUBFIELD)
}

pub fn compute_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Outcome of sampling a file against a column layout
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutReport {
    pub sampled_rows: usize,
    pub max_width: usize,
    /// Sampled rows narrower than the layout requires
    pub narrow_rows: usize,
}

/// Result of sampling one candidate file
#[derive(Debug)]
pub enum LayoutSample {
    /// The layout fits the sampled rows
    Verified(LayoutReport),
    /// Header only; nothing to judge the layout by
    Empty,
    /// The file itself could not be read; the layout is still unchecked
    Unreadable(anyhow::Error),
}

/// Fail-fast check that a tool's column layout fits its files
pub struct LayoutValidator {
    sample_lines: usize,
}

impl LayoutValidator {
    pub fn new() -> Self {
        Self {
            sample_lines: DEFAULT_SAMPLE_LINES,
        }
    }

    pub fn with_sample_lines(mut self, lines: usize) -> Self {
        self.sample_lines = lines;
        self
    }

    /// Sample `path` against the layout registered for `software`
    ///
    /// `Err` is reserved for a layout that cannot fit: structurally invalid,
    /// or no sampled row wide enough to reach the highest configured column.
    /// Read failures only disqualify this file and come back as `Unreadable`.
    pub fn sample(&self, path: &Path, software: SoftwareType) -> Result<LayoutSample, LayoutError> {
        let mapping = ColumnMapping::for_software(software);
        mapping.validate()?;

        let required = mapping.min_fields();
        let report = match self.measure(path, required) {
            Ok(report) => report,
            Err(e) => {
                warn!("Could not sample {:?} for layout check: {:#}", path, e);
                return Ok(LayoutSample::Unreadable(e));
            }
        };

        if report.sampled_rows == 0 {
            warn!("No data rows to sample in {:?}; layout for {} unchecked", path, software);
            return Ok(LayoutSample::Empty);
        }

        if report.max_width < required {
            return Err(LayoutError::TooNarrow {
                software,
                required,
                observed: report.max_width,
            });
        }

        if report.narrow_rows > 0 {
            debug!(
                "{} of {} sampled rows in {:?} are narrower than {} columns",
                report.narrow_rows, report.sampled_rows, path, required
            );
        }

        info!(
            "Column layout for {} validated against {:?} ({} rows sampled)",
            software, path, report.sampled_rows
        );

        Ok(LayoutSample::Verified(report))
    }

    fn measure(&self, path: &Path, required: usize) -> Result<LayoutReport> {
        let mut reader = open_text(path)
            .with_context(|| format!("Failed to open {:?} for layout check", path))?;

        let mut line = Vec::new();
        // Header
        reader.read_until(b'\n', &mut line)?;

        let mut report = LayoutReport {
            sampled_rows: 0,
            max_width: 0,
            narrow_rows: 0,
        };

        while report.sampled_rows < self.sample_lines {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }

            let trimmed = trim_line_ending(&line);
            if trimmed.is_empty() {
                continue;
            }

            let width = trimmed.iter().filter(|&&b| b == b'\t').count() + 1;
            report.sampled_rows += 1;
            report.max_width = report.max_width.max(width);
            if width < required {
                report.narrow_rows += 1;
            }
        }

        Ok(report)
    }
}

impl Default for LayoutValidator {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn trim_line_ending(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}
