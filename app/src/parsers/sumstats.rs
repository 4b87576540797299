// ==============================================================================
// sumstats.rs - GWAS Summary Statistics Parser
// ==============================================================================
// Description: Streaming reader for MR-MEGA / GWAMA summary-statistics tables
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================
// Format: tab-delimited, gzip-compressed (or plain), one header line
// Example:
//   #ID    CHR  POS    REF  ALT  BETA    SE     P       ...  AAF   ...  N      ...  N_STUDY
//   rs123  1    10177  A    AC   0.0123  0.004  1.2e-3  ...  0.42  ...  15023  ...  4
// ==============================================================================

use csv::{ReaderBuilder, StringRecord};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use crate::config::ColumnMapping;
use crate::models::VariantRecord;
use crate::validator;

/// Errors that abort parsing of a whole file
#[derive(Error, Debug)]
pub enum SumstatsParseError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Table read error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("File is empty (no header line)")]
    EmptyFile,
}

/// Open a text table, transparently decompressing gzip/BGZF content
///
/// Compression is detected from the magic number rather than the extension.
pub fn open_text(path: &Path) -> std::io::Result<Box<dyn BufRead>> {
    let compressed = validator::has_gzip_magic(path)?;
    let file = File::open(path)?;

    if compressed {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Borrowed view over one data row that is wide enough for the mapping
pub struct RowView<'a> {
    record: &'a StringRecord,
    mapping: &'a ColumnMapping,
}

impl<'a> RowView<'a> {
    fn field(&self, index: usize) -> &'a str {
        self.record.get(index).unwrap_or_default()
    }

    pub fn snp_id(&self) -> &'a str {
        self.field(self.mapping.id)
    }

    pub fn p_value(&self) -> &'a str {
        self.field(self.mapping.pval)
    }

    /// Line number of the row in the source file (header is line 1)
    pub fn line(&self) -> u64 {
        self.record.position().map_or(0, |p| p.line())
    }

    /// Copy the mapped columns verbatim
    pub fn to_record(&self) -> VariantRecord {
        VariantRecord {
            chromosome: self.field(self.mapping.chr).to_string(),
            position: self.field(self.mapping.pos).to_string(),
            ref_allele: self.field(self.mapping.ref_allele).to_string(),
            alt_allele: self.field(self.mapping.alt_allele).to_string(),
            beta: self.field(self.mapping.beta).to_string(),
            se: self.field(self.mapping.se).to_string(),
            p_value: self.field(self.mapping.pval).to_string(),
            aaf: self.field(self.mapping.aaf).to_string(),
            n: self.field(self.mapping.n).to_string(),
            n_study: self.field(self.mapping.n_study).to_string(),
        }
    }
}

/// Summary-statistics parser with per-file row accounting
pub struct SumstatsParser {
    mapping: ColumnMapping,

    /// Rows narrower than the mapping requires
    pub skipped_count: usize,

    /// Rows that could not be decoded (e.g. invalid UTF-8)
    pub error_count: usize,
}

impl SumstatsParser {
    pub fn new(mapping: ColumnMapping) -> Self {
        Self {
            mapping,
            skipped_count: 0,
            error_count: 0,
        }
    }

    /// Stream every usable data row of `path` into `on_row`
    ///
    /// The header line is skipped. Short rows and undecodable rows are counted
    /// and skipped; only I/O failures (including corrupt compression) abort.
    ///
    /// # Returns
    /// * `Ok(rows)` - number of rows handed to `on_row`
    /// * `Err(SumstatsParseError)` - file could not be read
    pub fn parse_with<F>(&mut self, path: &Path, mut on_row: F) -> Result<usize, SumstatsParseError>
    where
        F: FnMut(RowView<'_>),
    {
        let reader = open_text(path)?;
        let mut table = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .quoting(false)
            .from_reader(reader);

        if table.headers()?.is_empty() {
            return Err(SumstatsParseError::EmptyFile);
        }

        let min_fields = self.mapping.min_fields();
        let mut record = StringRecord::new();
        let mut rows = 0;

        loop {
            match table.read_record(&mut record) {
                Ok(false) => break,
                Ok(true) => {}
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    self.error_count += 1;
                    warn!("Skipping malformed row in {:?}: {}", path, e);
                    continue;
                }
            }

            if record.len() < min_fields {
                self.skipped_count += 1;
                continue;
            }

            on_row(RowView {
                record: &record,
                mapping: &self.mapping,
            });
            rows += 1;
        }

        Ok(rows)
    }
}
