// ==============================================================================
// config.rs - Column Layouts and External Tool Configuration
// ==============================================================================
// Description: Per-software column offsets and paths to sort/bgzip/tabix
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================
// Column layout (zero-based, shared by MR-MEGA and GWAMA output):
//   #ID  CHR  POS  REF  ALT  BETA  SE  P  ...  AAF(12)  ...  N(16)  ...  N_STUDY(18)
// ==============================================================================

use std::path::PathBuf;
use thiserror::Error;

use crate::models::SoftwareType;

/// Zero-based column offsets of the fields extracted from a sumstats row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMapping {
    pub id: usize,
    pub chr: usize,
    pub pos: usize,
    pub ref_allele: usize,
    pub alt_allele: usize,
    pub beta: usize,
    pub se: usize,
    pub pval: usize,
    pub aaf: usize,
    pub n: usize,
    pub n_study: usize,
}

/// Errors raised when a column layout does not fit the data it describes
#[derive(Error, Debug, PartialEq)]
pub enum LayoutError {
    #[error("Columns '{first}' and '{second}' share index {index}")]
    DuplicateIndex {
        first: &'static str,
        second: &'static str,
        index: usize,
    },

    #[error("Layout for {software} needs {required} columns but sampled rows have at most {observed}")]
    TooNarrow {
        software: SoftwareType,
        required: usize,
        observed: usize,
    },
}

impl ColumnMapping {
    /// Layout written by both MR-MEGA and GWAMA pipelines
    pub const STANDARD: ColumnMapping = ColumnMapping {
        id: 0,
        chr: 1,
        pos: 2,
        ref_allele: 3,
        alt_allele: 4,
        beta: 5,
        se: 6,
        pval: 7,
        aaf: 12,
        n: 16,
        n_study: 18,
    };

    /// Single registry of layouts, keyed by tool
    pub fn for_software(software: SoftwareType) -> &'static ColumnMapping {
        match software {
            SoftwareType::Mrmega | SoftwareType::Gwama => &Self::STANDARD,
        }
    }

    fn named_indices(&self) -> [(&'static str, usize); 11] {
        [
            ("id", self.id),
            ("chr", self.chr),
            ("pos", self.pos),
            ("ref", self.ref_allele),
            ("alt", self.alt_allele),
            ("beta", self.beta),
            ("se", self.se),
            ("pval", self.pval),
            ("aaf", self.aaf),
            ("n", self.n),
            ("n_study", self.n_study),
        ]
    }

    pub fn max_index(&self) -> usize {
        self.named_indices()
            .iter()
            .map(|(_, index)| *index)
            .max()
            .unwrap_or(0)
    }

    /// Rows narrower than this are skipped
    pub fn min_fields(&self) -> usize {
        self.max_index() + 1
    }

    /// Structural check: every field reads from its own column
    pub fn validate(&self) -> Result<(), LayoutError> {
        let indices = self.named_indices();
        for (i, (first, index)) in indices.iter().enumerate() {
            if let Some((second, _)) = indices[i + 1..].iter().find(|(_, other)| other == index) {
                return Err(LayoutError::DuplicateIndex {
                    first: *first,
                    second: *second,
                    index: *index,
                });
            }
        }
        Ok(())
    }

    /// 1-based (chr, pos, pval) keys for `sort -k` and `tabix -s/-b`
    pub fn one_based_sort_keys(&self) -> (usize, usize, usize) {
        (self.chr + 1, self.pos + 1, self.pval + 1)
    }
}

/// Locations and tuning of the external binaries used for subsetting
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPaths {
    pub sort: PathBuf,
    pub bgzip: PathBuf,
    pub tabix: PathBuf,
    /// Passed to `sort -S` when set (e.g. "2G")
    pub sort_buffer: Option<String>,
    /// Passed to `sort -T` when set
    pub sort_tmpdir: Option<PathBuf>,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            sort: PathBuf::from("sort"),
            bgzip: PathBuf::from("bgzip"),
            tabix: PathBuf::from("tabix"),
            sort_buffer: None,
            sort_tmpdir: None,
        }
    }
}
