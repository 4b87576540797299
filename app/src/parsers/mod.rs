// ==============================================================================
// parsers/mod.rs - File parser modules
// ==============================================================================
// Description: Parsers for GWAS summary-statistics file formats
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

pub mod sumstats;

pub use sumstats::{open_text, RowView, SumstatsParseError, SumstatsParser};
