// ==============================================================================
// models.rs - Summary Statistics Data Models
// ==============================================================================
// Description: Variant records, nested SNP catalogs and p-value bands
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Meta-analysis software that produced a summary-statistics file
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SoftwareType {
    /// MR-MEGA (multi-ancestry meta-regression)
    Mrmega,
    /// GWAMA (fixed/random effects meta-analysis)
    Gwama,
}

impl SoftwareType {
    /// Processing order used when both tools are selected
    pub const ALL: [SoftwareType; 2] = [SoftwareType::Mrmega, SoftwareType::Gwama];

    pub fn as_str(&self) -> &'static str {
        match self {
            SoftwareType::Mrmega => "mrmega",
            SoftwareType::Gwama => "gwama",
        }
    }
}

impl fmt::Display for SoftwareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool selection accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SoftwareSelection {
    Mrmega,
    Gwama,
    #[default]
    Both,
}

impl SoftwareSelection {
    pub fn software_types(&self) -> Vec<SoftwareType> {
        match self {
            SoftwareSelection::Mrmega => vec![SoftwareType::Mrmega],
            SoftwareSelection::Gwama => vec![SoftwareType::Gwama],
            SoftwareSelection::Both => SoftwareType::ALL.to_vec(),
        }
    }
}

/// Per-cohort statistics for one variant, copied verbatim from the source row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRecord {
    pub chromosome: String,
    pub position: String,
    pub ref_allele: String,
    pub alt_allele: String,
    /// Effect size
    pub beta: String,
    /// Standard error of the effect size
    pub se: String,
    pub p_value: String,
    /// Alternate allele frequency
    pub aaf: String,
    /// Sample size
    pub n: String,
    /// Number of contributing studies
    pub n_study: String,
}

/// cohort -> record
pub type CohortRecords = BTreeMap<String, VariantRecord>;

/// phenotype -> cohort -> record
pub type PhenotypeRecords = BTreeMap<String, CohortRecords>;

/// SNP identifier -> phenotype -> cohort -> record
///
/// Ordered maps keep the serialized snapshot byte-identical across runs over
/// the same input set.
pub type SnpCatalog = BTreeMap<String, PhenotypeRecords>;

/// How records from a later file are folded into an existing catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Merge at cohort level; only identical (snp, phenotype, cohort) triples are replaced
    #[default]
    Deep,
    /// A later phenotype mapping replaces the earlier one for the same SNP wholesale
    Phenotype,
}

/// Outcome of one stage across the selected software types
#[derive(Debug, Clone)]
pub struct StageReport<T> {
    pub summaries: Vec<T>,
    /// Software types that failed outright, with the error message
    pub failed: Vec<(SoftwareType, String)>,
}

impl<T> StageReport<T> {
    pub fn new() -> Self {
        Self {
            summaries: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> Default for StageReport<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Named inclusive p-value range used to produce one filtered subset
#[derive(Debug, Clone, PartialEq)]
pub struct PvalBand {
    pub name: String,
    /// Inclusive lower bound, None = unbounded
    pub min: Option<f64>,
    /// Inclusive upper bound, None = unbounded
    pub max: Option<f64>,
}

impl PvalBand {
    pub fn new(name: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            name: name.into(),
            min,
            max,
        }
    }

    /// Bands produced when none are requested explicitly
    pub fn defaults() -> Vec<PvalBand> {
        vec![
            PvalBand::new("suggestive", None, Some(1e-5)),
            PvalBand::new("nominal", None, Some(1e-1)),
        ]
    }

    /// Closed-interval membership; NaN is never inside a band
    pub fn contains(&self, p_value: f64) -> bool {
        if p_value.is_nan() {
            return false;
        }
        self.min.map_or(true, |min| p_value >= min) && self.max.map_or(true, |max| p_value <= max)
    }

    /// Band descriptor embedded in subset file names (e.g. `up_to_1e-05`)
    pub fn descriptor(&self) -> String {
        match (self.min, self.max) {
            (None, None) => "all".to_string(),
            (Some(min), None) => format!("{}_and_above", format_bound(min)),
            (None, Some(max)) => format!("up_to_{}", format_bound(max)),
            (Some(min), Some(max)) => format!("{}_to_{}", format_bound(min), format_bound(max)),
        }
    }
}

impl fmt::Display for PvalBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min = self.min.map_or("-inf".to_string(), format_bound);
        let max = self.max.map_or("+inf".to_string(), format_bound);
        write!(f, "{} [{}, {}]", self.name, min, max)
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum BandParseError {
    #[error("Expected MIN:MAX, got '{0}'")]
    MissingSeparator(String),

    #[error("Invalid bound '{0}'")]
    InvalidBound(String),

    #[error("Lower bound {min} exceeds upper bound {max}")]
    Inverted { min: f64, max: f64 },
}

impl FromStr for PvalBand {
    type Err = BandParseError;

    /// Parse `MIN:MAX`; an empty side, `-` or `none` leaves that side unbounded
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (min, max) = s
            .split_once(':')
            .ok_or_else(|| BandParseError::MissingSeparator(s.to_string()))?;

        let min = parse_bound(min)?;
        let max = parse_bound(max)?;

        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(BandParseError::Inverted { min: lo, max: hi });
            }
        }

        let mut band = PvalBand::new("", min, max);
        band.name = band.descriptor();
        Ok(band)
    }
}

fn parse_bound(raw: &str) -> Result<Option<f64>, BandParseError> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "-" || raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }

    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(BandParseError::InvalidBound(raw.to_string())),
    }
}

/// Shortest float repr, switching to a two-digit exponent outside [1e-4, 1e16)
///
/// Matches the names already used by published subset artifacts:
/// `1e-05`, `5e-08`, `0.1`, `1.0`.
pub fn format_bound(value: f64) -> String {
    let magnitude = value.abs();
    if value == 0.0 || (1e-4..1e16).contains(&magnitude) {
        let plain = value.to_string();
        if plain.contains('.') {
            plain
        } else {
            format!("{}.0", plain)
        }
    } else {
        let scientific = format!("{:e}", value);
        match scientific.split_once('e') {
            Some((mantissa, exponent)) => {
                let exponent: i32 = exponent.parse().unwrap_or(0);
                let sign = if exponent < 0 { '-' } else { '+' };
                format!("{}e{}{:02}", mantissa, sign, exponent.abs())
            }
            None => scientific,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_contains_is_inclusive() {
        let band = PvalBand::new("window", Some(1e-8), Some(1e-5));
        assert!(band.contains(1e-8));
        assert!(band.contains(1e-5));
        assert!(band.contains(3e-6));
        assert!(!band.contains(2e-5));
        assert!(!band.contains(1e-9));
    }

    #[test]
    fn test_band_upper_bound_examples() {
        let strict = PvalBand::new("suggestive", None, Some(1e-5));
        let loose = PvalBand::new("nominal", None, Some(1e-1));

        assert!(!strict.contains(0.5));
        assert!(!loose.contains(0.5));
        assert!(loose.contains(0.05));
        assert!(strict.contains(0.0));
    }

    #[test]
    fn test_unbounded_band_rejects_nan_only() {
        let all = PvalBand::new("all", None, None);
        assert!(all.contains(1.0));
        assert!(all.contains(f64::INFINITY));
        assert!(!all.contains(f64::NAN));
    }

    #[test]
    fn test_format_bound() {
        assert_eq!(format_bound(1e-5), "1e-05");
        assert_eq!(format_bound(5e-8), "5e-08");
        assert_eq!(format_bound(2.5e-8), "2.5e-08");
        assert_eq!(format_bound(1e-1), "0.1");
        assert_eq!(format_bound(1e-4), "0.0001");
        assert_eq!(format_bound(1.0), "1.0");
        assert_eq!(format_bound(0.0), "0.0");
    }

    #[test]
    fn test_band_descriptor() {
        let bands = PvalBand::defaults();
        assert_eq!(bands[0].descriptor(), "up_to_1e-05");
        assert_eq!(bands[1].descriptor(), "up_to_0.1");

        assert_eq!(PvalBand::new("x", Some(0.05), None).descriptor(), "0.05_and_above");
        assert_eq!(
            PvalBand::new("x", Some(1e-8), Some(1e-5)).descriptor(),
            "1e-08_to_1e-05"
        );
    }

    #[test]
    fn test_band_from_str() {
        let band: PvalBand = ":1e-5".parse().unwrap();
        assert_eq!(band.min, None);
        assert_eq!(band.max, Some(1e-5));
        assert_eq!(band.name, "up_to_1e-05");

        let band: PvalBand = "none:-".parse().unwrap();
        assert_eq!((band.min, band.max), (None, None));

        assert_eq!(
            "1e-5".parse::<PvalBand>(),
            Err(BandParseError::MissingSeparator("1e-5".to_string()))
        );
        assert!(matches!(
            "abc:1".parse::<PvalBand>(),
            Err(BandParseError::InvalidBound(_))
        ));
        assert!(matches!(
            "0.5:0.1".parse::<PvalBand>(),
            Err(BandParseError::Inverted { .. })
        ));
    }

    #[test]
    fn test_software_selection() {
        assert_eq!(
            SoftwareSelection::Both.software_types(),
            vec![SoftwareType::Mrmega, SoftwareType::Gwama]
        );
        assert_eq!(
            SoftwareSelection::Gwama.software_types(),
            vec![SoftwareType::Gwama]
        );
        assert_eq!(SoftwareType::Mrmega.to_string(), "mrmega");
    }

    #[test]
    fn test_variant_record_serde_field_names() {
        let record = VariantRecord {
            chromosome: "1".to_string(),
            position: "12345".to_string(),
            ref_allele: "A".to_string(),
            alt_allele: "G".to_string(),
            beta: "0.01".to_string(),
            se: "0.002".to_string(),
            p_value: "1e-6".to_string(),
            aaf: "0.3".to_string(),
            n: "10000".to_string(),
            n_study: "3".to_string(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["ref_allele"], "A");
        assert_eq!(json["p_value"], "1e-6");
        assert_eq!(json["n_study"], "3");
    }
}
