// ==============================================================================
// discovery.rs - Input File Discovery
// ==============================================================================
// Description: Locates sumstats inputs and tabix subsets by naming convention
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================
// Naming conventions:
//   <phenotype>.<cohort>.<software>.sumstats.txt.gz       (consolidation/subset input)
//   <phenotype>.<cohort>.<software>_pval_<band>.gz        (subset artifact)
//   <phenotype>.<cohort>.<software>_pval_<band>.gz.tbi    (tabix index, never an input)
// ==============================================================================

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::models::SoftwareType;

/// Optional phenotype/cohort restriction applied to discovered files
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileFilter {
    pub phenotype: Option<String>,
    pub cohort: Option<String>,
}

impl FileFilter {
    pub fn new(phenotype: Option<String>, cohort: Option<String>) -> Self {
        Self { phenotype, cohort }
    }

    pub fn matches(&self, phenotype: &str, cohort: &str) -> bool {
        self.phenotype.as_deref().map_or(true, |p| p == phenotype)
            && self.cohort.as_deref().map_or(true, |c| c == cohort)
    }
}

/// Parsed `<phenotype>.<cohort>.<software>.sumstats.txt.gz` name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SumstatsFileName {
    pub phenotype: String,
    pub cohort: String,
    pub software: SoftwareType,
}

impl SumstatsFileName {
    pub fn parse(file_name: &str, software: SoftwareType) -> Option<Self> {
        let suffix = format!(".{}.sumstats.txt.gz", software);
        let stem = file_name.strip_suffix(&suffix)?;
        let (phenotype, cohort) = leading_components(stem)?;

        Some(Self {
            phenotype: phenotype.to_string(),
            cohort: cohort.to_string(),
            software,
        })
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}.{}.{}.sumstats.txt.gz",
            self.phenotype, self.cohort, self.software
        )
    }

    /// Output stem for one p-value band; `.gz` and `.gz.tbi` are appended later
    pub fn subset_stem(&self, band_descriptor: &str) -> String {
        format!(
            "{}.{}.{}_pval_{}",
            self.phenotype, self.cohort, self.software, band_descriptor
        )
    }
}

/// Parsed `<phenotype>.<cohort>.<software>_pval_<band>.gz` name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetFileName {
    pub phenotype: String,
    pub cohort: String,
    pub software: SoftwareType,
    pub band: String,
}

impl SubsetFileName {
    pub fn parse(file_name: &str, software: SoftwareType) -> Option<Self> {
        let stem = file_name.strip_suffix(".gz")?;

        let mut parts = stem.splitn(3, '.');
        let phenotype = parts.next().filter(|s| !s.is_empty())?;
        let cohort = parts.next().filter(|s| !s.is_empty())?;
        let rest = parts.next()?;

        let prefix = format!("{}_pval_", software);
        let band = rest.strip_prefix(&prefix)?;

        Some(Self {
            phenotype: phenotype.to_string(),
            cohort: cohort.to_string(),
            software,
            band: band.to_string(),
        })
    }
}

/// First two dot-separated components; hidden files never match
fn leading_components(stem: &str) -> Option<(&str, &str)> {
    if stem.starts_with('.') {
        return None;
    }
    let mut parts = stem.split('.');
    let phenotype = parts.next().filter(|s| !s.is_empty())?;
    let cohort = parts.next().filter(|s| !s.is_empty())?;
    Some((phenotype, cohort))
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        anyhow::bail!("Input directory not found: {:?}", dir);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn file_name_of(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// Sumstats inputs for one tool, sorted by file name
pub fn find_sumstats_files(
    dir: &Path,
    software: SoftwareType,
    filter: &FileFilter,
) -> Result<Vec<(PathBuf, SumstatsFileName)>> {
    let mut found = Vec::new();
    for path in list_files(dir)? {
        let Some(name) = file_name_of(&path).and_then(|n| SumstatsFileName::parse(n, software))
        else {
            continue;
        };
        if filter.matches(&name.phenotype, &name.cohort) {
            found.push((path, name));
        }
    }

    debug!("Found {} {} sumstats files in {:?}", found.len(), software, dir);
    Ok(found)
}

/// Subset artifacts for one tool, sorted by file name (indexes excluded)
pub fn find_subset_files(
    dir: &Path,
    software: SoftwareType,
    filter: &FileFilter,
) -> Result<Vec<(PathBuf, SubsetFileName)>> {
    let mut found = Vec::new();
    for path in list_files(dir)? {
        let Some(name) = file_name_of(&path).and_then(|n| SubsetFileName::parse(n, software))
        else {
            continue;
        };
        if filter.matches(&name.phenotype, &name.cohort) {
            found.push((path, name));
        }
    }

    debug!("Found {} {} subset files in {:?}", found.len(), software, dir);
    Ok(found)
}
