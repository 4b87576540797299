// ==============================================================================
// catalog.rs - SNP Catalog Persistence and Merging
// ==============================================================================
// Description: Gzip-compressed JSON snapshots of nested SNP catalogs
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================
// Snapshot shape:
//   { "<snp_id>": { "<phenotype>": { "<cohort>": { "chromosome": "1", ... } } } }
// ==============================================================================

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::IgnoredAny;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::models::{MergePolicy, SnpCatalog, SoftwareType, VariantRecord};

pub fn consolidated_file_name(software: SoftwareType) -> String {
    format!("consolidated_snp_data_{}.json.gz", software)
}

pub fn matched_file_name(software: SoftwareType) -> String {
    format!("matched_snp_data_{}.json.gz", software)
}

/// Insert one record, replacing any existing (snp, phenotype, cohort) entry
pub fn insert_record(
    catalog: &mut SnpCatalog,
    snp_id: &str,
    phenotype: &str,
    cohort: &str,
    record: VariantRecord,
) {
    catalog
        .entry(snp_id.to_string())
        .or_default()
        .entry(phenotype.to_string())
        .or_default()
        .insert(cohort.to_string(), record);
}

/// Fold `source` into `target`; `source` wins on conflicts
pub fn merge_catalog(target: &mut SnpCatalog, source: SnpCatalog, policy: MergePolicy) {
    for (snp_id, phenotypes) in source {
        let entry = target.entry(snp_id).or_default();
        for (phenotype, cohorts) in phenotypes {
            match policy {
                MergePolicy::Deep => entry.entry(phenotype).or_default().extend(cohorts),
                MergePolicy::Phenotype => {
                    entry.insert(phenotype, cohorts);
                }
            }
        }
    }
}

/// Write a catalog as compact gzip-compressed JSON
pub fn write_catalog(path: &Path, catalog: &SnpCatalog) -> Result<PathBuf> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create catalog file {:?}", path))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());

    serde_json::to_writer(&mut encoder, catalog).context("Failed to serialize catalog")?;

    encoder
        .finish()
        .context("Failed to finish gzip stream")?
        .flush()
        .context("Failed to flush catalog file")?;

    Ok(path.to_path_buf())
}

pub fn load_catalog(path: &Path) -> Result<SnpCatalog> {
    let file =
        File::open(path).with_context(|| format!("Failed to open catalog file {:?}", path))?;
    let reader = BufReader::new(MultiGzDecoder::new(file));

    serde_json::from_reader(reader).with_context(|| format!("Failed to parse catalog {:?}", path))
}

/// Load only the top-level SNP identifiers; nested records are skipped unparsed
pub fn load_catalog_ids(path: &Path) -> Result<HashSet<String>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open catalog file {:?}", path))?;
    let reader = BufReader::new(MultiGzDecoder::new(file));

    let keys: BTreeMap<String, IgnoredAny> = serde_json::from_reader(reader)
        .with_context(|| format!("Failed to parse catalog {:?}", path))?;

    Ok(keys.into_keys().collect())
}
