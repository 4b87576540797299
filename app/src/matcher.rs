// ==============================================================================
// matcher.rs - SNP Re-Matching Against a Consolidated Catalog
// ==============================================================================
// Description: Rebuilds a catalog from tabix subsets, keeping only SNPs known
//              to the consolidated catalog of the same software type
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::catalog::{self, consolidated_file_name, insert_record, matched_file_name, merge_catalog};
use crate::config::ColumnMapping;
use crate::discovery::{find_subset_files, FileFilter, SubsetFileName};
use crate::models::{MergePolicy, SnpCatalog, SoftwareSelection, SoftwareType, StageReport};
use crate::parsers::SumstatsParser;
use crate::run_log::RunLog;

#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Directory holding `<pheno>.<cohort>.<sw>_pval_<band>.gz` subsets
    pub input_dir: PathBuf,
    /// Directory holding `consolidated_snp_data_<sw>.json.gz`
    pub consolidated_dir: PathBuf,
    pub output_dir: PathBuf,
    pub filter: FileFilter,
    pub merge_policy: MergePolicy,
}

/// Matches found in one subset file
#[derive(Debug, Clone, PartialEq)]
pub struct FileMatch {
    pub file_name: String,
    pub matched: usize,
}

#[derive(Debug, Clone)]
pub struct MatchSummary {
    pub software: SoftwareType,
    pub files: Vec<FileMatch>,
    pub failed_files: Vec<PathBuf>,
    /// Distinct SNP identifiers matched across all files
    pub total_matched: usize,
    pub output_path: PathBuf,
}

pub struct SnpMatcher {
    config: MatchConfig,
}

impl SnpMatcher {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    /// Match every selected software type
    ///
    /// A software type whose consolidated catalog cannot be loaded fails on
    /// its own; the remaining types still run.
    pub async fn run(&self, selection: SoftwareSelection) -> Result<StageReport<MatchSummary>> {
        std::fs::create_dir_all(&self.config.output_dir).with_context(|| {
            format!("Failed to create output directory {:?}", self.config.output_dir)
        })?;

        let mut report = StageReport::new();
        for software in selection.software_types() {
            match self.process_software_type(software).await {
                Ok(Some(summary)) => report.summaries.push(summary),
                Ok(None) => {}
                Err(e) => {
                    error!("Matching failed for {}: {:#}", software, e);
                    report.failed.push((software, format!("{:#}", e)));
                }
            }
        }
        Ok(report)
    }

    pub async fn process_software_type(&self, software: SoftwareType) -> Result<Option<MatchSummary>> {
        let log_path = self
            .config
            .output_dir
            .join(RunLog::matching_file_name(software));
        let mut run_log = RunLog::open(&log_path)
            .with_context(|| format!("Failed to open run log {:?}", log_path))?;

        info!("Run {} logging to {:?}", run_log.run_id(), run_log.path());
        run_log.info(format!("Starting processing for {}", software));

        let consolidated_path = self
            .config
            .consolidated_dir
            .join(consolidated_file_name(software));
        let known_ids = match catalog::load_catalog_ids(&consolidated_path) {
            Ok(ids) => ids,
            Err(e) => {
                run_log.error(format!(
                    "Failed to load consolidated data {:?}: {:#}",
                    consolidated_path, e
                ));
                return Err(e);
            }
        };
        if known_ids.is_empty() {
            run_log.warn(format!(
                "Consolidated data for {} is empty; no SNPs can match",
                software
            ));
        } else {
            info!("Loaded {} consolidated SNPs for {}", known_ids.len(), software);
        }

        let files = find_subset_files(&self.config.input_dir, software, &self.config.filter)?;
        if files.is_empty() {
            run_log.info(format!("No tabix files found for {}", software));
            return Ok(None);
        }

        let mapping = ColumnMapping::for_software(software);
        let total_files = files.len();
        let mut matched_catalog = SnpCatalog::new();
        let mut all_matched = HashSet::new();
        let mut summary_files = Vec::new();
        let mut failed_files = Vec::new();

        info!("Processing {} files...", software);

        for (index, (path, name)) in files.iter().enumerate() {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            run_log.info(format!(
                "Processing file {}/{}: {}",
                index + 1,
                total_files,
                file_name
            ));

            match process_file(path, name, &known_ids, mapping) {
                Ok((file_data, matched)) => {
                    run_log.info(format!("File: {}", file_name));
                    run_log.info(format!("Matched SNPs in this file: {}", matched.len()));
                    run_log.info("--------------------");

                    summary_files.push(FileMatch {
                        file_name,
                        matched: matched.len(),
                    });
                    all_matched.extend(matched);
                    merge_catalog(&mut matched_catalog, file_data, self.config.merge_policy);
                }
                Err(e) => {
                    run_log.error(format!("Error processing {:?}: {:#}", path, e));
                    failed_files.push(path.clone());
                }
            }
        }

        let output_path = self.config.output_dir.join(matched_file_name(software));
        catalog::write_catalog(&output_path, &matched_catalog)?;
        info!("{} data saved to {:?}", software, output_path);

        run_log.info(format!(
            "Total matched SNPs for {}: {}",
            software,
            all_matched.len()
        ));
        run_log.info("Processing completed");

        Ok(Some(MatchSummary {
            software,
            files: summary_files,
            failed_files,
            total_matched: all_matched.len(),
            output_path,
        }))
    }
}

/// Collect rows of one subset file whose SNP appears in `known_ids`
pub fn process_file(
    path: &Path,
    name: &SubsetFileName,
    known_ids: &HashSet<String>,
    mapping: &ColumnMapping,
) -> Result<(SnpCatalog, HashSet<String>)> {
    let mut parser = SumstatsParser::new(*mapping);
    let mut file_data = SnpCatalog::new();
    let mut matched = HashSet::new();

    parser
        .parse_with(path, |row| {
            let snp_id = row.snp_id();
            if !known_ids.contains(snp_id) {
                return;
            }
            matched.insert(snp_id.to_string());
            insert_record(
                &mut file_data,
                snp_id,
                &name.phenotype,
                &name.cohort,
                row.to_record(),
            );
        })
        .with_context(|| format!("Failed to read {:?}", path))?;

    Ok((file_data, matched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::record;
    use crate::catalog::{load_catalog, write_catalog};
    use crate::parsers::sumstats::fixtures::{row, write_gz, HEADER};
    use tempfile::{tempdir, TempDir};

    struct Dirs {
        input: TempDir,
        consolidated: TempDir,
        output: TempDir,
    }

    fn setup(known: &[&str]) -> Dirs {
        let dirs = Dirs {
            input: tempdir().unwrap(),
            consolidated: tempdir().unwrap(),
            output: tempdir().unwrap(),
        };
        let mut catalog = SnpCatalog::new();
        for id in known {
            insert_record(&mut catalog, id, "height", "UKBB", record("0.1"));
        }
        write_catalog(
            &dirs
                .consolidated
                .path()
                .join(consolidated_file_name(SoftwareType::Mrmega)),
            &catalog,
        )
        .unwrap();
        dirs
    }

    fn write_subset(dir: &Path, name: &str, rows: &[String]) {
        let mut lines = vec![HEADER.to_string()];
        lines.extend_from_slice(rows);
        write_gz(&dir.join(name), &lines);
    }

    fn matcher(dirs: &Dirs, merge_policy: MergePolicy) -> SnpMatcher {
        SnpMatcher::new(MatchConfig {
            input_dir: dirs.input.path().to_path_buf(),
            consolidated_dir: dirs.consolidated.path().to_path_buf(),
            output_dir: dirs.output.path().to_path_buf(),
            filter: FileFilter::default(),
            merge_policy,
        })
    }

    #[tokio::test]
    async fn test_only_known_snps_are_matched() {
        let dirs = setup(&["rs1", "rs2"]);
        write_subset(
            dirs.input.path(),
            "height.UKBB.mrmega_pval_up_to_0.1.gz",
            &[
                row("rs1", "1", 10, "0.01", "0.5"),
                row("rs99", "1", 20, "0.02", "0.5"),
            ],
        );
        write_subset(
            dirs.input.path(),
            "height.FinnGen.mrmega_pval_up_to_0.1.gz",
            &[row("rs2", "2", 30, "0.03", "0.6"), row("rs1", "1", 10, "0.04", "0.7")],
        );
        // Index files sit next to the subsets and are never read as data
        std::fs::write(
            dirs.input.path().join("height.UKBB.mrmega_pval_up_to_0.1.gz.tbi"),
            b"TBI\x01",
        )
        .unwrap();

        let summary = matcher(&dirs, MergePolicy::Deep)
            .process_software_type(SoftwareType::Mrmega)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(summary.files.len(), 2);
        assert!(summary.failed_files.is_empty());
        assert_eq!(summary.total_matched, 2);

        let matched = load_catalog(&summary.output_path).unwrap();
        let ids: Vec<&str> = matched.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["rs1", "rs2"]);
        assert_eq!(matched["rs1"]["height"].len(), 2);
        assert_eq!(matched["rs1"]["height"]["FinnGen"].beta, "0.7");
    }

    #[tokio::test]
    async fn test_phenotype_policy_replaces_cohorts() {
        let dirs = setup(&["rs1"]);
        write_subset(
            dirs.input.path(),
            "height.A.mrmega_pval_up_to_0.1.gz",
            &[row("rs1", "1", 10, "0.01", "0.1")],
        );
        write_subset(
            dirs.input.path(),
            "height.B.mrmega_pval_up_to_0.1.gz",
            &[row("rs1", "1", 10, "0.02", "0.2")],
        );

        let summary = matcher(&dirs, MergePolicy::Phenotype)
            .process_software_type(SoftwareType::Mrmega)
            .await
            .unwrap()
            .unwrap();

        let matched = load_catalog(&summary.output_path).unwrap();
        let height = &matched["rs1"]["height"];
        assert_eq!(height.len(), 1);
        assert!(height.contains_key("B"));
    }

    #[tokio::test]
    async fn test_run_log_records_progress() {
        let dirs = setup(&["rs1"]);
        write_subset(
            dirs.input.path(),
            "bmi.UKBB.mrmega_pval_up_to_1e-05.gz",
            &[row("rs1", "1", 10, "1e-9", "0.1")],
        );

        matcher(&dirs, MergePolicy::Deep)
            .run(SoftwareSelection::Mrmega)
            .await
            .unwrap();

        let log = std::fs::read_to_string(dirs.output.path().join("snp_matching_mrmega.log")).unwrap();
        let messages: Vec<&str> = log
            .lines()
            .map(|l| l.split_once(" - ").unwrap().1)
            .collect();
        assert_eq!(
            messages,
            vec![
                "Starting processing for mrmega",
                "Processing file 1/1: bmi.UKBB.mrmega_pval_up_to_1e-05.gz",
                "File: bmi.UKBB.mrmega_pval_up_to_1e-05.gz",
                "Matched SNPs in this file: 1",
                "--------------------",
                "Total matched SNPs for mrmega: 1",
                "Processing completed",
            ]
        );
    }

    #[tokio::test]
    async fn test_unreadable_file_is_logged_and_skipped() {
        let dirs = setup(&["rs1"]);
        std::fs::write(
            dirs.input.path().join("height.A.mrmega_pval_up_to_0.1.gz"),
            [0x1f, 0x8b, 0x08, 0x00, 0xba, 0xad],
        )
        .unwrap();
        write_subset(
            dirs.input.path(),
            "height.B.mrmega_pval_up_to_0.1.gz",
            &[row("rs1", "1", 10, "0.02", "0.2")],
        );

        let summary = matcher(&dirs, MergePolicy::Deep)
            .process_software_type(SoftwareType::Mrmega)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(summary.failed_files.len(), 1);
        assert_eq!(summary.total_matched, 1);

        let log = std::fs::read_to_string(dirs.output.path().join("snp_matching_mrmega.log")).unwrap();
        assert!(log.contains("Error processing"));
    }

    #[tokio::test]
    async fn test_missing_catalog_fails_software_type() {
        let dirs = setup(&[]);

        let result = matcher(&dirs, MergePolicy::Deep)
            .process_software_type(SoftwareType::Gwama)
            .await;
        assert!(result.is_err());

        let log = std::fs::read_to_string(dirs.output.path().join("snp_matching_gwama.log")).unwrap();
        assert!(log.contains("Failed to load consolidated data"));
    }

    #[tokio::test]
    async fn test_empty_catalog_is_warned() {
        let dirs = setup(&[]);
        write_subset(
            dirs.input.path(),
            "height.A.mrmega_pval_up_to_0.1.gz",
            &[row("rs1", "1", 10, "0.01", "0.1")],
        );

        let summary = matcher(&dirs, MergePolicy::Deep)
            .process_software_type(SoftwareType::Mrmega)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.total_matched, 0);

        let log = std::fs::read_to_string(dirs.output.path().join("snp_matching_mrmega.log")).unwrap();
        assert!(log.contains("Consolidated data for mrmega is empty; no SNPs can match"));
    }

    #[tokio::test]
    async fn test_no_subsets_writes_nothing() {
        let dirs = setup(&["rs1"]);

        let summary = matcher(&dirs, MergePolicy::Deep)
            .process_software_type(SoftwareType::Mrmega)
            .await
            .unwrap();

        assert!(summary.is_none());
        assert!(!dirs
            .output
            .path()
            .join(matched_file_name(SoftwareType::Mrmega))
            .exists());
    }
}
