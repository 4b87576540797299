// ==============================================================================
// consolidate.rs - Consolidated SNP Catalog Builder
// ==============================================================================
// Description: Merges per-phenotype/per-cohort sumstats into one SNP catalog
//              per software type
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::catalog::{self, consolidated_file_name, insert_record, merge_catalog};
use crate::config::ColumnMapping;
use crate::discovery::{find_sumstats_files, FileFilter, SumstatsFileName};
use crate::models::{MergePolicy, SnpCatalog, SoftwareSelection, SoftwareType, StageReport};
use crate::parsers::SumstatsParser;
use crate::validator::{LayoutSample, LayoutValidator};

/// Row accounting for one input file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileStats {
    pub rows: usize,
    pub skipped_rows: usize,
    pub malformed_rows: usize,
}

/// Result of consolidating one software type
#[derive(Debug, Clone)]
pub struct ConsolidationSummary {
    pub software: SoftwareType,
    pub output_path: PathBuf,
    pub files_processed: usize,
    pub failed_files: Vec<PathBuf>,
    pub total_snps: usize,
}

pub struct Consolidator {
    input_dir: PathBuf,
    output_dir: PathBuf,
    filter: FileFilter,
}

impl Consolidator {
    pub fn new(input_dir: PathBuf, output_dir: PathBuf, filter: FileFilter) -> Self {
        Self {
            input_dir,
            output_dir,
            filter,
        }
    }

    /// Consolidate every selected software type
    ///
    /// A software type that fails outright (unreadable directory, layout
    /// mismatch, unwritable output) is logged and the next one still runs.
    pub async fn run(&self, selection: SoftwareSelection) -> Result<StageReport<ConsolidationSummary>> {
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("Failed to create output directory {:?}", self.output_dir))?;

        let mut report = StageReport::new();
        for software in selection.software_types() {
            match self.process_software_type(software).await {
                Ok(Some(summary)) => report.summaries.push(summary),
                Ok(None) => {}
                Err(e) => {
                    error!("Consolidation failed for {}: {:#}", software, e);
                    report.failed.push((software, format!("{:#}", e)));
                }
            }
        }
        Ok(report)
    }

    pub async fn process_software_type(
        &self,
        software: SoftwareType,
    ) -> Result<Option<ConsolidationSummary>> {
        let files = find_sumstats_files(&self.input_dir, software, &self.filter)?;

        if files.is_empty() {
            info!("No files found for {}", software);
            return Ok(None);
        }

        info!("Processing {} files ({} found)...", software, files.len());

        let validator = LayoutValidator::new();
        let mapping = ColumnMapping::for_software(software);
        let mut layout_verified = false;
        let mut consolidated = SnpCatalog::new();
        let mut files_processed = 0;
        let mut failed_files = Vec::new();

        for (path, name) in &files {
            if !layout_verified {
                match validator.sample(path, software) {
                    Ok(LayoutSample::Verified(_)) => layout_verified = true,
                    Ok(LayoutSample::Empty) => {}
                    Ok(LayoutSample::Unreadable(e)) => {
                        error!("Error processing {:?}: {:#}", path, e);
                        failed_files.push(path.clone());
                        continue;
                    }
                    Err(e) => {
                        return Err(e)
                            .with_context(|| format!("Column layout check failed for {}", software));
                    }
                }
            }

            match process_file(path, name, mapping) {
                Ok((file_data, stats)) => {
                    if stats.malformed_rows > 0 {
                        warn!(
                            "{}: {} malformed rows skipped",
                            name.file_name(),
                            stats.malformed_rows
                        );
                    }
                    merge_catalog(&mut consolidated, file_data, MergePolicy::Deep);
                    files_processed += 1;
                }
                Err(e) => {
                    error!("Error processing {:?}: {:#}", path, e);
                    failed_files.push(path.clone());
                }
            }
        }

        let output_path = self.output_dir.join(consolidated_file_name(software));
        catalog::write_catalog(&output_path, &consolidated)?;

        info!("{} data saved to {:?}", software, output_path);
        info!("Total SNPs processed for {}: {}", software, consolidated.len());

        Ok(Some(ConsolidationSummary {
            software,
            output_path,
            files_processed,
            failed_files,
            total_snps: consolidated.len(),
        }))
    }
}

/// Parse one sumstats file into its own catalog fragment
///
/// The fragment is only merged by the caller when the whole file was read,
/// so a file that fails midway contributes nothing.
pub fn process_file(
    path: &Path,
    name: &SumstatsFileName,
    mapping: &ColumnMapping,
) -> Result<(SnpCatalog, FileStats)> {
    info!(
        "Processing {} - {} ({})",
        name.phenotype, name.cohort, name.software
    );

    let mut parser = SumstatsParser::new(*mapping);
    let mut file_data = SnpCatalog::new();

    let rows = parser
        .parse_with(path, |row| {
            insert_record(
                &mut file_data,
                row.snp_id(),
                &name.phenotype,
                &name.cohort,
                row.to_record(),
            );
        })
        .with_context(|| format!("Failed to read {:?}", path))?;

    let stats = FileStats {
        rows,
        skipped_rows: parser.skipped_count,
        malformed_rows: parser.error_count,
    };

    Ok((file_data, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::load_catalog;
    use crate::parsers::sumstats::fixtures::{row, write_gz, HEADER};
    use tempfile::tempdir;

    fn write_input(dir: &Path, name: &str, rows: &[String]) {
        let mut lines = vec![HEADER.to_string()];
        lines.extend_from_slice(rows);
        write_gz(&dir.join(name), &lines);
    }

    #[tokio::test]
    async fn test_two_cohorts_both_retained() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        write_input(
            input.path(),
            "height.UKBB.mrmega.sumstats.txt.gz",
            &[row("rs123", "1", 1000, "1e-8", "0.11")],
        );
        write_input(
            input.path(),
            "height.FinnGen.mrmega.sumstats.txt.gz",
            &[row("rs123", "1", 1000, "2e-3", "0.22")],
        );

        let consolidator = Consolidator::new(
            input.path().to_path_buf(),
            output.path().to_path_buf(),
            FileFilter::default(),
        );
        let summaries = consolidator
            .run(SoftwareSelection::Mrmega)
            .await
            .unwrap()
            .summaries;

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].total_snps, 1);
        assert_eq!(summaries[0].files_processed, 2);

        let catalog = load_catalog(&summaries[0].output_path).unwrap();
        let height = &catalog["rs123"]["height"];
        assert_eq!(height.len(), 2);
        assert_eq!(height["UKBB"].beta, "0.11");
        assert_eq!(height["FinnGen"].beta, "0.22");
        assert_eq!(height["FinnGen"].p_value, "2e-3");
    }

    #[tokio::test]
    async fn test_tools_are_kept_apart() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        write_input(
            input.path(),
            "bmi.UKBB.mrmega.sumstats.txt.gz",
            &[row("rs1", "1", 10, "0.1", "0.1")],
        );
        write_input(
            input.path(),
            "bmi.UKBB.gwama.sumstats.txt.gz",
            &[row("rs2", "2", 20, "0.2", "0.2"), row("rs3", "3", 30, "0.3", "0.3")],
        );

        let consolidator = Consolidator::new(
            input.path().to_path_buf(),
            output.path().to_path_buf(),
            FileFilter::default(),
        );
        let summaries = consolidator
            .run(SoftwareSelection::Both)
            .await
            .unwrap()
            .summaries;

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].software, SoftwareType::Mrmega);
        assert_eq!(summaries[0].total_snps, 1);
        assert_eq!(summaries[1].software, SoftwareType::Gwama);
        assert_eq!(summaries[1].total_snps, 2);

        assert!(output
            .path()
            .join("consolidated_snp_data_mrmega.json.gz")
            .exists());
        assert!(output
            .path()
            .join("consolidated_snp_data_gwama.json.gz")
            .exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_does_not_stop_run() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        write_input(
            input.path(),
            "height.A.mrmega.sumstats.txt.gz",
            &[row("rs1", "1", 10, "0.1", "0.1")],
        );
        // Gzip magic followed by garbage
        std::fs::write(
            input.path().join("height.B.mrmega.sumstats.txt.gz"),
            [0x1f, 0x8b, 0x08, 0x00, 0xde, 0xad, 0xbe, 0xef],
        )
        .unwrap();
        write_input(
            input.path(),
            "height.C.mrmega.sumstats.txt.gz",
            &[row("rs2", "1", 20, "0.2", "0.2")],
        );

        let consolidator = Consolidator::new(
            input.path().to_path_buf(),
            output.path().to_path_buf(),
            FileFilter::default(),
        );
        let summary = consolidator
            .process_software_type(SoftwareType::Mrmega)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(summary.files_processed, 2);
        assert_eq!(summary.failed_files.len(), 1);
        assert_eq!(summary.total_snps, 2);
    }

    #[tokio::test]
    async fn test_unreadable_first_file_does_not_stop_run() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        // Sorts ahead of the valid file, so it is the first layout candidate
        std::fs::write(
            input.path().join("aaa.A.mrmega.sumstats.txt.gz"),
            [0x1f, 0x8b, 0x08, 0x00, 0xde, 0xad, 0xbe, 0xef],
        )
        .unwrap();
        write_input(
            input.path(),
            "height.C.mrmega.sumstats.txt.gz",
            &[row("rs7", "1", 70, "0.07", "0.7")],
        );

        let consolidator = Consolidator::new(
            input.path().to_path_buf(),
            output.path().to_path_buf(),
            FileFilter::default(),
        );
        let summary = consolidator
            .process_software_type(SoftwareType::Mrmega)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(summary.files_processed, 1);
        assert_eq!(
            summary.failed_files,
            vec![input.path().join("aaa.A.mrmega.sumstats.txt.gz")]
        );
        let catalog = load_catalog(&summary.output_path).unwrap();
        assert_eq!(catalog["rs7"]["height"]["C"].beta, "0.7");
    }

    #[tokio::test]
    async fn test_no_files_skips_software() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();

        let consolidator = Consolidator::new(
            input.path().to_path_buf(),
            output.path().to_path_buf(),
            FileFilter::default(),
        );
        let summary = consolidator
            .process_software_type(SoftwareType::Gwama)
            .await
            .unwrap();

        assert!(summary.is_none());
        assert!(!output.path().join("consolidated_snp_data_gwama.json.gz").exists());
    }

    #[tokio::test]
    async fn test_layout_mismatch_fails_fast() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        write_gz(
            &input.path().join("height.UKBB.gwama.sumstats.txt.gz"),
            &["#ID\tCHR\tPOS".to_string(), "rs1\t1\t100".to_string()],
        );

        let consolidator = Consolidator::new(
            input.path().to_path_buf(),
            output.path().to_path_buf(),
            FileFilter::default(),
        );
        let result = consolidator.process_software_type(SoftwareType::Gwama).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_rebuild_is_deterministic() {
        let input = tempdir().unwrap();
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        write_input(
            input.path(),
            "height.UKBB.mrmega.sumstats.txt.gz",
            &[
                row("rs9", "2", 5, "0.4", "0.1"),
                row("rs1", "1", 7, "0.01", "0.3"),
            ],
        );
        write_input(
            input.path(),
            "bmi.UKBB.mrmega.sumstats.txt.gz",
            &[row("rs1", "1", 7, "0.02", "0.5")],
        );

        for out in [&first, &second] {
            Consolidator::new(
                input.path().to_path_buf(),
                out.path().to_path_buf(),
                FileFilter::default(),
            )
            .run(SoftwareSelection::Mrmega)
            .await
            .unwrap();
        }

        let name = consolidated_file_name(SoftwareType::Mrmega);
        let a = load_catalog(&first.path().join(&name)).unwrap();
        let b = load_catalog(&second.path().join(&name)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a["rs1"].len(), 2);
        assert_eq!(
            std::fs::read(first.path().join(&name)).unwrap(),
            std::fs::read(second.path().join(&name)).unwrap()
        );
    }
}
