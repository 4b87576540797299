// ==============================================================================
// tabix.rs - Position-Sorted, P-Value Filtered Tabix Subsets
// ==============================================================================
// Description: sort -> filter -> bgzip -> tabix -> base64 pipeline per input
//              file and p-value band
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================
// Per (file, band) artifacts, all next to <stem> = <pheno>.<cohort>.<sw>_pval_<band>:
//   <stem>.sorted      header + body sorted by CHR (version), POS, P   [temporary]
//   <stem>.filtered    header + rows with p inside the band            [temporary]
//   <stem>.gz          bgzip output
//   <stem>.gz.tbi      tabix index (-s CHR -b POS -e POS -S 1)
//   <stem>.gz.b64.json base64 transport encoding of .gz and .gz.tbi
// ==============================================================================

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{ColumnMapping, ToolPaths};
use crate::discovery::{find_sumstats_files, FileFilter};
use crate::encoding::EncodedArtifact;
use crate::external::{ExternalTool, ToolError};
use crate::models::{PvalBand, SoftwareSelection, SoftwareType, StageReport};
use crate::parsers::open_text;
use crate::validator::{is_bgzf, trim_line_ending, LayoutSample, LayoutValidator};

/// Failure of one (file, band) pipeline
#[derive(Error, Debug)]
pub enum SubsetError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bgzip output {0:?} is not BGZF")]
    NotBgzf(PathBuf),

    #[error("tabix reported success but {0:?} is missing")]
    MissingIndex(PathBuf),

    #[error("Encoding failed: {0:#}")]
    Encoding(anyhow::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SubsetError + '_ {
    move |source| SubsetError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Row accounting for the p-value filter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterStats {
    pub kept: usize,
    pub out_of_range: usize,
    /// Too few columns, or a p-value that does not parse
    pub malformed: usize,
}

/// File names derived from one output stem
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPaths {
    pub sorted: PathBuf,
    pub filtered: PathBuf,
    pub data: PathBuf,
    pub index: PathBuf,
}

impl ArtifactPaths {
    pub fn new(stem: &Path) -> Self {
        let data = with_suffix(stem, ".gz");
        Self {
            sorted: with_suffix(stem, ".sorted"),
            filtered: with_suffix(stem, ".filtered"),
            index: with_suffix(&data, ".tbi"),
            data,
        }
    }

    /// Intermediates still present on disk
    pub fn leftovers(&self) -> Vec<&Path> {
        [&self.sorted, &self.filtered]
            .into_iter()
            .filter(|p| p.exists())
            .map(|p| p.as_path())
            .collect()
    }

    /// Delete both intermediates; returns the ones that could not be removed
    fn remove_intermediates(&self) -> Vec<PathBuf> {
        let mut kept = Vec::new();
        for path in [&self.sorted, &self.filtered] {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Failed to remove intermediate file {:?}: {}", path, e);
                kept.push(path.clone());
            }
        }
        kept
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Finished subset: compressed data, index and optional encoding sidecar
#[derive(Debug, Clone)]
pub struct SubsetArtifact {
    pub data_path: PathBuf,
    pub index_path: PathBuf,
    pub sidecar_path: Option<PathBuf>,
    pub stats: FilterStats,
}

/// Builds one tabix subset at a time using the configured external tools
pub struct TabixBuilder {
    sort: ExternalTool,
    bgzip: ExternalTool,
    tabix: ExternalTool,
    sort_buffer: Option<String>,
    sort_tmpdir: Option<PathBuf>,
    encode: bool,
}

impl TabixBuilder {
    pub fn new(tools: &ToolPaths) -> Self {
        Self {
            // Byte-order collation keeps the order identical across hosts
            sort: ExternalTool::new(&tools.sort).with_env("LC_ALL", "C"),
            bgzip: ExternalTool::new(&tools.bgzip),
            tabix: ExternalTool::new(&tools.tabix),
            sort_buffer: tools.sort_buffer.clone(),
            sort_tmpdir: tools.sort_tmpdir.clone(),
            encode: true,
        }
    }

    pub fn with_encoding(mut self, encode: bool) -> Self {
        self.encode = encode;
        self
    }

    /// Run the whole pipeline for one input file and one band
    ///
    /// An external tool failure aborts this (file, band) only; intermediates
    /// produced before the failure stay on disk (see `ArtifactPaths::leftovers`).
    pub async fn create_tabix_file(
        &self,
        input: &Path,
        output_stem: &Path,
        mapping: &ColumnMapping,
        band: &PvalBand,
    ) -> Result<SubsetArtifact, SubsetError> {
        let paths = ArtifactPaths::new(output_stem);

        info!("Sorting data for {:?}...", output_stem);
        self.sort_input(input, &paths.sorted, mapping).await?;

        info!("Filtering data with p-value in {}...", band);
        let stats = filter_by_pvalue(&paths.sorted, &paths.filtered, mapping, band)?;
        info!(
            "Kept {} rows ({} outside band, {} malformed)",
            stats.kept, stats.out_of_range, stats.malformed
        );

        info!("Compressing filtered file to {:?} using bgzip...", paths.data);
        self.compress(&paths.filtered, &paths.data).await?;

        info!("Creating Tabix index for {:?}...", paths.data);
        self.index(&paths.data, mapping).await?;

        // The artifact pair is complete; a failed cleanup only leaves clutter
        paths.remove_intermediates();

        let sidecar_path = if self.encode {
            info!("Encoding files to base64...");
            let encoded = EncodedArtifact::from_files(&paths.data, &paths.index)
                .map_err(SubsetError::Encoding)?;
            let sidecar = encoded
                .write_sidecar(&EncodedArtifact::sidecar_path(&paths.data))
                .map_err(SubsetError::Encoding)?;
            Some(sidecar)
        } else {
            None
        };

        info!(
            "Compressed file and index created: {:?} and {:?}",
            paths.data, paths.index
        );

        Ok(SubsetArtifact {
            data_path: paths.data,
            index_path: paths.index,
            sidecar_path,
            stats,
        })
    }

    /// Copy the header verbatim, then append the body sorted by chr/pos/p
    pub async fn sort_input(
        &self,
        input: &Path,
        sorted: &Path,
        mapping: &ColumnMapping,
    ) -> Result<(), SubsetError> {
        let mut reader = open_text(input).map_err(io_error(input))?;

        let mut header = Vec::new();
        reader.read_until(b'\n', &mut header).map_err(io_error(input))?;
        if !header.is_empty() && !header.ends_with(b"\n") {
            header.push(b'\n');
        }

        let mut out = File::create(sorted).map_err(io_error(sorted))?;
        out.write_all(&header).map_err(io_error(sorted))?;
        out.flush().map_err(io_error(sorted))?;

        // sort writes through the same handle, after the header
        self.sort
            .run_with_input(self.sort_args(mapping), reader, Stdio::from(out))
            .await?;

        Ok(())
    }

    fn sort_args(&self, mapping: &ColumnMapping) -> Vec<OsString> {
        let (chr, pos, pval) = mapping.one_based_sort_keys();
        let mut args: Vec<OsString> = vec![
            "-s".into(),
            "-t".into(),
            "\t".into(),
            format!("-k{chr},{chr}V").into(),
            format!("-k{pos},{pos}n").into(),
            format!("-k{pval},{pval}g").into(),
        ];
        if let Some(buffer) = &self.sort_buffer {
            args.push("-S".into());
            args.push(buffer.into());
        }
        if let Some(tmpdir) = &self.sort_tmpdir {
            args.push("-T".into());
            args.push(tmpdir.as_os_str().to_os_string());
        }
        args
    }

    /// `bgzip -c <filtered> > <data>`, then verify the BGZF header
    pub async fn compress(&self, filtered: &Path, data: &Path) -> Result<(), SubsetError> {
        let out = File::create(data).map_err(io_error(data))?;
        let mut args: Vec<OsString> = vec!["-c".into()];
        args.push(filtered.as_os_str().to_os_string());

        let output = self.bgzip.run(args, Stdio::from(out)).await?;
        if !output.stderr.is_empty() {
            warn!("bgzip: {}", output.stderr);
        }

        if !is_bgzf(data).map_err(io_error(data))? {
            return Err(SubsetError::NotBgzf(data.to_path_buf()));
        }
        Ok(())
    }

    /// `tabix -f -s <chr> -b <pos> -e <pos> -S 1 <data>` (1-based columns)
    pub async fn index(&self, data: &Path, mapping: &ColumnMapping) -> Result<(), SubsetError> {
        let (chr, pos, _) = mapping.one_based_sort_keys();
        let mut args: Vec<OsString> = vec![
            "-f".into(),
            "-s".into(),
            chr.to_string().into(),
            "-b".into(),
            pos.to_string().into(),
            "-e".into(),
            pos.to_string().into(),
            "-S".into(),
            "1".into(),
        ];
        args.push(data.as_os_str().to_os_string());

        let output = self.tabix.run(args, Stdio::null()).await?;
        if !output.stderr.is_empty() {
            warn!("tabix: {}", output.stderr);
        }

        let index = with_suffix(data, ".tbi");
        if !index.exists() {
            return Err(SubsetError::MissingIndex(index));
        }
        Ok(())
    }
}

/// Stream `sorted` into `filtered`, keeping the header and rows whose p-value
/// lies inside `band`
pub fn filter_by_pvalue(
    sorted: &Path,
    filtered: &Path,
    mapping: &ColumnMapping,
    band: &PvalBand,
) -> Result<FilterStats, SubsetError> {
    let input = File::open(sorted).map_err(io_error(sorted))?;
    let mut reader = BufReader::new(input);
    let output = File::create(filtered).map_err(io_error(filtered))?;
    let mut writer = BufWriter::new(output);

    let mut stats = FilterStats::default();
    let mut line = Vec::new();
    let mut line_number = 0usize;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).map_err(io_error(sorted))? == 0 {
            break;
        }
        line_number += 1;
        if !line.ends_with(b"\n") {
            line.push(b'\n');
        }

        if line_number == 1 {
            writer.write_all(&line).map_err(io_error(filtered))?;
            continue;
        }

        match parse_pvalue(trim_line_ending(&line), mapping.pval) {
            Some(p) if band.contains(p) => {
                writer.write_all(&line).map_err(io_error(filtered))?;
                stats.kept += 1;
            }
            Some(_) => stats.out_of_range += 1,
            None => {
                stats.malformed += 1;
                debug!("Skipping line {} of {:?}: no usable p-value", line_number, sorted);
            }
        }
    }

    writer.flush().map_err(io_error(filtered))?;
    Ok(stats)
}

fn parse_pvalue(line: &[u8], index: usize) -> Option<f64> {
    let field = line.split(|&b| b == b'\t').nth(index)?;
    let value = std::str::from_utf8(field).ok()?.trim().parse::<f64>().ok()?;
    (!value.is_nan()).then_some(value)
}

/// Everything the `subset` command needs
#[derive(Debug, Clone)]
pub struct SubsetConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub filter: FileFilter,
    pub bands: Vec<PvalBand>,
    pub encode: bool,
    pub tools: ToolPaths,
}

#[derive(Debug, Clone)]
pub struct SubsetFailure {
    pub input: PathBuf,
    pub band: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct SubsetSummary {
    pub software: SoftwareType,
    pub artifacts: Vec<SubsetArtifact>,
    pub failures: Vec<SubsetFailure>,
}

pub struct SubsetRunner {
    config: SubsetConfig,
    builder: TabixBuilder,
}

impl SubsetRunner {
    pub fn new(config: SubsetConfig) -> Self {
        let builder = TabixBuilder::new(&config.tools).with_encoding(config.encode);
        Self { config, builder }
    }

    pub async fn run(&self, selection: SoftwareSelection) -> Result<StageReport<SubsetSummary>> {
        std::fs::create_dir_all(&self.config.output_dir).with_context(|| {
            format!("Failed to create output directory {:?}", self.config.output_dir)
        })?;

        let mut report = StageReport::new();
        for software in selection.software_types() {
            match self.process_software_type(software).await {
                Ok(Some(summary)) => report.summaries.push(summary),
                Ok(None) => {}
                Err(e) => {
                    error!("Subsetting failed for {}: {:#}", software, e);
                    report.failed.push((software, format!("{:#}", e)));
                }
            }
        }
        Ok(report)
    }

    pub async fn process_software_type(&self, software: SoftwareType) -> Result<Option<SubsetSummary>> {
        let files = find_sumstats_files(&self.config.input_dir, software, &self.config.filter)?;

        if files.is_empty() {
            info!(
                "No files found matching {}.{}.{}.sumstats.txt.gz",
                self.config.filter.phenotype.as_deref().unwrap_or("*"),
                self.config.filter.cohort.as_deref().unwrap_or("*"),
                software
            );
            return Ok(None);
        }

        let validator = LayoutValidator::new();
        let mapping = ColumnMapping::for_software(software);
        let mut layout_verified = false;
        let mut summary = SubsetSummary {
            software,
            artifacts: Vec::new(),
            failures: Vec::new(),
        };

        for (input, name) in &files {
            if !layout_verified {
                match validator.sample(input, software) {
                    Ok(LayoutSample::Verified(_)) => layout_verified = true,
                    Ok(LayoutSample::Empty) => {}
                    Ok(LayoutSample::Unreadable(e)) => {
                        error!("Skipping unreadable input {:?}: {:#}", input, e);
                        for band in &self.config.bands {
                            summary.failures.push(SubsetFailure {
                                input: input.clone(),
                                band: band.descriptor(),
                                error: format!("{:#}", e),
                            });
                        }
                        continue;
                    }
                    Err(e) => {
                        return Err(e)
                            .with_context(|| format!("Column layout check failed for {}", software));
                    }
                }
            }

            for band in &self.config.bands {
                let descriptor = band.descriptor();
                let stem = self.config.output_dir.join(name.subset_stem(&descriptor));

                info!(
                    "Processing {}-{}-{} for p-value band {}...",
                    name.phenotype, name.cohort, software, band
                );

                match self
                    .builder
                    .create_tabix_file(input, &stem, mapping, band)
                    .await
                {
                    Ok(artifact) => summary.artifacts.push(artifact),
                    Err(e) => {
                        error!("Failed to build {:?} band {}: {}", input, descriptor, e);
                        for leftover in ArtifactPaths::new(&stem).leftovers() {
                            warn!("Intermediate file left behind: {:?}", leftover);
                        }
                        summary.failures.push(SubsetFailure {
                            input: input.clone(),
                            band: descriptor,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            "{}: {} subsets created, {} failed",
            software,
            summary.artifacts.len(),
            summary.failures.len()
        );

        Ok(Some(summary))
    }
}
