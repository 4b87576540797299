// ==============================================================================
// main.rs - Summary Statistics Processor Entry Point
// ==============================================================================
// Description: CLI for consolidation, tabix subsetting and SNP re-matching of
//              MR-MEGA / GWAMA summary statistics
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sumstats_processor::config::ToolPaths;
use sumstats_processor::consolidate::Consolidator;
use sumstats_processor::discovery::FileFilter;
use sumstats_processor::matcher::{MatchConfig, SnpMatcher};
use sumstats_processor::models::{MergePolicy, PvalBand, SoftwareSelection, SoftwareType};
use sumstats_processor::tabix::{SubsetConfig, SubsetRunner};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge sumstats files into one SNP catalog per software type
    Consolidate {
        #[command(flatten)]
        io: IoArgs,
    },

    /// Build sorted, p-value filtered, bgzipped and tabix-indexed subsets
    Subset {
        #[command(flatten)]
        io: IoArgs,

        #[command(flatten)]
        tools: ToolArgs,

        /// P-value band as MIN:MAX ("-" or empty = unbounded); repeatable
        #[arg(long = "band", value_name = "MIN:MAX", allow_hyphen_values = true)]
        bands: Vec<PvalBand>,

        /// Skip the base64 sidecar for each subset
        #[arg(long)]
        no_encode: bool,
    },

    /// Re-match SNPs of tabix subsets against the consolidated catalogs
    Match {
        #[command(flatten)]
        io: IoArgs,

        /// Directory containing consolidated_snp_data_<software>.json.gz
        #[arg(short = 'C', long)]
        consolidated_dir: PathBuf,

        /// How records from later files are folded into the match result
        #[arg(long, value_enum, default_value_t = MergePolicy::Deep)]
        merge_policy: MergePolicy,
    },
}

#[derive(Args, Debug)]
struct IoArgs {
    /// Input directory
    #[arg(short, long)]
    input_dir: PathBuf,

    /// Output directory (created if missing)
    #[arg(short, long)]
    output_dir: PathBuf,

    /// Software type(s) to process
    #[arg(short, long, value_enum, default_value_t = SoftwareSelection::Both)]
    software: SoftwareSelection,

    /// Only process this phenotype
    #[arg(short, long)]
    phenotype: Option<String>,

    /// Only process this cohort
    #[arg(short, long)]
    cohort: Option<String>,
}

impl IoArgs {
    fn filter(&self) -> FileFilter {
        FileFilter::new(self.phenotype.clone(), self.cohort.clone())
    }
}

#[derive(Args, Debug)]
struct ToolArgs {
    /// sort binary (GNU coreutils)
    #[arg(long, env = "SUMSTATS_SORT_BIN", default_value = "sort")]
    sort_bin: PathBuf,

    /// bgzip binary (htslib)
    #[arg(long, env = "SUMSTATS_BGZIP_BIN", default_value = "bgzip")]
    bgzip_bin: PathBuf,

    /// tabix binary (htslib)
    #[arg(long, env = "SUMSTATS_TABIX_BIN", default_value = "tabix")]
    tabix_bin: PathBuf,

    /// Main-memory buffer for sort -S (e.g. 2G)
    #[arg(long, env = "SUMSTATS_SORT_BUFFER")]
    sort_buffer: Option<String>,

    /// Temporary directory for sort -T
    #[arg(long, env = "SUMSTATS_SORT_TMPDIR")]
    sort_tmpdir: Option<PathBuf>,
}

impl From<ToolArgs> for ToolPaths {
    fn from(args: ToolArgs) -> Self {
        ToolPaths {
            sort: args.sort_bin,
            bgzip: args.bgzip_bin,
            tabix: args.tabix_bin,
            sort_buffer: args.sort_buffer,
            sort_tmpdir: args.sort_tmpdir,
        }
    }
}

fn report_failed_software(stage: &str, failed: &[(SoftwareType, String)]) -> usize {
    for (software, message) in failed {
        warn!("{} failed for {}: {}", stage, software, message);
    }
    failed.len()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sumstats_processor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let failures = match cli.command {
        Command::Consolidate { io } => {
            info!("Consolidating {:?} -> {:?}", io.input_dir, io.output_dir);
            let consolidator =
                Consolidator::new(io.input_dir.clone(), io.output_dir.clone(), io.filter());
            let report = consolidator.run(io.software).await?;

            let mut failures = report_failed_software("Consolidation", &report.failed);
            for summary in &report.summaries {
                info!(
                    "{}: {} SNPs from {} files -> {:?}",
                    summary.software, summary.total_snps, summary.files_processed, summary.output_path
                );
                for path in &summary.failed_files {
                    warn!("{}: failed to read {:?}", summary.software, path);
                }
                failures += summary.failed_files.len();
            }
            failures
        }

        Command::Subset {
            io,
            tools,
            bands,
            no_encode,
        } => {
            let bands = if bands.is_empty() {
                PvalBand::defaults()
            } else {
                bands
            };
            info!(
                "Subsetting {:?} -> {:?} for bands: {}",
                io.input_dir,
                io.output_dir,
                bands.iter().map(|b| b.descriptor()).collect::<Vec<_>>().join(", ")
            );

            let runner = SubsetRunner::new(SubsetConfig {
                input_dir: io.input_dir.clone(),
                output_dir: io.output_dir.clone(),
                filter: io.filter(),
                bands,
                encode: !no_encode,
                tools: tools.into(),
            });
            let report = runner.run(io.software).await?;

            let mut failures = report_failed_software("Subsetting", &report.failed);
            for summary in &report.summaries {
                info!(
                    "{}: {} subsets created, {} failed",
                    summary.software,
                    summary.artifacts.len(),
                    summary.failures.len()
                );
                for failure in &summary.failures {
                    warn!(
                        "{}: {:?} band {}: {}",
                        summary.software, failure.input, failure.band, failure.error
                    );
                }
                failures += summary.failures.len();
            }
            failures
        }

        Command::Match {
            io,
            consolidated_dir,
            merge_policy,
        } => {
            info!(
                "Matching {:?} against {:?} -> {:?}",
                io.input_dir, consolidated_dir, io.output_dir
            );
            let matcher = SnpMatcher::new(MatchConfig {
                input_dir: io.input_dir.clone(),
                consolidated_dir,
                output_dir: io.output_dir.clone(),
                filter: io.filter(),
                merge_policy,
            });
            let report = matcher.run(io.software).await?;

            let mut failures = report_failed_software("Matching", &report.failed);
            for summary in &report.summaries {
                info!(
                    "{}: {} SNPs matched across {} files -> {:?}",
                    summary.software,
                    summary.total_matched,
                    summary.files.len(),
                    summary.output_path
                );
                failures += summary.failed_files.len();
            }
            failures
        }
    };

    if failures > 0 {
        anyhow::bail!("Completed with {} failure(s); see log output above", failures);
    }

    info!("Done");
    Ok(())
}
