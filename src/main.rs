use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sensorwav::batch::{self, BatchOptions};
use sensorwav::config::AppConfig;
use sensorwav::convert::{self, ConvertOptions};
use sensorwav::series::SeriesOptions;
use sensorwav::table::TableOptions;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "sensorwav", version, about = "Smart-shirt WAV recordings to CSV tables")]
struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a single WAV file to CSV (plus a .meta.json sidecar)
    Convert {
        /// Input WAV file
        input: PathBuf,

        /// Output CSV (defaults to the input path with a .csv extension)
        output: Option<PathBuf>,

        /// Scale each channel so its peak absolute value is 1
        #[arg(long)]
        normalize: bool,

        /// Mix all channels down to one
        #[arg(long)]
        mono: bool,

        /// Average non-overlapping blocks of N samples
        #[arg(long, default_value = "1")]
        average: usize,

        /// printf-style cell format (%.7g, %.4f, %.3e)
        #[arg(long)]
        float_format: Option<String>,

        /// Rows formatted per write
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Omit the Time_s,Ch1 header row
        #[arg(long)]
        no_header: bool,
    },

    /// Convert every subject's recordings, writing a results ledger
    Batch {
        /// Raw data root, one directory per subject (defaults to config input_dir)
        #[arg(long)]
        input_dir: Option<PathBuf>,

        /// Output root (defaults to config output_dir)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Only these subject IDs (comma-separated)
        #[arg(long, value_delimiter = ',')]
        subjects: Vec<String>,

        /// Scale each channel so its peak absolute value is 1
        #[arg(long)]
        normalize: bool,

        /// Mix all channels down to one
        #[arg(long)]
        mono: bool,

        /// Average non-overlapping blocks of N samples
        #[arg(long, default_value = "1")]
        average: usize,

        /// Number of parallel workers (0 = auto-detect from config)
        #[arg(short = 'j', long, default_value = "0")]
        jobs: usize,

        /// List what would be converted without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Skip units whose table and sidecar already exist
        #[arg(long)]
        resume: bool,

        /// Stop starting new units after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,

        /// printf-style cell format (%.7g, %.4f, %.3e)
        #[arg(long)]
        float_format: Option<String>,

        /// Rows formatted per write
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Omit the Time_s,Ch1 header row
        #[arg(long)]
        no_header: bool,
    },

    /// Write per-subject summary CSVs in physical units
    Summarize {
        /// Converted data root (defaults to config output_dir)
        #[arg(long)]
        input_dir: Option<PathBuf>,

        /// Summary directory (defaults to config analysis_dir)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Only these subject IDs (comma-separated)
        #[arg(long, value_delimiter = ',')]
        subjects: Vec<String>,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = AppConfig::load();
    let table_defaults = config
        .table
        .to_options()
        .context("Invalid [table] section in config")?;

    match cli.command {
        Commands::Convert {
            input,
            output,
            normalize,
            mono,
            average,
            float_format,
            chunk_size,
            no_header,
        } => {
            let output = output.unwrap_or_else(|| input.with_extension("csv"));
            let table =
                table_options(table_defaults, float_format.as_deref(), chunk_size, no_header)?;
            let options = ConvertOptions {
                series: SeriesOptions {
                    mono,
                    normalize,
                    average_block_size: average,
                },
                table,
            };

            let meta = convert::convert_file(&input, &output, &options)
                .with_context(|| format!("Failed to convert {}", input.display()))?;
            println!("Wrote {} rows to {}", meta.sample_count, output.display());
            println!(
                "  {} Hz, {} channel(s), {} bit, {:.2} s",
                meta.output_sample_rate_hz,
                meta.channel_count,
                meta.bits_per_sample,
                meta.duration_s
            );
            if meta.average_block_size > 1 {
                println!(
                    "  averaged over {} samples ({} Hz source)",
                    meta.average_block_size, meta.sample_rate_hz
                );
            }
        }

        Commands::Batch {
            input_dir,
            output_dir,
            subjects,
            normalize,
            mono,
            average,
            jobs,
            dry_run,
            resume,
            deadline_secs,
            float_format,
            chunk_size,
            no_header,
        } => {
            let table =
                table_options(table_defaults, float_format.as_deref(), chunk_size, no_header)?;
            let input_root = input_dir.unwrap_or_else(|| config.input_dir.clone());
            let output_root = output_dir.unwrap_or_else(|| config.output_dir.clone());
            let options = BatchOptions {
                subjects: subject_filter(subjects),
                normalize,
                mono,
                average_block_size: average,
                threads: if jobs > 0 { jobs } else { config.resolve_workers() },
                dry_run,
                resume,
                verbose: cli.verbose > 0,
                table,
                deadline: deadline_secs.map(Duration::from_secs),
            };

            if dry_run {
                println!("DRY RUN: nothing will be written");
            }

            let ledger = batch::run_batch(&input_root, &output_root, &options)
                .context("Batch conversion failed")?;

            if dry_run {
                for o in &ledger.outcomes {
                    println!("  would process {} ({})", o.unit_id, o.source_path.display());
                }
            }

            let s = &ledger.summary;
            println!();
            println!(
                "Batch complete: {} units, {} converted, {} skipped, {} failed ({:.1}s)",
                s.total,
                s.succeeded,
                s.skipped,
                s.failed,
                s.elapsed_ms as f64 / 1000.0
            );

            if ledger.has_failures() {
                println!();
                println!("Failed units:");
                for o in ledger.failures() {
                    println!(
                        "  {} [{}]: {}",
                        o.unit_id,
                        o.error_kind.as_deref().unwrap_or("unknown"),
                        o.message()
                    );
                }
                return Ok(ExitCode::FAILURE);
            }
            if !dry_run {
                println!("Results: {}", batch::ledger_path(&output_root).display());
            }
        }

        Commands::Summarize {
            input_dir,
            output_dir,
            subjects,
        } => {
            let processed_root = input_dir.unwrap_or_else(|| config.output_dir.clone());
            let analysis_dir = output_dir.unwrap_or_else(|| config.analysis_dir.clone());
            let ranges = config.signal_ranges();

            let report = sensorwav::analysis::analyze_subjects(
                &processed_root,
                &analysis_dir,
                subject_filter(subjects).as_ref(),
                &ranges,
            )
            .with_context(|| format!("Failed to summarize {}", processed_root.display()))?;

            print_digest(&report.summaries);
            println!();
            println!(
                "Summarize complete: {} subjects, {} signals, {} unclassified, {} failed",
                report.subjects,
                report.summaries.len(),
                report.unclassified,
                report.failed
            );
            for path in &report.files_written {
                println!("  {}", path.display());
            }
            if report.failed > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// CLI flags over config defaults.
fn table_options(
    defaults: TableOptions,
    float_format: Option<&str>,
    chunk_size: Option<usize>,
    no_header: bool,
) -> Result<TableOptions> {
    let mut opts = defaults;
    if let Some(f) = float_format {
        opts.float_format = f
            .parse()
            .with_context(|| format!("Invalid --float-format {:?}", f))?;
    }
    if let Some(n) = chunk_size {
        opts.chunk_size = n.max(1);
    }
    if no_header {
        opts.include_header = false;
    }
    Ok(opts)
}

fn subject_filter(subjects: Vec<String>) -> Option<BTreeSet<String>> {
    let set: BTreeSet<String> = subjects
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if set.is_empty() { None } else { Some(set) }
}

fn print_digest(summaries: &[sensorwav::analysis::SubjectSummary]) {
    let mut current: Option<&str> = None;
    for s in summaries {
        if current != Some(s.subject_id.as_str()) {
            println!();
            println!("Subject {}:", s.subject_id);
            current = Some(s.subject_id.as_str());
        }
        println!("  {}", s.headline());
    }
}
