pub mod discover;
pub mod ledger;

use crate::convert::{self, ConvertOptions};
use crate::series::SeriesOptions;
use crate::table::TableOptions;
use discover::ConversionUnit;
use indicatif::{ProgressBar, ProgressStyle};
use ledger::{BatchResultLedger, ConversionOutcome, LedgerOptions, OutcomeStatus, SkipReason};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that stop the whole batch. Per-unit failures never surface here.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Input directory not found: {0}")]
    InputRootMissing(PathBuf),
    #[error("No matching subjects found for: {0}")]
    NoSubjects(String),
    #[error("Discovery error: {0}")]
    Discovery(#[from] walkdir::Error),
    #[error("Cannot create output directory {path}: {source}")]
    OutputRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot write ledger {path}: {source}")]
    Ledger {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Ledger JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Restrict discovery to these subject IDs.
    pub subjects: Option<BTreeSet<String>>,
    pub normalize: bool,
    pub mono: bool,
    pub average_block_size: usize,
    pub threads: usize,
    pub dry_run: bool,
    pub resume: bool,
    pub verbose: bool,
    pub table: TableOptions,
    /// Stop starting new units after this much wall time.
    pub deadline: Option<Duration>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            subjects: None,
            normalize: false,
            mono: false,
            average_block_size: 1,
            threads: 1,
            dry_run: false,
            resume: false,
            verbose: false,
            table: TableOptions::default(),
            deadline: None,
        }
    }
}

impl BatchOptions {
    fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            series: SeriesOptions {
                mono: self.mono,
                normalize: self.normalize,
                average_block_size: self.average_block_size,
            },
            table: self.table.clone(),
        }
    }

    fn ledger_options(&self) -> LedgerOptions {
        LedgerOptions {
            subjects: self.subjects.clone(),
            normalize: self.normalize,
            mono: self.mono,
            average_block_size: self.average_block_size,
            float_format: self.table.float_format.to_string(),
            include_header: self.table.include_header,
            dry_run: self.dry_run,
            resume: self.resume,
        }
    }
}

/// `<output_root>/batch_conversion_results.json`
pub fn ledger_path(output_root: &Path) -> PathBuf {
    output_root.join(crate::LEDGER_FILE_NAME)
}

/// Convert every (subject, signal) unit under `input_root` into `output_root`.
///
/// Units run on a pool of `options.threads` workers and each yields exactly one
/// outcome; failures are recorded, never propagated. The ledger is written to
/// [`ledger_path`] unless this is a dry run, which touches nothing on disk.
pub fn run_batch(
    input_root: &Path,
    output_root: &Path,
    options: &BatchOptions,
) -> Result<BatchResultLedger, BatchError> {
    let started = Instant::now();

    if !input_root.is_dir() {
        return Err(BatchError::InputRootMissing(input_root.to_path_buf()));
    }

    if let Some(filter) = &options.subjects {
        let matched = discover::list_subject_dirs(input_root)?
            .iter()
            .any(|(id, _)| filter.contains(id));
        if !matched {
            let wanted: Vec<&str> = filter.iter().map(|s| s.as_str()).collect();
            return Err(BatchError::NoSubjects(wanted.join(",")));
        }
    }

    let units = discover::discover_units(input_root, output_root, options.subjects.as_ref())?;

    let subject_count = units
        .iter()
        .map(|u| u.subject_id.as_str())
        .collect::<BTreeSet<_>>()
        .len();
    log::info!(
        "Found {} signal files across {} subjects in {}",
        units.len(),
        subject_count,
        input_root.display()
    );

    let outcomes = if options.dry_run {
        log::info!("Dry run: no files will be converted");
        units
            .iter()
            .map(|u| {
                if options.verbose {
                    log::info!("  would process {}", u.unit_id());
                }
                ConversionOutcome::skipped(u, SkipReason::DryRun, Duration::ZERO)
            })
            .collect()
    } else {
        std::fs::create_dir_all(output_root).map_err(|source| BatchError::OutputRoot {
            path: output_root.to_path_buf(),
            source,
        })?;
        execute_units(&units, options, started)?
    };

    let ledger = BatchResultLedger::new(
        input_root,
        output_root,
        options.ledger_options(),
        outcomes,
        started.elapsed(),
    );

    if !options.dry_run {
        let path = ledger_path(output_root);
        ledger.persist(&path)?;
        log::info!("Detailed results saved to {}", path.display());
    }

    Ok(ledger)
}

/// Fan units out over a fixed-size rayon pool. Each worker keeps its own
/// outcomes; rayon merges them in input order once the pool drains.
fn execute_units(
    units: &[ConversionUnit],
    options: &BatchOptions,
    started: Instant,
) -> Result<Vec<ConversionOutcome>, BatchError> {
    let threads = options.threads.max(1);
    log::info!("Converting {} units with {} workers", units.len(), threads);

    let pb = ProgressBar::new(units.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );

    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    let convert_options = options.convert_options();
    let deadline = options.deadline.map(|d| started + d);

    let outcomes: Vec<ConversionOutcome> = pool.install(|| {
        units
            .par_iter()
            .map(|unit| {
                let outcome = process_unit(unit, options, &convert_options, deadline);
                report(&outcome, options.verbose);
                pb.inc(1);
                outcome
            })
            .collect()
    });

    let failed = outcomes
        .iter()
        .filter(|o| o.status == OutcomeStatus::Failed)
        .count();
    pb.finish_with_message(format!("Done: {} units, {} failed", outcomes.len(), failed));

    Ok(outcomes)
}

/// Run one unit to exactly one outcome.
fn process_unit(
    unit: &ConversionUnit,
    options: &BatchOptions,
    convert_options: &ConvertOptions,
    deadline: Option<Instant>,
) -> ConversionOutcome {
    let t0 = Instant::now();

    if deadline.is_some_and(|d| t0 >= d) {
        return ConversionOutcome::skipped(unit, SkipReason::Deadline, Duration::ZERO);
    }

    if options.resume && unit.is_converted() {
        return ConversionOutcome::skipped(unit, SkipReason::AlreadyConverted, t0.elapsed());
    }

    match convert::convert_file(&unit.source, &unit.table, convert_options) {
        Ok(meta) => {
            log::debug!(
                "{}: {} rows, {} bytes",
                unit.unit_id(),
                meta.sample_count,
                meta.file_size_bytes
            );
            ConversionOutcome::success(unit, t0.elapsed())
        }
        Err(e) => ConversionOutcome::failed(unit, e.kind(), e.to_string(), t0.elapsed()),
    }
}

fn report(outcome: &ConversionOutcome, verbose: bool) {
    match outcome.status {
        OutcomeStatus::Failed => {
            log::warn!("✗ {}: {}", outcome.unit_id, outcome.message());
        }
        _ if verbose => {
            log::info!("✓ {}: {}", outcome.unit_id, outcome.message());
        }
        _ => {
            log::debug!("{}: {}", outcome.unit_id, outcome.message());
        }
    }
}
