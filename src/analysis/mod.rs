//! Denormalization and per-subject summaries.
//!
//! Values in a converted table are mapped back to physical units with a fixed
//! min-max remap of `[-1, 1]` onto the signal type's documented range:
//!
//! `physical = (normalized + 1) / 2 * (max - min) + min`
//!
//! Known limitation: conversion normalizes by each recording's own peak
//! (see `series`), not by the documented range, so the recovered units are
//! only exact when a recording's peak matches that range. Both conventions are
//! kept as-is until the owners of the data settle on one.

pub mod ranges;
pub mod stats;

use crate::batch::discover;
use crate::table;
use indicatif::{ProgressBar, ProgressStyle};
use ranges::{SignalRange, SignalRangeTable};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Unknown signal type: {0}")]
    UnknownSignalType(String),
    #[error("Read error for {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Parse error in {path} line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("Table has no data rows: {0}")]
    EmptyTable(PathBuf),
    #[error("Discovery error: {0}")]
    Discovery(#[from] walkdir::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Statistics for one (subject, signal) pair, in physical units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectSummary {
    pub subject_id: String,
    pub signal_name: String,
    pub signal_type: String,
    pub unit: String,
    pub normal_range: String,
    pub sample_rate_hz: f64,
    pub duration_s: f64,
    pub sample_count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
}

impl SubjectSummary {
    /// One-line console digest. Acceleration reports spread (movement
    /// intensity); everything else reports mean and range.
    pub fn headline(&self) -> String {
        if self.signal_type == "acceleration" {
            format!(
                "{}: {:.3} {} std dev (movement intensity)",
                self.signal_name, self.std, self.unit
            )
        } else {
            format!(
                "{}: {:.1} {} (range: {:.1}-{:.1})",
                self.signal_name, self.mean, self.unit, self.min, self.max
            )
        }
    }
}

/// Map a normalized value in `[-1, 1]` onto the range's physical extent.
pub fn denormalize(normalized: f64, range: &SignalRange) -> f64 {
    (normalized + 1.0) / 2.0 * (range.physical_max - range.physical_min) + range.physical_min
}

/// Denormalize `Ch1` of a converted table and describe it.
pub fn summarize(
    table_path: &Path,
    signal_type: &str,
    ranges: &SignalRangeTable,
) -> Result<SubjectSummary, AnalysisError> {
    let range = ranges
        .get(signal_type)
        .ok_or_else(|| AnalysisError::UnknownSignalType(signal_type.to_string()))?;

    let (times, values) = load_table(table_path)?;
    let physical: Vec<f64> = values.iter().map(|&v| denormalize(v, range)).collect();
    let d = stats::describe(&physical)
        .ok_or_else(|| AnalysisError::EmptyTable(table_path.to_path_buf()))?;

    let sidecar = table::sidecar_path(table_path);
    let (sample_rate_hz, duration_s) = match table::read_metadata(&sidecar) {
        Ok(meta) => (meta.output_sample_rate_hz, meta.duration_s),
        Err(e) => {
            log::debug!("No usable sidecar for {}: {}", table_path.display(), e);
            infer_timing(&times)
        }
    };

    Ok(SubjectSummary {
        subject_id: parent_name(table_path),
        signal_name: file_stem(table_path),
        signal_type: signal_type.to_lowercase(),
        unit: range.unit.clone(),
        normal_range: range.normal_range.clone(),
        sample_rate_hz,
        duration_s,
        sample_count: d.count,
        mean: d.mean,
        std: d.std,
        min: d.min,
        max: d.max,
        q25: d.q25,
        median: d.median,
        q75: d.q75,
    })
}

/// Read the time column and `Ch1`. A leading non-numeric line is taken as the header.
fn load_table(path: &Path) -> Result<(Vec<f64>, Vec<f64>), AnalysisError> {
    let read_err = |source| AnalysisError::Read {
        path: path.to_path_buf(),
        source,
    };
    let reader = BufReader::new(File::open(path).map_err(read_err)?);

    let mut times = Vec::new();
    let mut values = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(read_err)?;
        let line = line.trim();
        if line.is_empty() || (idx == 0 && line.starts_with("Time_s")) {
            continue;
        }
        let mut fields = line.split(',');
        let (Some(t), Some(v)) = (fields.next(), fields.next()) else {
            return Err(AnalysisError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                message: "expected at least two columns".to_string(),
            });
        };
        let parse = |s: &str| {
            s.trim().parse::<f64>().map_err(|e| AnalysisError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                message: format!("{:?}: {}", s, e),
            })
        };
        times.push(parse(t)?);
        values.push(parse(v)?);
    }
    Ok((times, values))
}

/// Rate and duration from the time column when there is no sidecar.
fn infer_timing(times: &[f64]) -> (f64, f64) {
    if times.len() < 2 {
        return (0.0, 0.0);
    }
    let span = times[times.len() - 1] - times[0];
    if span <= 0.0 {
        return (0.0, 0.0);
    }
    let rate = (times.len() - 1) as f64 / span;
    (rate, times.len() as f64 / rate)
}

fn parent_name(path: &Path) -> String {
    path.parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Totals from an analysis run.
#[derive(Debug, Default)]
pub struct AnalysisReport {
    pub subjects: usize,
    pub summaries: Vec<SubjectSummary>,
    /// Tables whose name maps to no known signal type.
    pub unclassified: usize,
    pub failed: usize,
    pub files_written: Vec<PathBuf>,
}

/// Summarize every converted table under `processed_root` and write one
/// `<subject>_summary.csv` per subject into `analysis_dir`.
pub fn analyze_subjects(
    processed_root: &Path,
    analysis_dir: &Path,
    subjects: Option<&BTreeSet<String>>,
    ranges: &SignalRangeTable,
) -> Result<AnalysisReport, AnalysisError> {
    let mut subject_dirs = discover::list_subject_dirs(processed_root)?;
    if let Some(filter) = subjects {
        subject_dirs.retain(|(id, _)| filter.contains(id));
    }

    std::fs::create_dir_all(analysis_dir)?;

    let pb = ProgressBar::new(subject_dirs.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} subjects {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );

    let mut report = AnalysisReport {
        subjects: subject_dirs.len(),
        ..Default::default()
    };

    for (subject_id, dir) in &subject_dirs {
        pb.set_message(subject_id.clone());
        let mut rows = Vec::new();

        for table_path in discover::list_files_with_extension(dir, "csv")? {
            let name = file_stem(&table_path);
            let Some(signal_type) = ranges.classify(&name) else {
                log::info!("{}: no signal range for '{}', skipping", subject_id, name);
                report.unclassified += 1;
                continue;
            };
            match summarize(&table_path, signal_type, ranges) {
                Ok(summary) => rows.push(summary),
                Err(e) => {
                    log::warn!("{}: failed to summarize {}: {}", subject_id, name, e);
                    report.failed += 1;
                }
            }
        }

        if !rows.is_empty() {
            let path = analysis_dir.join(format!("{}_summary.csv", subject_id));
            write_summary_csv(&path, &rows)?;
            log::info!("Summary for {} written to {}", subject_id, path.display());
            report.files_written.push(path);
        }
        report.summaries.extend(rows);
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(report)
}

pub const SUMMARY_HEADER: &str =
    "Signal,Unit,Normal_Range,Sample_Rate_Hz,Duration_Min,Samples,Min,Max,Mean,Std,Median,Q25,Q75";

pub fn write_summary_csv(path: &Path, rows: &[SubjectSummary]) -> std::io::Result<()> {
    let mut out = std::io::BufWriter::new(File::create(path)?);
    writeln!(out, "{}", SUMMARY_HEADER)?;
    for s in rows {
        writeln!(
            out,
            "{},{},{},{},{:.1},{},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3}",
            s.signal_name,
            s.unit,
            s.normal_range,
            s.sample_rate_hz,
            s.duration_s / 60.0,
            s.sample_count,
            s.min,
            s.max,
            s.mean,
            s.std,
            s.median,
            s.q25,
            s.q75
        )?;
    }
    out.flush()
}
