//! CSV table output plus the `.meta.json` sidecar.
//!
//! The sidecar is written last and only after the table is complete, so its
//! presence is the marker for a finished conversion.

pub mod format;
pub mod writer;

use crate::series::TimeSeries;
use chrono::{DateTime, Utc};
use format::FloatFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use writer::ChunkedTableWriter;

/// Default rows per streamed chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1_000_000;

/// Sidecar extension, replacing the table's `.csv`.
pub const SIDECAR_EXTENSION: &str = "meta.json";

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Write error for {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Read error for {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Metadata JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Cannot write a table with no series")]
    NoSeries,
}

impl TableError {
    pub(crate) fn write(path: &Path, source: std::io::Error) -> Self {
        TableError::Write {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn read(path: &Path, source: std::io::Error) -> Self {
        TableError::Read {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableOptions {
    pub chunk_size: usize,
    pub float_format: FloatFormat,
    pub include_header: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            float_format: FloatFormat::default(),
            include_header: true,
        }
    }
}

/// Where a series came from and how it was shaped; copied into the sidecar.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub source_path: PathBuf,
    pub sample_rate_hz: u32,
    pub bits_per_sample: u16,
    /// Frames in the source container, before any downsampling.
    pub source_frames: usize,
    pub normalized: bool,
    pub mixed_to_mono: bool,
    pub average_block_size: usize,
}

/// Sidecar record for one finished conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionMetadata {
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub sample_rate_hz: u32,
    pub output_sample_rate_hz: f64,
    pub duration_s: f64,
    pub channel_count: usize,
    pub sample_count: usize,
    pub bits_per_sample: u16,
    pub normalized: bool,
    pub mixed_to_mono: bool,
    pub average_block_size: usize,
    pub file_size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// `signal.csv` → `signal.meta.json`
pub fn sidecar_path(table_path: &Path) -> PathBuf {
    table_path.with_extension(SIDECAR_EXTENSION)
}

/// Write a single series as `Time_s,Ch1`.
pub fn write_table(
    series: &TimeSeries,
    dest: &Path,
    provenance: &Provenance,
    options: &TableOptions,
) -> Result<ConversionMetadata, TableError> {
    write_channels(std::slice::from_ref(series), dest, provenance, options)
}

/// Write channels that share one time axis as `Time_s,Ch1,...,ChN`, then the sidecar.
pub fn write_channels(
    series: &[TimeSeries],
    dest: &Path,
    provenance: &Provenance,
    options: &TableOptions,
) -> Result<ConversionMetadata, TableError> {
    let first = series.first().ok_or(TableError::NoSeries)?;
    let rows = first.len();
    let chunk_size = options.chunk_size.max(1);

    // The sidecar marks a finished table; drop it before the table is truncated
    let sidecar = sidecar_path(dest);
    match std::fs::remove_file(&sidecar) {
        Ok(()) => log::debug!("Removed previous sidecar {}", sidecar.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(TableError::write(&sidecar, e)),
    }

    let mut writer = ChunkedTableWriter::create(
        dest,
        series.len(),
        options.float_format,
        options.include_header,
    )?;

    let mut start = 0;
    while start < rows {
        let end = (start + chunk_size).min(rows);
        let columns: Vec<&[f64]> = series.iter().map(|s| &s.values[start..end]).collect();
        writer.write_chunk(&first.timestamps[start..end], &columns)?;
        start = end;
    }
    let written = writer.finish()?;
    log::debug!("Wrote {} rows to {}", written, dest.display());

    let file_size_bytes = std::fs::metadata(dest)
        .map_err(|e| TableError::read(dest, e))?
        .len();

    let block = provenance.average_block_size.max(1);
    let metadata = ConversionMetadata {
        source_path: provenance.source_path.clone(),
        output_path: dest.to_path_buf(),
        sample_rate_hz: provenance.sample_rate_hz,
        output_sample_rate_hz: provenance.sample_rate_hz as f64 / block as f64,
        duration_s: provenance.source_frames as f64 / provenance.sample_rate_hz as f64,
        channel_count: series.len(),
        sample_count: written,
        bits_per_sample: provenance.bits_per_sample,
        normalized: provenance.normalized,
        mixed_to_mono: provenance.mixed_to_mono,
        average_block_size: block,
        file_size_bytes,
        created_at: Utc::now(),
    };

    write_metadata(&sidecar, &metadata)?;
    Ok(metadata)
}

/// Write the sidecar through a temp file so a half-written record never exists.
pub fn write_metadata(path: &Path, metadata: &ConversionMetadata) -> Result<(), TableError> {
    let json = serde_json::to_string_pretty(metadata)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, json).map_err(|e| TableError::write(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| TableError::write(path, e))?;
    Ok(())
}

pub fn read_metadata(path: &Path) -> Result<ConversionMetadata, TableError> {
    let text = std::fs::read_to_string(path).map_err(|e| TableError::read(path, e))?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provenance(frames: usize) -> Provenance {
        Provenance {
            source_path: PathBuf::from("/data/raw/001/heart_rate.wav"),
            sample_rate_hz: 4,
            bits_per_sample: 16,
            source_frames: frames,
            normalized: true,
            mixed_to_mono: true,
            average_block_size: 1,
        }
    }

    fn series(values: &[f64], rate: f64) -> TimeSeries {
        TimeSeries {
            timestamps: (0..values.len()).map(|i| i as f64 / rate).collect(),
            values: values.to_vec(),
        }
    }

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("out/001/heart_rate.csv")),
            PathBuf::from("out/001/heart_rate.meta.json")
        );
    }

    #[test]
    fn test_small_chunks_match_single_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let s = series(&[0.0, 0.25, -0.5, 1.0, -1.0], 4.0);

        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        write_table(&s, &a, &provenance(5), &TableOptions::default()).unwrap();
        let small = TableOptions {
            chunk_size: 2,
            ..Default::default()
        };
        write_table(&s, &b, &provenance(5), &small).unwrap();

        let text = std::fs::read_to_string(&a).unwrap();
        assert_eq!(text, std::fs::read_to_string(&b).unwrap());
        assert_eq!(text, "Time_s,Ch1\n0,0\n0.25,0.25\n0.5,-0.5\n0.75,1\n1,-1\n");
        assert!(!text.ends_with("\n\n"));
    }

    #[test]
    fn test_metadata_reports_real_file_size() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("heart_rate.csv");
        let s = series(&[0.5; 8], 4.0);
        let meta = write_table(&s, &dest, &provenance(8), &TableOptions::default()).unwrap();

        assert_eq!(meta.file_size_bytes, std::fs::metadata(&dest).unwrap().len());
        assert_eq!(meta.sample_count, 8);
        assert_eq!(meta.channel_count, 1);
        assert_eq!(meta.duration_s, 2.0);

        let sidecar = sidecar_path(&dest);
        assert!(sidecar.exists());
        assert!(!dir.path().join("heart_rate.meta.json.tmp").exists());
        let read_back = read_metadata(&sidecar).unwrap();
        assert_eq!(read_back, meta);
    }

    #[test]
    fn test_without_header() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("x.csv");
        let opts = TableOptions {
            include_header: false,
            float_format: FloatFormat::Fixed(2),
            ..Default::default()
        };
        write_table(&series(&[0.5], 4.0), &dest, &provenance(1), &opts).unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "0.00,0.50\n");
    }

    #[test]
    fn test_multichannel_columns() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("acc.csv");
        let chans = [series(&[0.1, 0.2], 4.0), series(&[-0.1, -0.2], 4.0)];
        let meta = write_channels(&chans, &dest, &provenance(2), &TableOptions::default()).unwrap();
        assert_eq!(meta.channel_count, 2);
        assert_eq!(
            std::fs::read_to_string(&dest).unwrap(),
            "Time_s,Ch1,Ch2\n0,0.1,-0.1\n0.25,0.2,-0.2\n"
        );
    }

    #[test]
    fn test_failed_write_leaves_no_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("no_such_dir").join("x.csv");
        let err = write_table(&series(&[0.5], 4.0), &dest, &provenance(1), &TableOptions::default())
            .unwrap_err();
        assert!(matches!(err, TableError::Write { .. }));
        assert!(!sidecar_path(&dest).exists());
    }

    #[test]
    fn test_failed_rewrite_removes_previous_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("heart_rate.csv");
        let s = series(&[0.5, -0.5], 4.0);
        write_table(&s, &dest, &provenance(2), &TableOptions::default()).unwrap();
        assert!(sidecar_path(&dest).is_file());

        // A directory in the table's place makes the rewrite fail on create
        std::fs::remove_file(&dest).unwrap();
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("blocker"), b"x").unwrap();

        let err = write_table(&s, &dest, &provenance(2), &TableOptions::default()).unwrap_err();
        assert!(matches!(err, TableError::Write { .. }));
        assert!(!sidecar_path(&dest).exists());
    }
}
