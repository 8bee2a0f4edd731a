//! One container → one table: read, build, write.

use crate::container::{self, ContainerError};
use crate::series::{self, SeriesError, SeriesOptions};
use crate::table::{self, ConversionMetadata, Provenance, TableError, TableOptions};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UnitError {
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error(transparent)]
    Table(#[from] TableError),
}

impl UnitError {
    /// Stable tag recorded in the batch ledger.
    pub fn kind(&self) -> &'static str {
        match self {
            UnitError::Container(_) => "malformed_container",
            UnitError::Series(SeriesError::EmptySeries) => "empty_series",
            UnitError::Series(SeriesError::InvalidBlockSize(_)) => "invalid_options",
            UnitError::Table(_) => "io_write",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvertOptions {
    pub series: SeriesOptions,
    pub table: TableOptions,
}

/// Convert `input` to `output` (creating its directory) and write the sidecar.
///
/// Nothing is created on disk until the container has been read and the
/// series built, so a corrupt input leaves no table behind.
pub fn convert_file(
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
) -> Result<ConversionMetadata, UnitError> {
    let (header, raw) = container::read_container(input)?;
    log::debug!(
        "{}: {} Hz, {} ch, {} bit, {} frames",
        input.display(),
        header.sample_rate_hz,
        header.channel_count,
        header.bits_per_sample,
        header.frame_count()
    );

    let series = series::build_series(&header, &raw, &options.series)?;
    drop(raw);

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| TableError::write(parent, e))?;
        }
    }

    let provenance = Provenance {
        source_path: std::fs::canonicalize(input).unwrap_or_else(|_| input.to_path_buf()),
        sample_rate_hz: header.sample_rate_hz,
        bits_per_sample: header.bits_per_sample,
        source_frames: header.frame_count(),
        normalized: options.series.normalize,
        mixed_to_mono: options.series.mono || header.channel_count == 1,
        average_block_size: options.series.average_block_size,
    };

    let metadata = match series.as_slice() {
        [single] => table::write_table(single, output, &provenance, &options.table)?,
        many => table::write_channels(many, output, &provenance, &options.table)?,
    };
    Ok(metadata)
}
