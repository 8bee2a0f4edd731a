//! Raw samples → timestamped series.
//!
//! Pipeline order is mix → normalize → downsample.
//!
//! Normalization here is **peak-absolute**: every value is divided by the
//! largest observed magnitude, so sign and relative amplitude survive and the
//! result lies in `[-1, 1]`. The summarizer's denormalization instead assumes a
//! fixed min-max mapping of `[-1, 1]` onto each signal type's physical range.
//! The two only agree when a recording's peak equals that range's extreme;
//! this is a known limitation, see `analysis::denormalize`.

use crate::container::{RawSampleBuffer, WaveformHeader};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Floor for the normalization peak so silent input doesn't divide by zero.
pub const NORMALIZE_EPSILON: f64 = 1e-12;

#[derive(Error, Debug, PartialEq)]
pub enum SeriesError {
    #[error("Empty series: container holds no samples")]
    EmptySeries,
    #[error("Invalid averaging block size {0} (must be >= 1)")]
    InvalidBlockSize(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesOptions {
    /// Average all channels into one series.
    pub mono: bool,
    /// Peak-absolute scale each series into `[-1, 1]`.
    pub normalize: bool,
    /// Replace each block of this many samples with its mean. 1 = off.
    pub average_block_size: usize,
}

impl Default for SeriesOptions {
    fn default() -> Self {
        Self {
            mono: false,
            normalize: false,
            average_block_size: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    pub timestamps: Vec<f64>,
    pub values: Vec<f64>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Build one series per output channel: exactly one when `mono` is set or the
/// input has a single channel, otherwise one per input channel.
pub fn build_series(
    header: &WaveformHeader,
    raw: &RawSampleBuffer,
    options: &SeriesOptions,
) -> Result<Vec<TimeSeries>, SeriesError> {
    if raw.is_empty() {
        return Err(SeriesError::EmptySeries);
    }
    if options.average_block_size == 0 {
        return Err(SeriesError::InvalidBlockSize(0));
    }

    let channels = header.channel_count.max(1) as usize;
    let mut columns = if options.mono || channels == 1 {
        vec![mix_to_mono(raw.as_slice(), channels)]
    } else {
        split_channels(raw.as_slice(), channels)
    };

    if options.normalize {
        for column in &mut columns {
            normalize_peak(column);
        }
    }

    let timestamps = timestamps(columns[0].len(), header.sample_rate_hz);

    let series = columns
        .into_iter()
        .map(|values| {
            let s = TimeSeries {
                timestamps: timestamps.clone(),
                values,
            };
            if options.average_block_size > 1 {
                block_average(&s, options.average_block_size)
            } else {
                s
            }
        })
        .collect();

    Ok(series)
}

/// `i / sample_rate_hz` for `i` in `0..n`.
pub fn timestamps(n: usize, sample_rate_hz: u32) -> Vec<f64> {
    let rate = sample_rate_hz as f64;
    (0..n).map(|i| i as f64 / rate).collect()
}

/// Mean of each interleaved frame.
pub fn mix_to_mono(samples: &[f64], channels: usize) -> Vec<f64> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f64>() / channels as f64)
        .collect()
}

/// De-interleave into one vector per channel.
pub fn split_channels(samples: &[f64], channels: usize) -> Vec<Vec<f64>> {
    let frames = samples.len() / channels;
    let mut out = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (c, &v) in frame.iter().enumerate() {
            out[c].push(v);
        }
    }
    out
}

/// Peak-absolute normalization in place. All-zero input stays all-zero.
pub fn normalize_peak(values: &mut [f64]) {
    let peak = values
        .iter()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()))
        .max(NORMALIZE_EPSILON);
    for v in values.iter_mut() {
        *v = (*v / peak).clamp(-1.0, 1.0);
    }
}

/// Non-overlapping block means; the trailing partial block is averaged over
/// its actual length and each block keeps its first timestamp.
pub fn block_average(series: &TimeSeries, block: usize) -> TimeSeries {
    let block = block.max(1);
    let values = series
        .values
        .chunks(block)
        .map(|chunk| chunk.iter().sum::<f64>() / chunk.len() as f64)
        .collect();
    let timestamps = series.timestamps.iter().step_by(block).copied().collect();
    TimeSeries { timestamps, values }
}
