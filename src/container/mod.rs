//! RIFF/WAVE container parsing.
//!
//! Walks the chunk list by hand: `fmt ` and `data` are required, everything
//! else (LIST, fact, vendor chunks) is skipped by its declared length.

pub mod decode;

use std::path::Path;
use thiserror::Error;

/// Linear PCM.
pub const FORMAT_PCM: u16 = 0x0001;
/// IEEE 754 float samples.
pub const FORMAT_IEEE_FLOAT: u16 = 0x0003;
/// WAVE_FORMAT_EXTENSIBLE; the real tag lives in the sub-format GUID.
pub const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Bit depths the decoder understands.
pub const SUPPORTED_BIT_DEPTHS: [u16; 4] = [8, 16, 24, 32];

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Malformed container: {0}")]
    Malformed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn malformed(msg: impl Into<String>) -> ContainerError {
    ContainerError::Malformed(msg.into())
}

/// Parsed `fmt ` chunk plus the length of the `data` chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveformHeader {
    /// Effective format tag (EXTENSIBLE is resolved to PCM or IEEE float).
    pub format_tag: u16,
    pub channel_count: u16,
    pub sample_rate_hz: u32,
    pub bits_per_sample: u16,
    pub byte_rate: u32,
    pub block_align: u16,
    pub data_byte_length: u32,
}

impl WaveformHeader {
    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    pub fn is_float(&self) -> bool {
        self.format_tag == FORMAT_IEEE_FLOAT
    }

    /// Number of interleaved samples in the data chunk.
    pub fn sample_count(&self) -> usize {
        self.data_byte_length as usize / self.bytes_per_sample()
    }

    /// Number of frames (one sample per channel).
    pub fn frame_count(&self) -> usize {
        self.sample_count() / self.channel_count as usize
    }

    pub fn duration_secs(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate_hz as f64
    }
}

/// Interleaved samples scaled to full-scale `[-1, 1]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSampleBuffer {
    samples: Vec<f64>,
}

impl RawSampleBuffer {
    pub fn new(samples: Vec<f64>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.samples
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.samples
    }
}

/// Read a WAV file in one pass and decode its samples.
pub fn read_container(path: &Path) -> Result<(WaveformHeader, RawSampleBuffer), ContainerError> {
    let bytes = std::fs::read(path)?;
    log::debug!("Read {} bytes from {}", bytes.len(), path.display());
    parse_container(&bytes)
}

/// Parse an in-memory WAV image.
pub fn parse_container(data: &[u8]) -> Result<(WaveformHeader, RawSampleBuffer), ContainerError> {
    if data.len() < 12 {
        return Err(malformed("file too short for RIFF header"));
    }
    if &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return Err(malformed("missing RIFF/WAVE signature"));
    }

    let mut pos = 12;
    let mut format: Option<FormatChunk> = None;
    let mut payload: Option<&[u8]> = None;

    while pos + 8 <= data.len() {
        let chunk_id = &data[pos..pos + 4];
        let chunk_size = read_u32(data, pos + 4) as usize;
        pos += 8;
        let remaining = data.len() - pos;

        match chunk_id {
            b"fmt " => {
                if chunk_size > remaining {
                    return Err(malformed("fmt chunk truncated"));
                }
                format = Some(parse_format_chunk(&data[pos..pos + chunk_size])?);
            }
            b"data" => {
                if chunk_size > remaining {
                    return Err(malformed(format!(
                        "data chunk declares {} bytes but only {} remain",
                        chunk_size, remaining
                    )));
                }
                payload = Some(&data[pos..pos + chunk_size]);
                // Nothing after the samples is needed once fmt is known
                if format.is_some() {
                    break;
                }
            }
            other => {
                log::trace!(
                    "Skipping chunk {:?} ({} bytes)",
                    String::from_utf8_lossy(other),
                    chunk_size
                );
            }
        }

        // Chunks are word-aligned: odd sizes carry one pad byte
        pos = pos.saturating_add(chunk_size + (chunk_size & 1));
    }

    let format = format.ok_or_else(|| malformed("fmt chunk not found"))?;
    let payload = payload.ok_or_else(|| malformed("data chunk not found"))?;

    let header = WaveformHeader {
        format_tag: format.format_tag,
        channel_count: format.channel_count,
        sample_rate_hz: format.sample_rate_hz,
        bits_per_sample: format.bits_per_sample,
        byte_rate: format.byte_rate,
        block_align: format.block_align,
        data_byte_length: payload.len() as u32,
    };
    validate_layout(&header)?;

    let samples = decode::decode_samples(&header, payload)?;
    Ok((header, RawSampleBuffer::new(samples)))
}

struct FormatChunk {
    format_tag: u16,
    channel_count: u16,
    sample_rate_hz: u32,
    byte_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
}

fn parse_format_chunk(chunk: &[u8]) -> Result<FormatChunk, ContainerError> {
    if chunk.len() < 16 {
        return Err(malformed(format!("fmt chunk too small ({} bytes)", chunk.len())));
    }

    let raw_tag = read_u16(chunk, 0);
    let channel_count = read_u16(chunk, 2);
    let sample_rate_hz = read_u32(chunk, 4);
    let byte_rate = read_u32(chunk, 8);
    let block_align = read_u16(chunk, 12);
    let bits_per_sample = read_u16(chunk, 14);

    let format_tag = match raw_tag {
        FORMAT_PCM | FORMAT_IEEE_FLOAT => raw_tag,
        FORMAT_EXTENSIBLE => {
            // cbSize(2) validBits(2) channelMask(4), then the GUID whose
            // first two bytes are the tag
            if chunk.len() < 26 {
                return Err(malformed("extensible fmt chunk missing sub-format"));
            }
            read_u16(chunk, 24)
        }
        other => return Err(malformed(format!("unsupported format tag 0x{:04X}", other))),
    };
    if format_tag != FORMAT_PCM && format_tag != FORMAT_IEEE_FLOAT {
        return Err(malformed(format!("unsupported sub-format tag 0x{:04X}", format_tag)));
    }

    if channel_count == 0 {
        return Err(malformed("channel count is zero"));
    }
    if sample_rate_hz == 0 {
        return Err(malformed("sample rate is zero"));
    }
    if !SUPPORTED_BIT_DEPTHS.contains(&bits_per_sample) {
        return Err(malformed(format!(
            "unsupported bit depth {} (expected 8/16/24/32)",
            bits_per_sample
        )));
    }
    if format_tag == FORMAT_IEEE_FLOAT && bits_per_sample != 32 {
        return Err(malformed(format!(
            "IEEE float samples must be 32-bit, got {}",
            bits_per_sample
        )));
    }

    Ok(FormatChunk {
        format_tag,
        channel_count,
        sample_rate_hz,
        byte_rate,
        block_align,
        bits_per_sample,
    })
}

/// Data length must be a whole number of frames and agree with block align.
fn validate_layout(header: &WaveformHeader) -> Result<(), ContainerError> {
    let frame_bytes = header.channel_count as usize * header.bytes_per_sample();
    if header.block_align as usize != frame_bytes {
        return Err(malformed(format!(
            "block align {} does not match {} channels x {} bits",
            header.block_align, header.channel_count, header.bits_per_sample
        )));
    }
    if header.data_byte_length as usize % frame_bytes != 0 {
        return Err(malformed(format!(
            "data length {} is not a multiple of the {}-byte frame size",
            header.data_byte_length, frame_bytes
        )));
    }
    Ok(())
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a WAV image from raw sample bytes, optionally with a vendor chunk before `fmt `.
    pub(crate) fn wav_bytes(
        format_tag: u16,
        channels: u16,
        sample_rate: u32,
        bits: u16,
        samples: &[u8],
        vendor_chunk: Option<(&[u8; 4], &[u8])>,
    ) -> Vec<u8> {
        let block_align = channels * bits / 8;
        let mut body = Vec::new();
        body.extend_from_slice(b"WAVE");
        if let Some((id, payload)) = vendor_chunk {
            body.extend_from_slice(id);
            body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            body.extend_from_slice(payload);
            if payload.len() % 2 == 1 {
                body.push(0);
            }
        }
        body.extend_from_slice(b"fmt ");
        body.extend_from_slice(&16u32.to_le_bytes());
        body.extend_from_slice(&format_tag.to_le_bytes());
        body.extend_from_slice(&channels.to_le_bytes());
        body.extend_from_slice(&sample_rate.to_le_bytes());
        body.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
        body.extend_from_slice(&block_align.to_le_bytes());
        body.extend_from_slice(&bits.to_le_bytes());
        body.extend_from_slice(b"data");
        body.extend_from_slice(&(samples.len() as u32).to_le_bytes());
        body.extend_from_slice(samples);

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    /// WAVE_FORMAT_EXTENSIBLE image with a 40-byte `fmt ` chunk naming `sub_format`.
    fn extensible_wav_bytes(
        sub_format: u16,
        channels: u16,
        bits: u16,
        samples: &[u8],
    ) -> Vec<u8> {
        let sample_rate = 256u32;
        let block_align = channels * bits / 8;
        let mut fmt = Vec::new();
        fmt.extend_from_slice(&FORMAT_EXTENSIBLE.to_le_bytes());
        fmt.extend_from_slice(&channels.to_le_bytes());
        fmt.extend_from_slice(&sample_rate.to_le_bytes());
        fmt.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
        fmt.extend_from_slice(&block_align.to_le_bytes());
        fmt.extend_from_slice(&bits.to_le_bytes());
        fmt.extend_from_slice(&22u16.to_le_bytes());
        fmt.extend_from_slice(&bits.to_le_bytes());
        fmt.extend_from_slice(&0u32.to_le_bytes());
        fmt.extend_from_slice(&sub_format.to_le_bytes());
        fmt.extend_from_slice(&[
            0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71,
        ]);
        assert_eq!(fmt.len(), 40);

        let mut body = Vec::new();
        body.extend_from_slice(b"WAVE");
        body.extend_from_slice(b"fmt ");
        body.extend_from_slice(&(fmt.len() as u32).to_le_bytes());
        body.extend_from_slice(&fmt);
        body.extend_from_slice(b"data");
        body.extend_from_slice(&(samples.len() as u32).to_le_bytes());
        body.extend_from_slice(samples);

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    fn pcm16(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_parse_pcm16_mono() {
        let bytes = wav_bytes(FORMAT_PCM, 1, 100, 16, &pcm16(&[0, 16384, -32768]), None);
        let (header, raw) = parse_container(&bytes).unwrap();
        assert_eq!(header.channel_count, 1);
        assert_eq!(header.sample_rate_hz, 100);
        assert_eq!(header.bits_per_sample, 16);
        assert_eq!(header.data_byte_length, 6);
        assert_eq!(header.sample_count(), 3);
        assert_eq!(raw.as_slice(), &[0.0, 0.5, -1.0]);
    }

    #[test]
    fn test_skips_vendor_chunks() {
        let bytes = wav_bytes(
            FORMAT_PCM,
            2,
            256,
            16,
            &pcm16(&[1, 2, 3, 4]),
            Some((b"hxsk", b"odd")),
        );
        let (header, raw) = parse_container(&bytes).unwrap();
        assert_eq!(header.channel_count, 2);
        assert_eq!(header.frame_count(), 2);
        assert_eq!(raw.len(), 4);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = wav_bytes(FORMAT_PCM, 1, 100, 16, &pcm16(&[0]), None);
        bytes[0..4].copy_from_slice(b"RIFX");
        assert!(matches!(parse_container(&bytes), Err(ContainerError::Malformed(_))));
    }

    #[test]
    fn test_truncated_data_chunk() {
        let mut bytes = wav_bytes(FORMAT_PCM, 1, 100, 16, &pcm16(&[1, 2, 3, 4, 5, 6]), None);
        bytes.truncate(bytes.len() - 5);
        let err = parse_container(&bytes).unwrap_err();
        assert!(matches!(err, ContainerError::Malformed(ref m) if m.contains("data chunk")));
    }

    #[test]
    fn test_unsupported_bit_depth() {
        let bytes = wav_bytes(FORMAT_PCM, 1, 100, 12, &[0, 0, 0], None);
        assert!(matches!(parse_container(&bytes), Err(ContainerError::Malformed(_))));
    }

    #[test]
    fn test_missing_fmt_chunk() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&12u32.to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&[0, 0]);
        let err = parse_container(&bytes).unwrap_err();
        assert!(matches!(err, ContainerError::Malformed(ref m) if m.contains("fmt")));
    }

    #[test]
    fn test_partial_frame_rejected() {
        // 3 bytes of 16-bit stereo is not a whole frame
        let bytes = wav_bytes(FORMAT_PCM, 2, 100, 16, &[0, 0, 0], None);
        assert!(matches!(parse_container(&bytes), Err(ContainerError::Malformed(_))));
    }

    #[test]
    fn test_float_requires_32_bits() {
        let bytes = wav_bytes(FORMAT_IEEE_FLOAT, 1, 100, 16, &pcm16(&[0]), None);
        assert!(matches!(parse_container(&bytes), Err(ContainerError::Malformed(_))));
    }

    #[test]
    fn test_empty_data_chunk_parses() {
        let bytes = wav_bytes(FORMAT_PCM, 1, 100, 16, &[], None);
        let (header, raw) = parse_container(&bytes).unwrap();
        assert_eq!(header.data_byte_length, 0);
        assert!(raw.is_empty());
    }

    #[test]
    fn test_extensible_resolves_sub_format() {
        let bytes = extensible_wav_bytes(FORMAT_PCM, 1, 16, &pcm16(&[16384, -16384]));
        let (header, raw) = parse_container(&bytes).unwrap();
        assert_eq!(header.format_tag, FORMAT_PCM);
        assert_eq!(raw.as_slice(), &[0.5, -0.5]);

        let floats: Vec<u8> = [0.25f32, -0.75].iter().flat_map(|v| v.to_le_bytes()).collect();
        let bytes = extensible_wav_bytes(FORMAT_IEEE_FLOAT, 1, 32, &floats);
        let (header, raw) = parse_container(&bytes).unwrap();
        assert!(header.is_float());
        assert_eq!(raw.as_slice(), &[0.25, -0.75]);
    }

    #[test]
    fn test_extensible_unsupported_sub_format() {
        // 0x0002 is MS ADPCM
        let bytes = extensible_wav_bytes(0x0002, 1, 16, &pcm16(&[0]));
        let err = parse_container(&bytes).unwrap_err();
        assert!(matches!(err, ContainerError::Malformed(ref m) if m.contains("sub-format")));
    }

    #[test]
    fn test_block_align_mismatch() {
        let mut bytes = wav_bytes(FORMAT_PCM, 1, 100, 16, &pcm16(&[1, 2]), None);
        // fmt body starts at 20; block align is its 12th byte
        bytes[32..34].copy_from_slice(&4u16.to_le_bytes());
        let err = parse_container(&bytes).unwrap_err();
        assert!(matches!(err, ContainerError::Malformed(ref m) if m.contains("block align")));
    }

    #[test]
    fn test_zero_channels_or_rate() {
        let mut bytes = wav_bytes(FORMAT_PCM, 1, 100, 16, &pcm16(&[1]), None);
        bytes[22..24].copy_from_slice(&0u16.to_le_bytes());
        let err = parse_container(&bytes).unwrap_err();
        assert!(matches!(err, ContainerError::Malformed(ref m) if m.contains("channel count")));

        let bytes = wav_bytes(FORMAT_PCM, 1, 0, 16, &pcm16(&[1]), None);
        let err = parse_container(&bytes).unwrap_err();
        assert!(matches!(err, ContainerError::Malformed(ref m) if m.contains("sample rate")));
    }
}
