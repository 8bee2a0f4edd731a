use super::{ContainerError, WaveformHeader};

/// Decode little-endian sample bytes to `f64` in full-scale `[-1, 1]`.
///
/// 8-bit PCM is unsigned with a 128 offset; 16/24/32-bit PCM is signed.
/// 32-bit IEEE float is passed through unchanged; NaN or infinite samples
/// make the container malformed.
pub fn decode_samples(header: &WaveformHeader, bytes: &[u8]) -> Result<Vec<f64>, ContainerError> {
    let samples = match (header.is_float(), header.bits_per_sample) {
        (false, 8) => bytes.iter().map(|&b| (b as f64 - 128.0) / 128.0).collect(),
        (false, 16) => bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f64 / 32_768.0)
            .collect(),
        (false, 24) => bytes
            .chunks_exact(3)
            .map(|b| {
                let val = (b[0] as i32) | ((b[1] as i32) << 8) | ((b[2] as i32) << 16);
                // Sign-extend from bit 23
                let signed = (val << 8) >> 8;
                signed as f64 / 8_388_608.0
            })
            .collect(),
        (false, 32) => bytes
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64 / 2_147_483_648.0)
            .collect(),
        (true, 32) => {
            let samples: Vec<f64> = bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                .collect();
            if let Some(idx) = samples.iter().position(|v| !v.is_finite()) {
                return Err(ContainerError::Malformed(format!(
                    "non-finite float sample {} at index {}",
                    samples[idx], idx
                )));
            }
            samples
        }
        (_, bits) => {
            return Err(ContainerError::Malformed(format!(
                "no decoder for {}-bit samples",
                bits
            )));
        }
    };
    Ok(samples)
}
