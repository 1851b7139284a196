// PCM codec: native f32 samples <-> 16-bit little-endian wire PCM
//
// The agent speaks 16-bit signed little-endian PCM in both directions.
// Everything inside the crate works in f32 in [-1, 1].

use crate::error::CodecError;

use super::backend::OutputFormat;
use super::playback::PlaybackBuffer;

/// Bytes per wire sample
pub const SAMPLE_WIDTH: usize = 2;

const SCALE: f32 = 32768.0;

/// Encode f32 samples as 16-bit little-endian PCM
///
/// Samples are clamped to [-1, 1] before scaling. Empty input gives empty output.
pub fn encode(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| {
            let clamped = s.clamp(-1.0, 1.0);
            let value = (clamped * SCALE)
                .round()
                .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            value.to_le_bytes()
        })
        .collect()
}

/// Decode 16-bit little-endian PCM into f32 samples
pub fn decode(bytes: &[u8]) -> Result<Vec<f32>, CodecError> {
    if bytes.len() % SAMPLE_WIDTH != 0 {
        return Err(CodecError::MalformedAudioData(bytes.len()));
    }

    Ok(bytes
        .chunks_exact(SAMPLE_WIDTH)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / SCALE)
        .collect())
}

/// Decode a chunk of agent audio into a buffer bound to the output device
///
/// `source_rate` and `channels` describe the incoming PCM. Multi-channel
/// input is mixed down to mono; the result is resampled to the device rate.
/// Fails with `AudioDecodeError` when there is no output device to bind to.
pub fn decode_to_playback_buffer(
    bytes: &[u8],
    source_rate: u32,
    channels: u16,
    output: Option<OutputFormat>,
) -> Result<PlaybackBuffer, CodecError> {
    let output = output.ok_or_else(|| {
        CodecError::AudioDecodeError("output device is not available".to_string())
    })?;

    if source_rate == 0 || channels == 0 {
        return Err(CodecError::AudioDecodeError(format!(
            "invalid source format: {}Hz, {} channels",
            source_rate, channels
        )));
    }

    let samples = decode(bytes)?;

    let channels = channels as usize;
    if samples.len() % channels != 0 {
        return Err(CodecError::MalformedAudioData(bytes.len()));
    }

    let mono: Vec<f32> = if channels == 1 {
        samples
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    let resampled = resample(&mono, source_rate, output.sample_rate);

    Ok(PlaybackBuffer::new(resampled, output.sample_rate))
}

/// Linear interpolation resampling
pub(crate) fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio).round().max(1.0) as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_idx = i as f64 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = (src_idx - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else {
            samples.get(idx).copied().unwrap_or_else(|| samples[samples.len() - 1])
        };

        output.push(sample);
    }

    output
}
