// Integration tests for the PCM codec

use live_voice::audio::codec::{decode, decode_to_playback_buffer, encode};
use live_voice::audio::OutputFormat;
use live_voice::CodecError;

const MONO_24K: OutputFormat = OutputFormat {
    sample_rate: 24000,
    channels: 1,
};

#[test]
fn test_round_trip_within_quantization_error() {
    let samples: Vec<f32> = (0..1000).map(|i| (i as f32 / 500.0) - 1.0).collect();

    let decoded = decode(&encode(&samples)).unwrap();

    assert_eq!(decoded.len(), samples.len());
    for (original, restored) in samples.iter().zip(&decoded) {
        assert!(
            (original - restored).abs() <= 1.0 / 32768.0,
            "{} decoded as {}",
            original,
            restored
        );
    }
}

#[test]
fn test_encode_is_little_endian_16_bit() {
    let bytes = encode(&[0.0, 0.5, -1.0]);

    assert_eq!(bytes.len(), 6);
    assert_eq!(&bytes[0..2], &[0x00, 0x00]);
    assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), 16384);
    assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), i16::MIN);
}

#[test]
fn test_encode_clamps_out_of_range_samples() {
    let bytes = encode(&[1.5, -3.0, 1.0]);

    assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MAX);
    assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MIN);
    assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), i16::MAX);
}

#[test]
fn test_empty_input() {
    assert!(encode(&[]).is_empty());
    assert!(decode(&[]).unwrap().is_empty());
}

#[test]
fn test_decode_rejects_odd_length() {
    let result = decode(&[0x00, 0x40, 0x7f]);

    assert_eq!(result, Err(CodecError::MalformedAudioData(3)));
}

#[test]
fn test_decode_to_playback_buffer_at_device_rate() {
    let pcm = encode(&vec![0.25; 2400]);

    let buffer = decode_to_playback_buffer(&pcm, 24000, 1, Some(MONO_24K)).unwrap();

    assert_eq!(buffer.sample_rate(), 24000);
    assert_eq!(buffer.frames(), 2400);
    assert!((buffer.duration() - 0.1).abs() < 1e-9);
    assert!(buffer.start_time().is_none());
}

#[test]
fn test_decode_to_playback_buffer_resamples_to_device() {
    let device = OutputFormat {
        sample_rate: 48000,
        channels: 2,
    };
    let pcm = encode(&vec![0.1; 2400]);

    let buffer = decode_to_playback_buffer(&pcm, 24000, 1, Some(device)).unwrap();

    assert_eq!(buffer.sample_rate(), 48000);
    assert_eq!(buffer.frames(), 4800);
    assert!((buffer.duration() - 0.1).abs() < 1e-3);
}

#[test]
fn test_decode_to_playback_buffer_mixes_stereo_down() {
    // Left at 0.5, right at -0.5: mono is silence
    let interleaved: Vec<f32> = (0..200).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
    let pcm = encode(&interleaved);

    let buffer = decode_to_playback_buffer(&pcm, 24000, 2, Some(MONO_24K)).unwrap();

    assert_eq!(buffer.frames(), 100);
    assert!(buffer.samples().iter().all(|s| s.abs() < 1e-4));
}

#[test]
fn test_decode_to_playback_buffer_without_device() {
    let pcm = encode(&[0.1, 0.2]);

    let result = decode_to_playback_buffer(&pcm, 24000, 1, None);

    assert!(matches!(result, Err(CodecError::AudioDecodeError(_))));
}

#[test]
fn test_decode_to_playback_buffer_rejects_malformed_chunk() {
    let result = decode_to_playback_buffer(&[1, 2, 3], 24000, 1, Some(MONO_24K));

    assert_eq!(result, Err(CodecError::MalformedAudioData(3)));
}
