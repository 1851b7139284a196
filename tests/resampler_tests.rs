// Integration tests for the capture-side resampler

use live_voice::audio::StreamResampler;

/// Push `seconds` of a 440Hz tone through in blocks cycling over `block_sizes`
fn run(from_rate: u32, to_rate: u32, seconds: usize, block_sizes: &[usize]) -> (usize, usize) {
    let mut resampler = StreamResampler::new(from_rate, to_rate).unwrap();
    let total = from_rate as usize * seconds;

    let mut fed = 0;
    let mut produced = 0;
    for &size in block_sizes.iter().cycle() {
        if fed >= total {
            break;
        }
        let size = size.min(total - fed);
        let block: Vec<f32> = (fed..fed + size)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / from_rate as f32).sin() * 0.5)
            .collect();
        produced += resampler.push(&block).len();
        fed += size;
    }
    (fed, produced)
}

#[test]
fn test_output_rate_does_not_drift() {
    // 500 samples at 44.1kHz is 181.4 samples at 16kHz; rounding per block would lose ~2000
    let (fed, produced) = run(44100, 16000, 60, &[500]);

    let expected = fed as f64 * 16000.0 / 44100.0;
    assert!(
        (produced as f64 - expected).abs() < 1000.0,
        "produced {} samples, expected about {}",
        produced,
        expected
    );
}

#[test]
fn test_odd_block_sizes() {
    let (fed, produced) = run(48000, 16000, 30, &[137, 509, 1021, 64, 2048, 1]);

    let expected = fed as f64 / 3.0;
    assert!(
        (produced as f64 - expected).abs() < 1000.0,
        "produced {} samples, expected about {}",
        produced,
        expected
    );
}

#[test]
fn test_small_blocks_are_buffered() {
    let mut resampler = StreamResampler::new(48000, 16000).unwrap();

    assert!(resampler.push(&[0.0; 100]).is_empty());
    assert_eq!(resampler.buffered(), 100);
}

#[test]
fn test_same_rate_passes_through() {
    let mut resampler = StreamResampler::new(16000, 16000).unwrap();
    let block = vec![0.25, -0.5, 0.75];

    assert_eq!(resampler.push(&block), block);
    assert_eq!(resampler.buffered(), 0);
}
