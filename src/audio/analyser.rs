// Output loudness analyser
//
// Frequency-domain energy of the most recent rendered output, reduced to a
// single level in [0, 1] for the visualizer. The byte mapping follows the
// usual analyser-node conventions: Blackman window, magnitudes scaled by 1/N,
// decibels mapped onto 0..=255 between -100 dB and -30 dB.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// FFT window length (128 frequency bins)
pub const FFT_SIZE: usize = 256;

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Reduces a window of samples to a normalized loudness level
#[derive(Clone)]
pub struct Analyser {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

impl Analyser {
    pub fn new() -> Self {
        let fft = FftPlanner::new().plan_fft_forward(FFT_SIZE);
        Self {
            fft,
            window: blackman(FFT_SIZE),
        }
    }

    /// Loudness of `samples` in [0, 1]
    ///
    /// Uses the last `FFT_SIZE` samples; shorter input is zero-padded at the front.
    pub fn level(&self, samples: &[f32]) -> f32 {
        let bins = self.byte_frequency_data(samples);
        if bins.is_empty() {
            return 0.0;
        }

        let sum: u32 = bins.iter().map(|&b| b as u32).sum();
        let average = sum as f32 / bins.len() as f32;
        (average / 128.0).clamp(0.0, 1.0)
    }

    /// Per-bin energy mapped onto 0..=255
    pub fn byte_frequency_data(&self, samples: &[f32]) -> Vec<u8> {
        let tail = &samples[samples.len().saturating_sub(FFT_SIZE)..];
        let pad = FFT_SIZE - tail.len();

        let mut buffer: Vec<Complex<f32>> = (0..FFT_SIZE)
            .map(|i| {
                let sample = if i < pad { 0.0 } else { tail[i - pad] };
                Complex::new(sample * self.window[i], 0.0)
            })
            .collect();

        self.fft.process(&mut buffer);

        buffer[..FFT_SIZE / 2]
            .iter()
            .map(|c| {
                let magnitude = c.norm() / FFT_SIZE as f32;
                if magnitude <= 0.0 {
                    return 0;
                }
                let db = 20.0 * magnitude.log10();
                let scaled = 255.0 * (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS);
                scaled.clamp(0.0, 255.0) as u8
            })
            .collect()
    }
}

impl Default for Analyser {
    fn default() -> Self {
        Self::new()
    }
}

fn blackman(len: usize) -> Vec<f32> {
    let alpha = 0.16f32;
    let a0 = 0.5 * (1.0 - alpha);
    let a1 = 0.5;
    let a2 = 0.5 * alpha;
    let n = len as f32;

    (0..len)
        .map(|i| {
            let x = i as f32 / n;
            a0 - a1 * (2.0 * std::f32::consts::PI * x).cos()
                + a2 * (4.0 * std::f32::consts::PI * x).cos()
        })
        .collect()
}
