// Streaming resampler for the capture path
//
// Device callbacks hand out blocks of whatever size the platform likes.
// Resampling each block on its own rounds every block's length and breaks
// phase at the edges, so input is collected into fixed chunks for one
// long-lived rubato resampler that keeps its state across pushes.

use rubato::{FftFixedIn, Resampler};

use crate::error::AudioError;

const CHUNK_SIZE: usize = 1024;

/// Mono resampler that accepts arbitrary block sizes
pub struct StreamResampler {
    resampler: Option<FftFixedIn<f32>>,
    pending: Vec<f32>,
}

impl StreamResampler {
    /// Passes samples through untouched when the rates match
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self, AudioError> {
        let resampler = if from_rate == to_rate {
            None
        } else {
            let resampler =
                FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, 1, 1)
                    .map_err(|e| {
                        AudioError::StreamError(format!(
                            "cannot resample {}Hz to {}Hz: {}",
                            from_rate, to_rate, e
                        ))
                    })?;
            Some(resampler)
        };

        Ok(Self {
            resampler,
            pending: Vec::with_capacity(CHUNK_SIZE),
        })
    }

    /// Feed one block; returns whatever output is ready
    pub fn push(&mut self, mut block: &[f32]) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return block.to_vec();
        };

        let mut output = Vec::new();
        while !block.is_empty() {
            let take = (CHUNK_SIZE - self.pending.len()).min(block.len());
            self.pending.extend_from_slice(&block[..take]);
            block = &block[take..];

            if self.pending.len() == CHUNK_SIZE {
                match resampler.process(&[&self.pending[..]], None) {
                    Ok(mut chunk) => output.append(&mut chunk[0]),
                    Err(e) => tracing::debug!("Resampler dropped a chunk: {}", e),
                }
                self.pending.clear();
            }
        }
        output
    }

    /// Input samples waiting for a full chunk
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}
