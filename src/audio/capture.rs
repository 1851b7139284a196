// Audio capture pipeline: microphone -> fixed frames -> loudness + PCM
//
// The input backend hands out blocks of arbitrary size. The pipeline cuts
// them into fixed-size frames, measures RMS loudness, encodes each frame and
// passes it on. Frames are only delivered while the gate is open; anything
// captured before the session is confirmed open is discarded.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{AudioFrame, AudioInput};
use super::codec;
use crate::error::AudioError;

/// Frame-acceptance gate controlled by the connection state machine
#[derive(Debug, Clone, Default)]
pub struct FrameGate {
    open: Arc<AtomicBool>,
}

impl FrameGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Capture pipeline configuration
#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    /// Samples per frame (default: 4096)
    pub frame_size: usize,
    /// Capture rate in Hz (default: 16000)
    pub sample_rate: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_size: 4096,
            sample_rate: 16000,
        }
    }
}

/// Owns the microphone and the read loop
pub struct AudioCapture {
    config: CaptureConfig,
    input: Box<dyn AudioInput>,
    gate: FrameGate,
    frames_delivered: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl AudioCapture {
    pub fn new(input: Box<dyn AudioInput>, config: CaptureConfig) -> Self {
        Self {
            config,
            input,
            gate: FrameGate::new(),
            frames_delivered: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    /// Gate handle; frames flow only while it is open
    pub fn gate(&self) -> FrameGate {
        self.gate.clone()
    }

    pub fn is_capturing(&self) -> bool {
        self.task.is_some()
    }

    /// Frames handed to `on_frame` so far
    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::SeqCst)
    }

    /// Acquire the microphone and start the read loop
    ///
    /// `on_frame` receives each encoded frame with its RMS loudness.
    pub async fn start<F>(&mut self, mut on_frame: F) -> Result<(), AudioError>
    where
        F: FnMut(AudioFrame, f32) + Send + 'static,
    {
        if self.task.is_some() {
            warn!("Capture already started");
            return Ok(());
        }

        let mut blocks = self.input.start().await?;

        info!(
            "Capture started on {} ({}Hz, {} samples per frame)",
            self.input.name(),
            self.config.sample_rate,
            self.config.frame_size
        );

        let gate = self.gate.clone();
        let delivered = Arc::clone(&self.frames_delivered);
        let frame_size = self.config.frame_size.max(1);
        let sample_rate = self.config.sample_rate;

        let task = tokio::spawn(async move {
            let mut pending: Vec<f32> = Vec::with_capacity(frame_size * 2);
            let mut sequence: u64 = 0;
            let mut captured_samples: u64 = 0;

            while let Some(block) = blocks.recv().await {
                pending.extend_from_slice(&block);

                while pending.len() >= frame_size {
                    let samples: Vec<f32> = pending.drain(..frame_size).collect();
                    let timestamp_ms = captured_samples * 1000 / sample_rate as u64;
                    captured_samples += frame_size as u64;

                    if !gate.is_open() {
                        continue;
                    }

                    let loudness = rms(&samples);
                    let frame = AudioFrame {
                        pcm: codec::encode(&samples),
                        sample_rate,
                        sample_count: samples.len(),
                        sequence,
                        timestamp_ms,
                    };
                    sequence += 1;
                    delivered.fetch_add(1, Ordering::SeqCst);

                    on_frame(frame, loudness);
                }
            }

            debug!("Capture read loop ended");
        });

        self.task = Some(task);
        Ok(())
    }

    /// Stop the read loop and release the microphone (idempotent)
    pub async fn stop(&mut self) {
        self.gate.close();

        if let Some(task) = self.task.take() {
            task.abort();
        }

        if self.input.is_capturing() {
            match self.input.stop().await {
                Ok(()) => info!("Released input device {}", self.input.name()),
                Err(e) => tracing::error!("Failed to release input device {}: {}", self.input.name(), e),
            }
        }
    }
}

/// Root-mean-square level of a frame
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
