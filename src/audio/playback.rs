// Playback scheduler for agent audio
//
// Buffers arrive in server order and are laid end to end on a single
// timeline measured in output-device frames. The device render callback
// reads from the same timeline, which makes the device clock the number of
// frames rendered so far.
//
// Timeline invariants:
// - every scheduled buffer starts at or after the end of the one before it
// - no buffer is scheduled before the device clock at the time of enqueue
// - interrupt() empties the timeline and drops the cursor back to zero, so
//   the next enqueue re-anchors on the live clock

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, trace};

use super::analyser::{Analyser, FFT_SIZE};
use super::backend::{AudioOutput, OutputFormat};
use crate::error::AudioError;

/// Decoded agent audio, mono, at the output device's rate
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
    start_frame: Option<u64>,
}

impl PlaybackBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            start_frame: None,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length in device frames
    pub fn frames(&self) -> u64 {
        self.samples.len() as u64
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Scheduled start time in seconds, once the buffer is on a timeline
    pub fn start_time(&self) -> Option<f64> {
        self.start_frame
            .map(|frame| frame as f64 / self.sample_rate as f64)
    }

    fn end_frame(&self) -> u64 {
        self.start_frame.unwrap_or(0) + self.frames()
    }
}

/// The output timeline: a next-start cursor plus the set of scheduled buffers
pub struct PlaybackTimeline {
    format: OutputFormat,
    gain: f32,
    /// Device clock, in frames
    frames_rendered: u64,
    /// Where the next buffer goes, in frames
    next_start_frame: u64,
    /// Active buffers in start order
    scheduled: VecDeque<PlaybackBuffer>,
    /// Most recent rendered output, for the analyser
    recent: VecDeque<f32>,
    completed: u64,
}

impl PlaybackTimeline {
    fn new(format: OutputFormat, gain: f32) -> Self {
        Self {
            format,
            gain,
            frames_rendered: 0,
            next_start_frame: 0,
            scheduled: VecDeque::new(),
            recent: VecDeque::with_capacity(FFT_SIZE),
            completed: 0,
        }
    }

    fn seconds(&self, frames: u64) -> f64 {
        frames as f64 / self.format.sample_rate as f64
    }

    fn schedule(&mut self, mut buffer: PlaybackBuffer) -> f64 {
        let start = self.next_start_frame.max(self.frames_rendered);
        buffer.start_frame = Some(start);
        self.next_start_frame = start + buffer.frames();

        let start_time = self.seconds(start);
        trace!(
            "Scheduled {:.3}s of audio at {:.3}s (clock {:.3}s)",
            buffer.duration(),
            start_time,
            self.seconds(self.frames_rendered)
        );

        if buffer.frames() > 0 {
            self.scheduled.push_back(buffer);
        }

        start_time
    }

    fn clear(&mut self) -> usize {
        let stopped = self.scheduled.len();
        self.scheduled.clear();
        self.next_start_frame = 0;
        stopped
    }

    /// Drop buffers whose last frame has been rendered
    fn release_finished(&mut self) {
        while let Some(front) = self.scheduled.front() {
            if front.end_frame() > self.frames_rendered {
                break;
            }
            self.scheduled.pop_front();
            self.completed += 1;
        }
    }

    fn render(&mut self, out: &mut [f32]) {
        let channels = self.format.channels.max(1) as usize;

        for frame in out.chunks_mut(channels) {
            self.release_finished();

            let now = self.frames_rendered;
            let sample = match self.scheduled.front() {
                Some(buffer) => match buffer.start_frame {
                    Some(start) if start <= now => buffer.samples[(now - start) as usize] * self.gain,
                    _ => 0.0,
                },
                None => 0.0,
            };

            frame.fill(sample);

            if self.recent.len() == FFT_SIZE {
                self.recent.pop_front();
            }
            self.recent.push_back(sample);

            self.frames_rendered += 1;
        }

        self.release_finished();
    }
}

/// Timeline shared between the scheduler and the device render callback
#[derive(Clone)]
pub struct SharedTimeline {
    inner: Arc<Mutex<PlaybackTimeline>>,
}

impl SharedTimeline {
    pub fn new(format: OutputFormat, gain: f32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PlaybackTimeline::new(format, gain))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlaybackTimeline> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn format(&self) -> OutputFormat {
        self.lock().format
    }

    /// Fill an interleaved device buffer and advance the clock
    pub fn render(&self, out: &mut [f32]) {
        self.lock().render(out);
    }

    /// Advance the clock by `frames` without keeping the output
    pub fn advance(&self, frames: usize) {
        let channels = self.format().channels.max(1) as usize;
        let mut scratch = vec![0.0; frames * channels];
        self.render(&mut scratch);
    }

    /// Device clock in seconds
    pub fn current_time(&self) -> f64 {
        let timeline = self.lock();
        timeline.seconds(timeline.frames_rendered)
    }

    /// Where the next buffer would be placed, before clamping to the clock
    pub fn next_start_time(&self) -> f64 {
        let timeline = self.lock();
        timeline.seconds(timeline.next_start_frame)
    }

    /// Buffers scheduled or playing
    pub fn active(&self) -> Vec<PlaybackBuffer> {
        self.lock().scheduled.iter().cloned().collect()
    }

    /// Buffers that have played to the end
    pub fn completed(&self) -> u64 {
        self.lock().completed
    }

    fn recent_output(&self) -> Vec<f32> {
        self.lock().recent.iter().copied().collect()
    }
}

/// Reads output loudness without touching the schedule
#[derive(Clone)]
pub struct LoudnessMeter {
    timeline: SharedTimeline,
    analyser: Analyser,
}

impl LoudnessMeter {
    pub fn level(&self) -> f32 {
        self.analyser.level(&self.timeline.recent_output())
    }
}

/// Gapless, in-order scheduler over the output device
pub struct PlaybackScheduler {
    timeline: SharedTimeline,
    output: Option<Box<dyn AudioOutput>>,
    analyser: Analyser,
    running: bool,
}

impl PlaybackScheduler {
    /// Acquire the output device and schedule against its clock
    pub async fn start(mut output: Box<dyn AudioOutput>) -> Result<Self, AudioError> {
        let timeline = output.start().await?;
        let format = timeline.format();

        info!(
            "Playback started on {} ({}Hz, {} channels)",
            output.name(),
            format.sample_rate,
            format.channels
        );

        Ok(Self {
            timeline,
            output: Some(output),
            analyser: Analyser::new(),
            running: true,
        })
    }

    /// Schedule against a timeline rendered by someone else
    pub fn with_timeline(timeline: SharedTimeline) -> Self {
        Self {
            timeline,
            output: None,
            analyser: Analyser::new(),
            running: true,
        }
    }

    /// Output format, or `None` once the device has been released
    pub fn format(&self) -> Option<OutputFormat> {
        self.running.then(|| self.timeline.format())
    }

    pub fn timeline(&self) -> &SharedTimeline {
        &self.timeline
    }

    /// Schedule a buffer right after the previous one, never in the past
    ///
    /// Returns the start time in seconds on the device clock.
    pub fn enqueue(&self, buffer: PlaybackBuffer) -> f64 {
        self.timeline.lock().schedule(buffer)
    }

    /// Stop everything scheduled and re-anchor the cursor
    ///
    /// Returns the number of buffers that were stopped.
    pub fn interrupt(&self) -> usize {
        let stopped = self.timeline.lock().clear();
        info!("Playback interrupted: {} buffers stopped", stopped);
        stopped
    }

    /// Drop the cursor back to zero so the next buffer starts on the live clock
    pub fn reanchor(&self) {
        self.timeline.lock().next_start_frame = 0;
    }

    /// Current output loudness in [0, 1]
    pub fn current_loudness(&self) -> f32 {
        self.analyser.level(&self.timeline.recent_output())
    }

    pub fn meter(&self) -> LoudnessMeter {
        LoudnessMeter {
            timeline: self.timeline.clone(),
            analyser: self.analyser.clone(),
        }
    }

    /// Stop playback and release the output device (idempotent)
    pub async fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;

        let stopped = self.timeline.lock().clear();
        debug!("Discarded {} scheduled buffers", stopped);

        if let Some(mut output) = self.output.take() {
            if let Err(e) = output.stop().await {
                tracing::error!("Failed to release output device {}: {}", output.name(), e);
            } else {
                info!("Released output device {}", output.name());
            }
        }
    }
}
