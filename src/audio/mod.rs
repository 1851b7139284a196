pub mod analyser;
pub mod backend;
pub mod capture;
pub mod codec;
pub mod microphone;
pub mod playback;
pub mod resampler;
pub mod speaker;

pub use analyser::Analyser;
pub use backend::{AudioFrame, AudioInput, AudioOutput, CpalDeviceFactory, DeviceFactory, OutputFormat};
pub use capture::{AudioCapture, CaptureConfig, FrameGate};
pub use playback::{LoudnessMeter, PlaybackBuffer, PlaybackScheduler, SharedTimeline};
pub use resampler::StreamResampler;
