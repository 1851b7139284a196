use tokio::sync::mpsc;

use super::playback::SharedTimeline;
use crate::config::AudioConfig;
use crate::error::AudioError;

/// One captured frame, already encoded for the wire (16-bit PCM, mono)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Encoded PCM bytes (i16 little-endian)
    pub pcm: Vec<u8>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of samples in the frame
    pub sample_count: usize,
    /// Position of this frame in the capture stream
    pub sequence: u64,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Frame duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.sample_count as f64 / self.sample_rate as f64
    }
}

/// Native format of an opened output device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Microphone backend trait
///
/// Implementations deliver mono f32 sample blocks at the requested rate.
/// Block sizes are whatever the platform hands out; framing happens in
/// the capture pipeline.
#[async_trait::async_trait]
pub trait AudioInput: Send {
    /// Acquire the input device and start capturing
    ///
    /// Fails with `DeviceUnavailable` if there is no device or access is denied.
    async fn start(&mut self) -> Result<mpsc::Receiver<Vec<f32>>, AudioError>;

    /// Release the input device
    async fn stop(&mut self) -> Result<(), AudioError>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Speaker backend trait
///
/// The device owns the playback clock: it creates a timeline at its native
/// rate and renders from it until stopped.
#[async_trait::async_trait]
pub trait AudioOutput: Send {
    /// Acquire the output device and start rendering from a fresh timeline
    async fn start(&mut self) -> Result<SharedTimeline, AudioError>;

    /// Release the output device
    async fn stop(&mut self) -> Result<(), AudioError>;

    /// Check if the device is rendering
    fn is_running(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Creates the device pair for each call
pub trait DeviceFactory: Send + Sync {
    fn input(&self, config: &AudioConfig) -> Box<dyn AudioInput>;

    fn output(&self, config: &AudioConfig) -> Box<dyn AudioOutput>;
}

/// Device factory backed by cpal (PipeWire, PulseAudio, ALSA, CoreAudio, WASAPI)
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalDeviceFactory;

impl DeviceFactory for CpalDeviceFactory {
    fn input(&self, config: &AudioConfig) -> Box<dyn AudioInput> {
        Box::new(super::microphone::Microphone::new(
            config.input_device.clone(),
            config.input_sample_rate,
        ))
    }

    fn output(&self, config: &AudioConfig) -> Box<dyn AudioOutput> {
        Box::new(super::speaker::Speaker::new(
            config.output_device.clone(),
            config.output_gain,
        ))
    }
}

/// Direction of a device lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeviceKind {
    Input,
    Output,
}

/// Find a cpal device by name
///
/// `"default"` selects the host default. Otherwise the name is matched
/// exactly, then case-insensitively, then as a case-insensitive substring.
pub(crate) fn select_device(
    host: &cpal::Host,
    kind: DeviceKind,
    name: &str,
) -> Result<cpal::Device, AudioError> {
    use cpal::traits::{DeviceTrait, HostTrait};

    if name == "default" {
        let device = match kind {
            DeviceKind::Input => host.default_input_device(),
            DeviceKind::Output => host.default_output_device(),
        };
        return device.ok_or_else(|| {
            AudioError::DeviceUnavailable(format!("no default {:?} device", kind).to_lowercase())
        });
    }

    let devices: Vec<cpal::Device> = match kind {
        DeviceKind::Input => host
            .input_devices()
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?
            .collect(),
        DeviceKind::Output => host
            .output_devices()
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?
            .collect(),
    };

    let named: Vec<(String, cpal::Device)> = devices
        .into_iter()
        .filter_map(|d| d.name().ok().map(|n| (n, d)))
        .collect();

    let search = name.to_lowercase();
    let position = named
        .iter()
        .position(|(n, _)| n == name)
        .or_else(|| named.iter().position(|(n, _)| n.to_lowercase() == search))
        .or_else(|| named.iter().position(|(n, _)| n.to_lowercase().contains(&search)));

    match position {
        Some(i) => {
            let (matched, device) = named.into_iter().nth(i).ok_or_else(|| {
                AudioError::DeviceUnavailable(name.to_string())
            })?;
            tracing::debug!("Matched {:?} device '{}' for '{}'", kind, matched, name);
            Ok(device)
        }
        None => {
            let available: Vec<String> = named.into_iter().map(|(n, _)| n).collect();
            Err(AudioError::DeviceUnavailable(format!(
                "'{}' not found (available: {})",
                name,
                if available.is_empty() {
                    "none".to_string()
                } else {
                    available.join(", ")
                }
            )))
        }
    }
}
