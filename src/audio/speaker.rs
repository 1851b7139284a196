// cpal speaker backend
//
// Same threading model as the microphone: the stream is built and owned by
// a dedicated thread. The render callback pulls straight from the shared
// playback timeline, so the device clock is exactly the frames rendered.

use std::thread;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, error, info};

use super::backend::{select_device, AudioOutput, DeviceKind, OutputFormat};
use super::playback::SharedTimeline;
use crate::error::AudioError;

const INIT_TIMEOUT_SECS: u32 = 5;

/// Speaker output via cpal
pub struct Speaker {
    device: String,
    gain: f32,
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl Speaker {
    pub fn new(device: String, gain: f32) -> Self {
        Self {
            device,
            gain,
            stop_tx: None,
            thread_handle: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioOutput for Speaker {
    async fn start(&mut self) -> Result<SharedTimeline, AudioError> {
        if self.stop_tx.is_some() {
            return Err(AudioError::StreamError("already playing".to_string()));
        }

        let (init_tx, init_rx) = oneshot::channel::<Result<(String, SharedTimeline), AudioError>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

        let device_name = self.device.clone();
        let gain = self.gain;

        let thread_handle = thread::spawn(move || {
            let stream = match open_stream(&device_name, gain) {
                Ok((stream, name, timeline)) => {
                    let _ = init_tx.send(Ok((name, timeline)));
                    stream
                }
                Err(e) => {
                    let _ = init_tx.send(Err(e));
                    return;
                }
            };

            let _ = stop_rx.recv();
            drop(stream);
            debug!("Speaker thread stopped");
        });

        let init = tokio::time::timeout(
            Duration::from_secs(INIT_TIMEOUT_SECS as u64),
            init_rx,
        )
        .await;

        match init {
            Ok(Ok(Ok((name, timeline)))) => {
                info!("Using output device: {}", name);
                self.stop_tx = Some(stop_tx);
                self.thread_handle = Some(thread_handle);
                Ok(timeline)
            }
            Ok(Ok(Err(e))) => {
                let _ = thread_handle.join();
                Err(e)
            }
            Ok(Err(_)) => Err(AudioError::DeviceUnavailable(
                "speaker thread exited during startup".to_string(),
            )),
            Err(_) => {
                let _ = stop_tx.send(());
                Err(AudioError::Timeout(INIT_TIMEOUT_SECS))
            }
        }
    }

    async fn stop(&mut self) -> Result<(), AudioError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(handle) = self.thread_handle.take() {
            tokio::task::spawn_blocking(move || handle.join())
                .await
                .map_err(|e| AudioError::StreamError(e.to_string()))?
                .map_err(|_| AudioError::StreamError("speaker thread panicked".to_string()))?;
        }

        Ok(())
    }

    fn is_running(&self) -> bool {
        self.stop_tx.is_some()
    }

    fn name(&self) -> &str {
        "cpal speaker"
    }
}

fn open_stream(
    device_name: &str,
    gain: f32,
) -> Result<(cpal::Stream, String, SharedTimeline), AudioError> {
    use cpal::traits::{DeviceTrait, StreamTrait};

    let host = cpal::default_host();
    let device = select_device(&host, DeviceKind::Output, device_name)?;
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let supported = device
        .default_output_config()
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

    let format = OutputFormat {
        sample_rate: supported.sample_rate().0,
        channels: supported.channels(),
    };
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    debug!(
        "Output config: {} Hz, {} channel(s), format: {:?}",
        format.sample_rate, format.channels, sample_format
    );

    let timeline = SharedTimeline::new(format, gain);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_output::<f32>(&device, &config, timeline.clone()),
        cpal::SampleFormat::I16 => build_output::<i16>(&device, &config, timeline.clone()),
        cpal::SampleFormat::U16 => build_output::<u16>(&device, &config, timeline.clone()),
        format => Err(AudioError::DeviceUnavailable(format!(
            "unsupported sample format: {:?}",
            format
        ))),
    }?;

    stream
        .play()
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

    Ok((stream, name, timeline))
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    timeline: SharedTimeline,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    use cpal::traits::DeviceTrait;

    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                timeline.render(&mut scratch);
                for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(sample);
                }
            },
            |err| error!("Output stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))
}
