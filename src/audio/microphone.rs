// cpal microphone backend
//
// cpal::Stream is not Send, so the stream lives on a dedicated thread that
// builds it, reports back whether the device could be opened, and then
// parks until told to stop.

use std::thread;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use super::backend::{select_device, AudioInput, DeviceKind};
use super::resampler::StreamResampler;
use crate::error::AudioError;

const INIT_TIMEOUT_SECS: u32 = 5;

/// Microphone input via cpal, mixed to mono and resampled to the target rate
/// by a resampler that lives as long as the stream
pub struct Microphone {
    device: String,
    sample_rate: u32,
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl Microphone {
    pub fn new(device: String, sample_rate: u32) -> Self {
        Self {
            device,
            sample_rate,
            stop_tx: None,
            thread_handle: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioInput for Microphone {
    async fn start(&mut self) -> Result<mpsc::Receiver<Vec<f32>>, AudioError> {
        if self.stop_tx.is_some() {
            return Err(AudioError::StreamError("already capturing".to_string()));
        }

        let (block_tx, block_rx) = mpsc::channel(64);
        let (init_tx, init_rx) = oneshot::channel::<Result<String, AudioError>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

        let device_name = self.device.clone();
        let target_rate = self.sample_rate;

        let thread_handle = thread::spawn(move || {
            let stream = match open_stream(&device_name, target_rate, block_tx) {
                Ok((stream, name)) => {
                    let _ = init_tx.send(Ok(name));
                    stream
                }
                Err(e) => {
                    let _ = init_tx.send(Err(e));
                    return;
                }
            };

            // Parks until stop() or until the Microphone is dropped
            let _ = stop_rx.recv();
            drop(stream);
            debug!("Microphone thread stopped");
        });

        let init = tokio::time::timeout(
            Duration::from_secs(INIT_TIMEOUT_SECS as u64),
            init_rx,
        )
        .await;

        match init {
            Ok(Ok(Ok(name))) => {
                info!("Using input device: {}", name);
                self.stop_tx = Some(stop_tx);
                self.thread_handle = Some(thread_handle);
                Ok(block_rx)
            }
            Ok(Ok(Err(e))) => {
                let _ = thread_handle.join();
                Err(e)
            }
            Ok(Err(_)) => Err(AudioError::DeviceUnavailable(
                "microphone thread exited during startup".to_string(),
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
                .map_err(|_| AudioError::StreamError("microphone thread panicked".to_string()))?;
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.stop_tx.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

fn open_stream(
    device_name: &str,
    target_rate: u32,
    tx: mpsc::Sender<Vec<f32>>,
) -> Result<(cpal::Stream, String), AudioError> {
    use cpal::traits::{DeviceTrait, StreamTrait};

    let host = cpal::default_host();
    let device = select_device(&host, DeviceKind::Input, device_name)?;
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let supported = device
        .default_input_config()
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

    let source_rate = supported.sample_rate().0;
    let source_channels = supported.channels() as usize;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    debug!(
        "Input config: {} Hz, {} channel(s), format: {:?}",
        source_rate, source_channels, sample_format
    );

    let params = InputParams {
        tx,
        resampler: StreamResampler::new(source_rate, target_rate)?,
        source_channels,
    };

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_input::<f32>(&device, &config, params),
        cpal::SampleFormat::I16 => build_input::<i16>(&device, &config, params),
        cpal::SampleFormat::U16 => build_input::<u16>(&device, &config, params),
        format => Err(AudioError::DeviceUnavailable(format!(
            "unsupported sample format: {:?}",
            format
        ))),
    }?;

    stream
        .play()
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

    Ok((stream, name))
}

struct InputParams {
    tx: mpsc::Sender<Vec<f32>>,
    resampler: StreamResampler,
    source_channels: usize,
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    params: InputParams,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    use cpal::traits::DeviceTrait;

    let InputParams {
        tx,
        mut resampler,
        source_channels,
    } = params;
    let channels = source_channels.max(1);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mono: Vec<f32> = data
                    .chunks(channels)
                    .map(|frame| {
                        let sum: f32 = frame
                            .iter()
                            .map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s))
                            .sum();
                        sum / channels as f32
                    })
                    .collect();

                let block = resampler.push(&mono);
                if block.is_empty() {
                    return;
                }
                // Receiver may be gone or lagging; a dropped block is a glitch, not an error
                let _ = tx.try_send(block);
            },
            |err| error!("Input stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))
}
