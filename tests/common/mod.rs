// Test doubles for devices and the agent transport
//
// They count acquisitions and releases so tests can check that every
// resource is released exactly once.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use live_voice::audio::{AudioInput, AudioOutput, DeviceFactory, OutputFormat, SharedTimeline};
use live_voice::transport::{AudioSender, Connector, EventSender, Session, TransportEvent};
use live_voice::{AudioConfig, AudioError, AudioFrame, ConnectionState, SessionConfig, TransportError};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

pub const OUTPUT_FORMAT: OutputFormat = OutputFormat {
    sample_rate: 24000,
    channels: 1,
};

/// Acquire/release counters shared between a fake and the test
#[derive(Debug, Default, Clone)]
pub struct Counters {
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
}

impl Counters {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

/// Microphone that delivers whatever the test pushes
pub struct FakeInput {
    fail: bool,
    counters: Counters,
    feed: Arc<Mutex<Option<mpsc::Sender<Vec<f32>>>>>,
    capturing: bool,
}

impl FakeInput {
    pub fn new(fail: bool, counters: Counters, feed: Arc<Mutex<Option<mpsc::Sender<Vec<f32>>>>>) -> Self {
        Self {
            fail,
            counters,
            feed,
            capturing: false,
        }
    }
}

#[async_trait::async_trait]
impl AudioInput for FakeInput {
    async fn start(&mut self) -> Result<mpsc::Receiver<Vec<f32>>, AudioError> {
        if self.fail {
            return Err(AudioError::DeviceUnavailable("permission denied".to_string()));
        }
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(64);
        *self.feed.lock().unwrap() = Some(tx);
        self.capturing = true;
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), AudioError> {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        self.feed.lock().unwrap().take();
        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "fake microphone"
    }
}

/// Speaker whose clock only moves when the test advances it
pub struct FakeOutput {
    fail: bool,
    counters: Counters,
    timeline: Arc<Mutex<Option<SharedTimeline>>>,
}

#[async_trait::async_trait]
impl AudioOutput for FakeOutput {
    async fn start(&mut self) -> Result<SharedTimeline, AudioError> {
        if self.fail {
            return Err(AudioError::DeviceUnavailable("no output device".to_string()));
        }
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        let timeline = SharedTimeline::new(OUTPUT_FORMAT, 1.0);
        *self.timeline.lock().unwrap() = Some(timeline.clone());
        Ok(timeline)
    }

    async fn stop(&mut self) -> Result<(), AudioError> {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.timeline.lock().unwrap().is_some()
    }

    fn name(&self) -> &str {
        "fake speaker"
    }
}

/// Device factory handing out fakes
#[derive(Default)]
pub struct FakeDevices {
    pub input_fails: bool,
    pub output_fails: bool,
    pub input: Counters,
    pub output: Counters,
    pub feed: Arc<Mutex<Option<mpsc::Sender<Vec<f32>>>>>,
    pub timeline: Arc<Mutex<Option<SharedTimeline>>>,
    /// State observed when devices were requested
    pub state: Mutex<Option<watch::Receiver<ConnectionState>>>,
    pub state_at_acquire: Mutex<Vec<ConnectionState>>,
}

impl FakeDevices {
    /// Push a block of samples into the microphone
    pub async fn speak(&self, samples: Vec<f32>) {
        let feed = self.feed.lock().unwrap().clone();
        if let Some(feed) = feed {
            feed.send(samples).await.unwrap();
        }
    }

    pub fn timeline(&self) -> SharedTimeline {
        self.timeline.lock().unwrap().clone().expect("output device was never started")
    }
}

impl DeviceFactory for FakeDevices {
    fn input(&self, _config: &AudioConfig) -> Box<dyn AudioInput> {
        if let Some(state) = self.state.lock().unwrap().as_ref() {
            self.state_at_acquire.lock().unwrap().push(*state.borrow());
        }
        Box::new(FakeInput::new(
            self.input_fails,
            self.input.clone(),
            Arc::clone(&self.feed),
        ))
    }

    fn output(&self, _config: &AudioConfig) -> Box<dyn AudioOutput> {
        Box::new(FakeOutput {
            fail: self.output_fails,
            counters: self.output.clone(),
            timeline: Arc::clone(&self.timeline),
        })
    }
}

/// Agent transport driven by the test
#[derive(Default)]
pub struct FakeConnector {
    pub fails: bool,
    /// How long `Session::close` takes
    pub close_delay: Duration,
    /// Outgoing frame queue size (default: the real one)
    pub queue_capacity: Option<usize>,
    pub opens: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
    pub events: Mutex<Option<EventSender>>,
    pub audio: Mutex<Option<AudioSender>>,
    pub frames: Mutex<Option<mpsc::Receiver<AudioFrame>>>,
    pub last_config: Mutex<Option<SessionConfig>>,
}

impl FakeConnector {
    pub fn failing() -> Self {
        Self {
            fails: true,
            ..Self::default()
        }
    }

    pub fn slow_close(close_delay: Duration) -> Self {
        Self {
            close_delay,
            ..Self::default()
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Deliver an event as if it came from the agent
    pub fn emit(&self, event: TransportEvent) {
        let events = self.events.lock().unwrap().clone();
        if let Some(events) = events {
            let _ = events.send(event);
        }
    }

    /// Finish the handshake
    pub fn open_session(&self) {
        if let Some(audio) = self.audio.lock().unwrap().as_ref() {
            audio.set_open(true);
        }
        self.emit(TransportEvent::Opened);
    }

    /// Wait for the next frame the session sent
    pub async fn next_frame(&self) -> Option<AudioFrame> {
        let mut frames = self.frames.lock().unwrap().take()?;
        let frame = tokio::time::timeout(Duration::from_secs(2), frames.recv())
            .await
            .ok()
            .flatten();
        *self.frames.lock().unwrap() = Some(frames);
        frame
    }

    pub fn try_frame(&self) -> Option<AudioFrame> {
        self.frames.lock().unwrap().as_mut()?.try_recv().ok()
    }
}

pub struct FakeSession {
    id: Uuid,
    audio: AudioSender,
    closes: Arc<AtomicUsize>,
    close_delay: Duration,
}

#[async_trait::async_trait]
impl Session for FakeSession {
    fn id(&self) -> Uuid {
        self.id
    }

    fn audio_sender(&self) -> AudioSender {
        self.audio.clone()
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.audio.set_open(false);
        if !self.close_delay.is_zero() {
            tokio::time::sleep(self.close_delay).await;
        }
        self.closes.fetch_add(1, Ordering::SeqCst);
        // Close failures must never reach the caller
        Err(TransportError::Send("socket already gone".to_string()))
    }
}

#[async_trait::async_trait]
impl Connector for FakeConnector {
    async fn open(
        &self,
        config: &SessionConfig,
        events: EventSender,
    ) -> Result<Box<dyn Session>, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fails {
            return Err(TransportError::ConnectFailed("connection refused".to_string()));
        }

        let (audio, frames) = match self.queue_capacity {
            Some(capacity) => AudioSender::with_capacity(capacity),
            None => AudioSender::channel(),
        };
        *self.events.lock().unwrap() = Some(events);
        *self.audio.lock().unwrap() = Some(audio.clone());
        *self.frames.lock().unwrap() = Some(frames);
        *self.last_config.lock().unwrap() = Some(config.clone());

        Ok(Box::new(FakeSession {
            id: Uuid::new_v4(),
            audio,
            closes: Arc::clone(&self.closes),
            close_delay: self.close_delay,
        }))
    }
}

/// Wait until the state reaches `want`
pub async fn wait_for_state(rx: &mut watch::Receiver<ConnectionState>, want: ConnectionState) {
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|state| *state == want))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", want))
        .unwrap();
}

/// Poll `check` until it holds
pub async fn eventually<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// 100ms of a 440Hz tone at 24kHz as wire PCM
pub fn tone_chunk(samples: usize) -> Vec<u8> {
    let tone: Vec<f32> = (0..samples)
        .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 24000.0).sin() * 0.5)
        .collect();
    live_voice::audio::codec::encode(&tone)
}
