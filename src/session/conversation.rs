// Connection state machine for a live voice call
//
// One Conversation owns at most one ActiveCall. Every resource a call holds
// (microphone, speaker, agent session, background tasks) lives in that
// struct and is released by taking it out of the slot, so each one is
// released exactly once whichever path ends the call.
//
// Transport events for a call are drained by a single task in arrival
// order; the state, transcript buffers and playback timeline are only
// mutated under the call lock. Teardown keeps that lock until the state has
// moved, so a connect() or disconnect() racing a slow release waits for it
// instead of seeing an empty slot with a stale state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::state::ConnectionState;
use super::stats::CallStats;
use super::turns::{ChatMessage, TurnAssembler};
use crate::audio::{codec, AudioCapture, AudioFrame, CpalDeviceFactory, DeviceFactory, LoudnessMeter, PlaybackScheduler};
use crate::config::{Config, HistoryPolicy};
use crate::error::LiveError;
use crate::transport::{AudioSender, Connector, EventReceiver, LiveClient, Session, TransportEvent};

/// A real-time voice conversation with a remote agent
///
/// `connect()` and `disconnect()` are safe to call from any state.
/// State, transcript and volume are published through watch channels.
#[derive(Clone)]
pub struct Conversation {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    devices: Arc<dyn DeviceFactory>,
    connector: Arc<dyn Connector>,
    state: watch::Sender<ConnectionState>,
    messages: watch::Sender<Vec<ChatMessage>>,
    volume: watch::Sender<f32>,
    call: Mutex<Option<ActiveCall>>,
    last_stats: StdMutex<Option<CallStats>>,
}

/// Everything one call owns
struct ActiveCall {
    id: Uuid,
    capture: AudioCapture,
    playback: PlaybackScheduler,
    session: Option<Box<dyn Session>>,
    turns: TurnAssembler,
    stats: CallStats,
    frames: Arc<FrameCounters>,
    tasks: Vec<JoinHandle<()>>,
}

/// Outgoing frame counters, bumped from the capture task
#[derive(Debug, Default)]
struct FrameCounters {
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl ActiveCall {
    fn snapshot(&self) -> CallStats {
        let mut stats = self.stats.clone();
        stats.frames_sent = self.frames.sent.load(Ordering::SeqCst);
        stats.frames_dropped = self.frames.dropped.load(Ordering::SeqCst);
        stats
    }

    /// Release devices and the session. Background tasks are left to `abort_tasks`.
    async fn release(&mut self) {
        self.capture.stop().await;
        self.playback.stop().await;

        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!("Error closing agent session {}: {}", session.id(), e);
            }
        }
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for ActiveCall {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

impl Conversation {
    pub fn new(
        config: Config,
        devices: Arc<dyn DeviceFactory>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (messages, _) = watch::channel(Vec::new());
        let (volume, _) = watch::channel(0.0);

        Self {
            inner: Arc::new(Inner {
                config,
                devices,
                connector,
                state,
                messages,
                volume,
                call: Mutex::new(None),
                last_stats: StdMutex::new(None),
            }),
        }
    }

    /// Conversation over the system's audio devices and the WebSocket agent endpoint
    pub fn with_defaults(config: Config) -> Self {
        Self::new(config, Arc::new(CpalDeviceFactory), Arc::new(LiveClient::new()))
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Completed transcript, in insertion order
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.inner.messages.borrow().clone()
    }

    pub fn subscribe_messages(&self) -> watch::Receiver<Vec<ChatMessage>> {
        self.inner.messages.subscribe()
    }

    pub fn clear_messages(&self) {
        self.inner.messages.send_replace(Vec::new());
    }

    /// Visualizer level in [0, 1]
    pub fn volume(&self) -> f32 {
        *self.inner.volume.borrow()
    }

    pub fn subscribe_volume(&self) -> watch::Receiver<f32> {
        self.inner.volume.subscribe()
    }

    /// Counters for the current call, or the last one if none is active
    pub async fn stats(&self) -> Option<CallStats> {
        if let Some(call) = self.inner.call.lock().await.as_ref() {
            return Some(call.snapshot());
        }
        self.inner
            .last_stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start a call
    ///
    /// Acquires the microphone and speaker, then opens the agent session.
    /// Failures leave the state at ERROR with every acquired resource released.
    /// A no-op while a call is already connecting or connected.
    pub async fn connect(&self) -> Result<(), LiveError> {
        let inner = &self.inner;
        let mut slot = inner.call.lock().await;

        if slot.is_some() || inner.current_state().is_active() {
            debug!("connect() ignored: call already {}", inner.current_state());
            return Ok(());
        }

        if !inner.transition(ConnectionState::Connecting) {
            return Ok(());
        }

        if inner.config.history == HistoryPolicy::ClearOnConnect {
            inner.messages.send_replace(Vec::new());
        }

        let call_id = Uuid::new_v4();
        info!("Starting call {}", call_id);

        let audio_config = &inner.config.audio;
        let sender_slot: Arc<OnceLock<AudioSender>> = Arc::new(OnceLock::new());
        let frames = Arc::new(FrameCounters::default());

        // Microphone first, then speaker
        let mut capture = AudioCapture::new(inner.devices.input(audio_config), audio_config.capture());
        let on_frame = {
            let weak = Arc::downgrade(&self.inner);
            let sender_slot = Arc::clone(&sender_slot);
            let frames = Arc::clone(&frames);
            let input_gain = audio_config.input_gain;

            move |frame: AudioFrame, loudness: f32| {
                if let Some(inner) = weak.upgrade() {
                    inner.volume.send_replace((loudness * input_gain).min(1.0));
                }
                if let Some(sender) = sender_slot.get() {
                    let counter = if sender.send_audio(frame) {
                        &frames.sent
                    } else {
                        &frames.dropped
                    };
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }
        };

        if let Err(e) = capture.start(on_frame).await {
            error!("Microphone unavailable: {}", e);
            capture.stop().await;
            inner.transition(ConnectionState::Error);
            return Err(e.into());
        }

        let playback = match PlaybackScheduler::start(inner.devices.output(audio_config)).await {
            Ok(playback) => playback,
            Err(e) => {
                error!("Speaker unavailable: {}", e);
                capture.stop().await;
                inner.transition(ConnectionState::Error);
                return Err(e.into());
            }
        };

        let meter = playback.meter();

        *slot = Some(ActiveCall {
            id: call_id,
            capture,
            playback,
            session: None,
            turns: TurnAssembler::new(),
            stats: CallStats::new(call_id),
            frames,
            tasks: Vec::new(),
        });

        // disconnect() may run while the handshake is in flight
        drop(slot);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session_config = inner.config.agent.session_config();
        let opened = inner.connector.open(&session_config, events_tx).await;

        let mut slot = inner.call.lock().await;
        let still_ours = slot.as_ref().map(|call| call.id) == Some(call_id);

        match opened {
            Ok(mut session) => {
                let Some(call) = slot.as_mut().filter(|_| still_ours) else {
                    info!("Call {} ended while connecting; closing agent session", call_id);
                    drop(slot);
                    if let Err(e) = session.close().await {
                        warn!("Error closing agent session {}: {}", session.id(), e);
                    }
                    return Ok(());
                };

                info!("Agent session {} requested for call {}", session.id(), call_id);

                // Set once per call, before any frame can pass the gate
                let _ = sender_slot.set(session.audio_sender());
                call.session = Some(session);

                let weak = Arc::downgrade(&self.inner);
                call.tasks.push(tokio::spawn(run_events(weak.clone(), call_id, events_rx)));
                call.tasks.push(tokio::spawn(run_volume_ticks(
                    weak,
                    meter,
                    Duration::from_millis(audio_config.volume_tick_ms.max(1)),
                )));
                Ok(())
            }
            Err(e) => {
                if still_ours {
                    error!("Failed to open agent session: {}", e);
                    if let Some(call) = slot.take() {
                        inner.teardown(call, ConnectionState::Error).await;
                    }
                } else {
                    debug!("Agent session failed after call {} ended: {}", call_id, e);
                }
                Err(e.into())
            }
        }
    }

    /// End the call and release everything it holds
    ///
    /// Safe from any state; a no-op when already DISCONNECTED.
    pub async fn disconnect(&self) {
        let mut slot = self.inner.call.lock().await;

        match slot.take() {
            Some(call) => {
                self.inner
                    .teardown(call, ConnectionState::Disconnected)
                    .await
            }
            None => {
                if self.inner.current_state() != ConnectionState::Disconnected {
                    self.inner.transition(ConnectionState::Disconnected);
                }
            }
        }
    }
}

impl Inner {
    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Move to `next` if the state graph allows it
    fn transition(&self, next: ConnectionState) -> bool {
        let mut from = None;
        self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                from = Some(*state);
                *state = next;
                true
            } else {
                false
            }
        });

        match from {
            Some(from) => {
                info!("Connection state: {} -> {}", from, next);
                true
            }
            None => {
                warn!(
                    "Ignoring transition {} -> {}",
                    self.current_state(),
                    next
                );
                false
            }
        }
    }

    /// Release a call taken out of the slot; callers hold the call lock throughout
    async fn teardown(&self, mut call: ActiveCall, target: ConnectionState) {
        info!("Tearing down call {}", call.id);

        call.release().await;

        *self
            .last_stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(call.snapshot());

        self.volume.send_replace(0.0);
        self.transition(target);

        // May include the task running this teardown, so nothing awaits after it
        call.abort_tasks();
    }

    /// Apply one transport event; false once the call is over
    async fn dispatch(&self, call_id: Uuid, event: TransportEvent) -> bool {
        let mut slot = self.call.lock().await;
        let Some(call) = slot.as_mut().filter(|call| call.id == call_id) else {
            return false;
        };

        match event {
            TransportEvent::Opened => {
                if self.transition(ConnectionState::Connected) {
                    call.playback.reanchor();
                    call.capture.gate().open();
                }
            }
            TransportEvent::AudioChunk { pcm, sample_rate } => {
                let rate = sample_rate.unwrap_or(self.config.audio.output_sample_rate);
                match codec::decode_to_playback_buffer(&pcm, rate, 1, call.playback.format()) {
                    Ok(buffer) => {
                        call.playback.enqueue(buffer);
                        call.stats.chunks_played += 1;
                    }
                    Err(e) => {
                        warn!("Dropping agent audio chunk: {}", e);
                        call.stats.chunks_dropped += 1;
                    }
                }
            }
            TransportEvent::InputTranscript(text) => call.turns.push_input(&text),
            TransportEvent::OutputTranscript(text) => call.turns.push_output(&text),
            TransportEvent::TurnComplete => {
                let completed = call.turns.complete_turn();
                call.stats.turns += 1;
                debug!("Turn complete with {} messages", completed.len());
                if !completed.is_empty() {
                    self.messages.send_modify(|messages| messages.extend(completed));
                }
            }
            TransportEvent::Interrupted => {
                call.playback.interrupt();
                call.turns.interrupt();
                call.stats.interruptions += 1;
            }
            TransportEvent::Error(cause) => {
                error!("Agent session error: {}", cause);
                if let Some(call) = slot.take() {
                    self.teardown(call, ConnectionState::Error).await;
                }
                return false;
            }
            TransportEvent::Closed => {
                let target = if self.current_state() == ConnectionState::Connected {
                    ConnectionState::Disconnected
                } else {
                    // Closed before the handshake finished
                    ConnectionState::Error
                };
                info!("Agent session closed");
                if let Some(call) = slot.take() {
                    self.teardown(call, target).await;
                }
                return false;
            }
        }

        true
    }
}

/// Single consumer of the call's event channel
async fn run_events(inner: Weak<Inner>, call_id: Uuid, mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.dispatch(call_id, event).await {
            return;
        }
    }

    debug!("Event channel for call {} closed", call_id);
}

/// Periodic output-loudness sampling for the visualizer
async fn run_volume_ticks(inner: Weak<Inner>, meter: LoudnessMeter, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        let Some(inner) = inner.upgrade() else {
            break;
        };
        if inner.current_state() != ConnectionState::Connected {
            continue;
        }

        let level = meter.level();
        inner.volume.send_if_modified(|volume| {
            if level > *volume {
                *volume = level;
                true
            } else {
                false
            }
        });
    }
}
