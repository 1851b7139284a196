use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::audio::AudioFrame;
use crate::error::TransportError;
use crate::session::SessionConfig;

/// Tagged event from the agent, delivered in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake finished; audio may flow
    Opened,
    /// Agent speech, 16-bit PCM (rate from the payload's MIME type, if given)
    AudioChunk {
        pcm: Vec<u8>,
        sample_rate: Option<u32>,
    },
    /// Partial transcript of what the user said
    InputTranscript(String),
    /// Partial transcript of what the agent said
    OutputTranscript(String),
    /// The current turn is over
    TurnComplete,
    /// The user barged in; stop playback now
    Interrupted,
    /// Transport failure
    Error(String),
    /// The channel closed
    Closed,
}

/// Sending half of the event channel handed to a transport
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiving half drained by the connection state machine
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Frames queued for the writer before new ones are dropped (about 8s at 16kHz)
pub const AUDIO_QUEUE_FRAMES: usize = 32;

/// Non-blocking handle for pushing captured frames at a session
///
/// Frames are dropped while the session is not open, and when the writer
/// has fallen `capacity` frames behind.
#[derive(Debug, Clone)]
pub struct AudioSender {
    tx: mpsc::Sender<AudioFrame>,
    open: Arc<AtomicBool>,
}

impl AudioSender {
    /// Create a sender and the queue the transport writer drains
    pub fn channel() -> (Self, mpsc::Receiver<AudioFrame>) {
        Self::with_capacity(AUDIO_QUEUE_FRAMES)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<AudioFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sender = Self {
            tx,
            open: Arc::new(AtomicBool::new(false)),
        };
        (sender, rx)
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Queue a frame without waiting; returns false if it was dropped
    pub fn send_audio(&self, frame: AudioFrame) -> bool {
        if !self.is_open() {
            trace!("Session not open, dropping frame {}", frame.sequence);
            return false;
        }

        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(frame)) => {
                debug!("Audio queue full, dropping frame {}", frame.sequence);
                false
            }
            Err(mpsc::error::TrySendError::Closed(frame)) => {
                trace!("Writer gone, dropping frame {}", frame.sequence);
                false
            }
        }
    }
}

/// An open channel to the agent
#[async_trait::async_trait]
pub trait Session: Send {
    fn id(&self) -> Uuid;

    fn audio_sender(&self) -> AudioSender;

    /// Request a graceful shutdown (best effort)
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens sessions with the agent
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Start opening a session
    ///
    /// Returning `Ok` means the request is under way; the session is usable
    /// once `TransportEvent::Opened` arrives on `events`.
    async fn open(
        &self,
        config: &SessionConfig,
        events: EventSender,
    ) -> Result<Box<dyn Session>, TransportError>;
}
