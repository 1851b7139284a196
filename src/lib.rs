pub mod audio;
pub mod config;
pub mod error;
pub mod session;
pub mod transport;

pub use audio::{
    AudioCapture, AudioFrame, AudioInput, AudioOutput, CaptureConfig, CpalDeviceFactory,
    DeviceFactory, FrameGate, OutputFormat, PlaybackBuffer, PlaybackScheduler, SharedTimeline,
};
pub use config::{AgentConfig, AudioConfig, Config, HistoryPolicy};
pub use error::{AudioError, CodecError, LiveError, TransportError};
pub use session::{
    CallStats, ChatMessage, ConnectionState, Conversation, Role, SessionConfig, TurnAssembler,
};
pub use transport::{AudioSender, Connector, LiveClient, Session, TransportEvent};
