pub mod client;
pub mod event;
pub mod messages;

pub use client::{LiveClient, LiveSession};
pub use event::{AudioSender, AUDIO_QUEUE_FRAMES, Connector, EventReceiver, EventSender, Session, TransportEvent};
pub use messages::{ClientMessage, ServerMessage};
