//! Error types for live-voice
//!
//! Device and transport errors end the current call and surface as a
//! connection state change. Codec errors only ever cost a single chunk.

use thiserror::Error;

/// Top-level error type for a live conversation
#[derive(Error, Debug)]
pub enum LiveError {
    #[error("Audio device error: {0}")]
    Audio(#[from] AudioError),

    #[error("Audio codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors related to the microphone and speaker
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Audio stream error: {0}")]
    StreamError(String),

    #[error("Audio device did not respond within {0} seconds")]
    Timeout(u32),
}

/// Errors related to PCM conversion of a single chunk
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed audio data: {0} bytes is not a whole number of 16-bit samples")]
    MalformedAudioData(usize),

    #[error("Cannot decode audio for playback: {0}")]
    AudioDecodeError(String),
}

/// Errors related to the channel to the remote agent
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to connect to agent: {0}")]
    ConnectFailed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Session is closed")]
    Closed,

    #[error("Failed to send to agent: {0}")]
    Send(String),
}

/// Result type alias using LiveError
pub type Result<T> = std::result::Result<T, LiveError>;
