//! Live call management
//!
//! This module provides the `Conversation` state machine that manages:
//! - Microphone and speaker acquisition and release
//! - The agent session and its event stream
//! - Gapless playback of agent audio and barge-in handling
//! - Turn-by-turn transcript assembly
//! - Connection state, volume and call statistics

pub mod config;
mod conversation;
mod state;
mod stats;
mod turns;

pub use config::SessionConfig;
pub use conversation::Conversation;
pub use state::ConnectionState;
pub use stats::CallStats;
pub use turns::{ChatMessage, Role, TurnAssembler};
