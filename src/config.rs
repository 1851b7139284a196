use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::audio::CaptureConfig;
use crate::session::config::{DEFAULT_ENDPOINT, DEFAULT_INSTRUCTION, DEFAULT_MODEL, DEFAULT_VOICE};
use crate::session::SessionConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub audio: AudioConfig,
    pub history: HistoryPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub endpoint: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub model: String,
    pub voice: String,
    pub instruction: String,
    pub input_transcription: bool,
    pub output_transcription: bool,
    pub connect_timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            instruction: DEFAULT_INSTRUCTION.to_string(),
            input_transcription: true,
            output_transcription: true,
            connect_timeout_ms: 10_000,
        }
    }
}

impl AgentConfig {
    /// Session parameters for a new call, with the API key read from the environment
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            endpoint: self.endpoint.clone(),
            api_key: std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty()),
            model: self.model.clone(),
            instruction: self.instruction.clone(),
            voice: self.voice.clone(),
            input_transcription: self.input_transcription,
            output_transcription: self.output_transcription,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            ..SessionConfig::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name, or "default"
    pub input_device: String,
    /// Output device name, or "default"
    pub output_device: String,
    /// Capture rate sent to the agent
    pub input_sample_rate: u32,
    /// Rate of the agent's audio when the payload doesn't say
    pub output_sample_rate: u32,
    /// Samples per captured frame
    pub frame_size: usize,
    /// Visual boost applied to input RMS
    pub input_gain: f32,
    /// Playback gain
    pub output_gain: f32,
    /// Visualizer sampling period
    pub volume_tick_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: "default".to_string(),
            output_device: "default".to_string(),
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            frame_size: 4096,
            input_gain: 5.0,
            output_gain: 1.0,
            volume_tick_ms: 50,
        }
    }
}

impl AudioConfig {
    pub fn capture(&self) -> CaptureConfig {
        CaptureConfig {
            frame_size: self.frame_size,
            sample_rate: self.input_sample_rate,
        }
    }
}

/// What happens to the transcript when a new call starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryPolicy {
    /// Keep accumulating across calls
    #[default]
    Retain,
    /// Start every call with an empty transcript
    ClearOnConnect,
}

impl Config {
    /// Load from a config file (any format the `config` crate knows) plus
    /// `LIVE_VOICE_*` environment overrides, e.g. `LIVE_VOICE_AGENT__VOICE=Puck`
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("LIVE_VOICE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
