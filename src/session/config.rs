use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters for opening a session with the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "call-5f0c...")
    pub session_id: String,

    /// WebSocket endpoint of the agent
    pub endpoint: String,

    /// API key appended to the endpoint as `?key=`, if any
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Model identifier, with or without the `models/` prefix
    pub model: String,

    /// Persona instruction for the agent
    pub instruction: String,

    /// Prebuilt output voice
    pub voice: String,

    /// Ask the server to transcribe the user's speech
    pub input_transcription: bool,

    /// Ask the server to transcribe the agent's speech
    pub output_transcription: bool,

    /// Upper bound on the connect handshake
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("call-{}", uuid::Uuid::new_v4()),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            instruction: DEFAULT_INSTRUCTION.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            input_transcription: true,
            output_transcription: true,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

pub const DEFAULT_VOICE: &str = "Zephyr";

pub const DEFAULT_INSTRUCTION: &str = "You are \"TechFlow Support\", a professional, empathetic, and efficient technical support agent for a SaaS platform. \
Your goal is to help the user with their technical issues regarding the TechFlow dashboard, billing, or API integrations. \
Keep your responses concise and conversational, suitable for a voice call. \
If you don't know the answer, politely offer to escalate the ticket. \
Start by introducing yourself briefly.";
