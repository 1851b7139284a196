use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::event::TransportEvent;
use crate::session::SessionConfig;

/// Message sent to the agent endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
}

impl ClientMessage {
    /// Session setup: model, persona, voice and transcription requests
    pub fn setup(config: &SessionConfig) -> Self {
        let model = if config.model.starts_with("models/") {
            config.model.clone()
        } else {
            format!("models/{}", config.model)
        };

        ClientMessage::Setup(Setup {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: config.voice.clone(),
                        },
                    },
                },
            },
            system_instruction: (!config.instruction.is_empty()).then(|| Content {
                parts: vec![TextPart {
                    text: config.instruction.clone(),
                }],
            }),
            input_audio_transcription: config.input_transcription.then_some(TranscriptionConfig {}),
            output_audio_transcription: config
                .output_transcription
                .then_some(TranscriptionConfig {}),
        })
    }

    /// One captured frame of 16-bit PCM
    pub fn audio(pcm: &[u8], sample_rate: u32) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![Blob {
                mime_type: format!("audio/pcm;rate={}", sample_rate),
                data: base64::engine::general_purpose::STANDARD.encode(pcm),
            }],
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<TranscriptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<TranscriptionConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
pub struct TextPart {
    pub text: String,
}

/// Empty object: asks the server to transcribe that direction
#[derive(Debug, Serialize)]
pub struct TranscriptionConfig {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<Blob>,
}

/// Base64 payload with its MIME type
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    #[serde(default)]
    pub mime_type: String,
    pub data: String,
}

impl Blob {
    /// Sample rate from a `audio/pcm;rate=NNNN` MIME type
    pub fn sample_rate(&self) -> Option<u32> {
        self.mime_type
            .split(';')
            .filter_map(|param| param.trim().strip_prefix("rate="))
            .find_map(|rate| rate.parse().ok())
    }
}

/// Message received from the agent endpoint
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<ServerPart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPart {
    #[serde(default)]
    pub inline_data: Option<Blob>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

impl ServerMessage {
    /// Flatten into tagged events
    ///
    /// Order within one message: open, transcripts, turn complete, audio,
    /// interrupted. Audio whose base64 payload does not decode is dropped.
    pub fn into_events(self) -> Vec<TransportEvent> {
        let mut events = Vec::new();

        if self.setup_complete.is_some() {
            events.push(TransportEvent::Opened);
        }

        if let Some(go_away) = &self.go_away {
            warn!(
                "Agent is going away (time left: {})",
                go_away.time_left.as_deref().unwrap_or("unknown")
            );
        }

        let Some(content) = self.server_content else {
            return events;
        };

        if let Some(text) = content.input_transcription.and_then(|t| t.text) {
            if !text.is_empty() {
                events.push(TransportEvent::InputTranscript(text));
            }
        }
        if let Some(text) = content.output_transcription.and_then(|t| t.text) {
            if !text.is_empty() {
                events.push(TransportEvent::OutputTranscript(text));
            }
        }

        if content.turn_complete {
            events.push(TransportEvent::TurnComplete);
        }

        for blob in content
            .model_turn
            .into_iter()
            .flat_map(|turn| turn.parts)
            .filter_map(|part| part.inline_data)
        {
            match base64::engine::general_purpose::STANDARD.decode(&blob.data) {
                Ok(pcm) => events.push(TransportEvent::AudioChunk {
                    sample_rate: blob.sample_rate(),
                    pcm,
                }),
                Err(e) => warn!("Dropping audio chunk with invalid base64: {}", e),
            }
        }

        if content.interrupted {
            events.push(TransportEvent::Interrupted);
        }

        events
    }
}
