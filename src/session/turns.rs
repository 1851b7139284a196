use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who said it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// A finished utterance in the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub is_complete: bool,
}

impl ChatMessage {
    fn completed(role: Role, text: String) -> Self {
        let suffix = match role {
            Role::User => "user",
            Role::Agent => "agent",
        };
        Self {
            id: format!("{}-{}", Uuid::new_v4(), suffix),
            role,
            text,
            timestamp: Utc::now(),
            is_complete: true,
        }
    }
}

/// Accumulates transcript fragments until the agent closes the turn
#[derive(Debug, Default)]
pub struct TurnAssembler {
    input: String,
    output: String,
}

impl TurnAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_input(&mut self, fragment: &str) {
        self.input.push_str(fragment);
    }

    pub fn push_output(&mut self, fragment: &str) {
        self.output.push_str(fragment);
    }

    /// Text heard from the user so far this turn
    pub fn pending_input(&self) -> &str {
        &self.input
    }

    /// Text spoken by the agent so far this turn
    pub fn pending_output(&self) -> &str {
        &self.output
    }

    /// Close the turn: user message first, then agent, skipping empty buffers
    pub fn complete_turn(&mut self) -> Vec<ChatMessage> {
        let input = std::mem::take(&mut self.input);
        let output = std::mem::take(&mut self.output);

        let mut messages = Vec::with_capacity(2);
        if !input.is_empty() {
            messages.push(ChatMessage::completed(Role::User, input));
        }
        if !output.is_empty() {
            messages.push(ChatMessage::completed(Role::Agent, output));
        }
        messages
    }

    /// Barge-in: the agent's partial utterance is discarded, the user's kept
    pub fn interrupt(&mut self) {
        self.output.clear();
    }

    pub fn reset(&mut self) {
        self.input.clear();
        self.output.clear();
    }
}
