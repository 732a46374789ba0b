//! Request and response bodies of the Ollama HTTP API.

use serde::{Deserialize, Serialize};
use shared::{
    domain::Role,
    protocol::{ContextMessage, SendPromptCommand, StreamEvent, StreamMessage},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: GenerationOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl ChatRequest {
    /// System turns are local UI text and never reach the model.
    pub fn from_command(command: &SendPromptCommand) -> Self {
        let messages = command
            .context
            .iter()
            .filter_map(ChatMessage::from_context)
            .collect();
        Self {
            model: command.config.language_model.clone(),
            messages,
            stream: true,
            options: GenerationOptions {
                temperature: command.config.temperature,
                top_p: command.config.top_p,
                top_k: command.config.top_k.max(0.0).round() as u32,
            },
        }
    }
}

impl ChatMessage {
    fn from_context(message: &ContextMessage) -> Option<Self> {
        match message.role {
            Role::User | Role::Assistant => Some(Self {
                role: message.role,
                content: message.content.clone(),
                images: message.image.iter().cloned().collect(),
            }),
            Role::System => None,
        }
    }
}

/// One NDJSON line of a streaming `/api/chat` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub message: Option<ChunkMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChunkMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatChunk {
    /// Chunks without a message body carry no token, except the terminal one,
    /// which still has to close the open turn.
    pub fn into_stream_event(self) -> Option<StreamEvent> {
        let message = match self.message {
            Some(message) => message,
            None if self.done => ChunkMessage {
                role: Role::Assistant.as_str().to_string(),
                content: String::new(),
            },
            None => return None,
        };
        Some(StreamEvent {
            model: self.model,
            message: StreamMessage {
                role: message.role,
                content: message.content,
            },
            created_at: self.created_at,
            done: self.done,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[cfg(test)]
#[path = "tests/wire_tests.rs"]
mod tests;
