use serde::{Deserialize, Serialize};

use crate::domain::{GenerationId, ModelSummary, Role, SamplingConfig};

/// Name of the outbound generation command.
pub const SEND_PROMPT_COMMAND: &str = "send_prompt";

/// Message body of a raw stream event. `role` stays a string here; the
/// engine's decoder decides whether it is acceptable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMessage {
    pub role: String,
    pub content: String,
}

/// One partial-token event as pushed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub model: String,
    pub message: StreamMessage,
    pub created_at: String,
    pub done: bool,
}

/// A stream event tagged with the generation that produced it. Events from
/// backends that cannot correlate carry no id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_id: Option<GenerationId>,
    #[serde(flatten)]
    pub event: StreamEvent,
}

impl StreamEnvelope {
    pub fn tagged(generation_id: GenerationId, event: StreamEvent) -> Self {
        Self {
            generation_id: Some(generation_id),
            event,
        }
    }

    pub fn untagged(event: StreamEvent) -> Self {
        Self {
            generation_id: None,
            event,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    pub language_model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: f32,
}

impl PromptConfig {
    pub fn new(language_model: impl Into<String>, sampling: SamplingConfig) -> Self {
        Self {
            language_model: language_model.into(),
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            top_k: sampling.top_k,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
    pub done: bool,
    /// Base64 encoded image, already in the form the backend consumes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Arguments of the `send_prompt` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendPromptCommand {
    pub generation_id: GenerationId,
    pub config: PromptConfig,
    pub context: Vec<ContextMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelListResponse {
    pub models: Vec<ModelSummary>,
}
