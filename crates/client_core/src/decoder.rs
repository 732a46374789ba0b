//! Event decoder: turns raw backend stream events into typed token deltas.

use shared::{
    domain::Role,
    error::{EngineError, ErrorCode},
    protocol::StreamEvent,
};
use thiserror::Error;

/// One incremental fragment of a turn plus its completion flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDelta {
    pub role: Role,
    pub content_fragment: String,
    pub done: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("stream event from model '{model}' carries unrecognized role '{role}'")]
    UnrecognizedRole { model: String, role: String },
}

impl DecodeError {
    pub fn to_engine_error(&self) -> EngineError {
        EngineError::new(ErrorCode::Decode, self.to_string())
    }
}

/// Decodes a raw event. Only the role is validated; an empty fragment is a
/// valid delta that merely flips `done`.
pub fn decode(event: StreamEvent) -> Result<TokenDelta, DecodeError> {
    let StreamEvent {
        model,
        message,
        created_at,
        done,
    } = event;

    let role = message
        .role
        .parse::<Role>()
        .map_err(|err| DecodeError::UnrecognizedRole {
            model,
            role: err.0,
        })?;

    Ok(TokenDelta {
        role,
        content_fragment: message.content,
        done,
        created_at,
    })
}

impl TryFrom<StreamEvent> for TokenDelta {
    type Error = DecodeError;

    fn try_from(event: StreamEvent) -> Result<Self, Self::Error> {
        decode(event)
    }
}

#[cfg(test)]
#[path = "tests/decoder_tests.rs"]
mod tests;
