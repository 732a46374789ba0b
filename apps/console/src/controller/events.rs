//! Notice modeling for the console: categories and transport failure hints.

use shared::error::{EngineError, ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeCategory {
    Input,
    Transport,
    Decode,
    Internal,
}

impl NoticeCategory {
    pub fn label(self) -> &'static str {
        match self {
            NoticeCategory::Input => "input",
            NoticeCategory::Transport => "transport",
            NoticeCategory::Decode => "decode",
            NoticeCategory::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    Unreachable,
    ModelMissing,
    Other,
}

pub fn classify_transport_failure(message: &str) -> TransportFailure {
    let lower = message.to_ascii_lowercase();
    if lower.contains("unreachable")
        || lower.contains("connection refused")
        || lower.contains("error sending request")
        || lower.contains("dns")
        || lower.contains("timed out")
    {
        TransportFailure::Unreachable
    } else if lower.contains("404")
        || (lower.contains("model") && lower.contains("not found"))
        || lower.contains("try pulling")
    {
        TransportFailure::ModelMissing
    } else {
        TransportFailure::Other
    }
}

impl TransportFailure {
    pub fn hint(self) -> Option<&'static str> {
        match self {
            TransportFailure::Unreachable => {
                Some("Ollama is not reachable; start it with `ollama serve` or check the URL.")
            }
            TransportFailure::ModelMissing => {
                Some("The model is not installed; pull it with `ollama pull <model>` or pick one from /models.")
            }
            TransportFailure::Other => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleNotice {
    category: NoticeCategory,
    message: String,
    hint: Option<&'static str>,
}

impl ConsoleNotice {
    pub fn from_engine_error(error: &EngineError) -> Self {
        let category = match error.code {
            ErrorCode::Validation => NoticeCategory::Input,
            ErrorCode::Transport => NoticeCategory::Transport,
            ErrorCode::Decode => NoticeCategory::Decode,
            ErrorCode::Internal => NoticeCategory::Internal,
        };
        let hint = match category {
            NoticeCategory::Transport => classify_transport_failure(&error.message).hint(),
            _ => None,
        };
        Self {
            category,
            message: error.message.clone(),
            hint,
        }
    }

    /// For failures outside the prompt path, such as model listing.
    pub fn transport(message: impl Into<String>) -> Self {
        let message = message.into();
        let hint = classify_transport_failure(&message).hint();
        Self {
            category: NoticeCategory::Transport,
            message,
            hint,
        }
    }

    pub fn category(&self) -> NoticeCategory {
        self.category
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn hint(&self) -> Option<&'static str> {
        self.hint
    }
}

#[cfg(test)]
#[path = "../tests/events_tests.rs"]
mod tests;
