use anyhow::Result;
use async_trait::async_trait;
use client_core::GenerationBackend;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use shared::{
    domain::{GenerationId, ModelSummary},
    protocol::{ModelListResponse, SendPromptCommand, StreamEnvelope},
};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub mod config;
pub mod ndjson;
pub mod wire;

pub use config::{OllamaConfig, DEFAULT_OLLAMA_URL, OLLAMA_HOST_ENV};

use ndjson::LineBuffer;
use wire::{ChatChunk, ChatRequest, ErrorBody};

const STREAM_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("invalid ollama url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("ollama is unreachable at {base_url}: {reason}")]
    Unreachable { base_url: String, reason: String },
    #[error("ollama responded with {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("ollama response body failed: {0}")]
    Body(String),
    #[error("malformed ollama stream line: {0}")]
    MalformedLine(String),
    #[error("ollama reported an error: {0}")]
    Generation(String),
}

/// [`GenerationBackend`] backed by a local Ollama server. Every chunk of a
/// streamed chat answer is republished on a broadcast channel, tagged with the
/// generation that asked for it.
pub struct OllamaBackend {
    http: Client,
    config: OllamaConfig,
    stream: broadcast::Sender<StreamEnvelope>,
}

impl OllamaBackend {
    pub fn new(config: OllamaConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(http: Client, config: OllamaConfig) -> Self {
        let (stream, _) = broadcast::channel(STREAM_CAPACITY);
        Self {
            http,
            config,
            stream,
        }
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn unreachable(&self, err: reqwest::Error) -> OllamaError {
        OllamaError::Unreachable {
            base_url: self.config.base_url().to_string(),
            reason: err.to_string(),
        }
    }

    /// Publishes the chunk's token, if any, and reports whether the answer is complete.
    fn publish_line(&self, generation_id: GenerationId, line: &[u8]) -> Result<bool, OllamaError> {
        let chunk: ChatChunk = serde_json::from_slice(line)
            .map_err(|err| OllamaError::MalformedLine(err.to_string()))?;
        if let Some(err) = chunk.error {
            return Err(OllamaError::Generation(err));
        }

        let done = chunk.done;
        if let Some(event) = chunk.into_stream_event() {
            let _ = self.stream.send(StreamEnvelope::tagged(generation_id, event));
        }
        Ok(done)
    }
}

async fn check_status(response: Response) -> Result<Response, OllamaError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(body) => body.error,
        Err(_) if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
        Err(_) => body.trim().to_string(),
    };
    Err(OllamaError::Status { status, message })
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    async fn send_prompt(&self, command: SendPromptCommand) -> Result<()> {
        let generation_id = command.generation_id;
        let url = self.config.endpoint("api/chat")?;
        let request = ChatRequest::from_command(&command);
        info!(
            %generation_id,
            model = %request.model,
            messages = request.messages.len(),
            "sending chat request to ollama"
        );

        let response = self
            .http
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|err| self.unreachable(err))?;
        let response = check_status(response).await?;

        let mut body = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut chunks = 0usize;
        while let Some(bytes) = body.next().await {
            let bytes = bytes.map_err(|err| OllamaError::Body(err.to_string()))?;
            lines.extend(&bytes);
            while let Some(line) = lines.next_line() {
                chunks += 1;
                if self.publish_line(generation_id, &line)? {
                    debug!(%generation_id, chunks, "ollama answer complete");
                    return Ok(());
                }
            }
        }

        if let Some(line) = lines.finish() {
            chunks += 1;
            if self.publish_line(generation_id, &line)? {
                debug!(%generation_id, chunks, "ollama answer complete");
                return Ok(());
            }
        }
        warn!(%generation_id, chunks, "ollama stream ended without a final chunk");
        Ok(())
    }

    async fn list_models(&self) -> Result<Vec<ModelSummary>> {
        let url = self.config.endpoint("api/tags")?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| self.unreachable(err))?;
        let listing: ModelListResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|err| OllamaError::Body(err.to_string()))?;
        debug!(count = listing.models.len(), "ollama model listing");
        Ok(listing.models)
    }

    fn subscribe_stream(&self) -> broadcast::Receiver<StreamEnvelope> {
        self.stream.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
