use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{ModelSummary, Role, SamplingConfig},
    error::EngineError,
    protocol::{SendPromptCommand, StreamEnvelope},
};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

pub mod aggregator;
pub mod decoder;
pub mod dispatch;
pub mod session;
pub mod subscription;

pub use aggregator::{AppliedDelta, DeltaTarget};
pub use decoder::{decode, DecodeError, TokenDelta};
pub use dispatch::{
    DispatchHandle, DispatchOutcome, PromptDispatcher, PromptSubmission, SubmitError,
};
pub use session::{
    Attachment, Session, SessionError, SessionHandle, SessionView, Turn, DEFAULT_GREETING,
};
pub use subscription::StreamSubscription;

const CLIENT_EVENT_CAPACITY: usize = 1024;

/// Command sink and event source of the inference backend.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Resolves once the transport settles; the answer itself arrives on the
    /// stream returned by [`GenerationBackend::subscribe_stream`].
    async fn send_prompt(&self, command: SendPromptCommand) -> Result<()>;
    async fn list_models(&self) -> Result<Vec<ModelSummary>>;
    fn subscribe_stream(&self) -> broadcast::Receiver<StreamEnvelope>;
}

pub struct MissingGenerationBackend {
    stream: broadcast::Sender<StreamEnvelope>,
}

impl Default for MissingGenerationBackend {
    fn default() -> Self {
        let (stream, _) = broadcast::channel(1);
        Self { stream }
    }
}

#[async_trait]
impl GenerationBackend for MissingGenerationBackend {
    async fn send_prompt(&self, command: SendPromptCommand) -> Result<()> {
        Err(anyhow!(
            "generation backend is unavailable for model '{}'",
            command.config.language_model
        ))
    }

    async fn list_models(&self) -> Result<Vec<ModelSummary>> {
        Err(anyhow!("generation backend is unavailable"))
    }

    fn subscribe_stream(&self) -> broadcast::Receiver<StreamEnvelope> {
        self.stream.subscribe()
    }
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    TurnAppended {
        index: usize,
        turn: Turn,
    },
    DeltaApplied {
        index: usize,
        role: Role,
        fragment: String,
        opened: bool,
        closed: bool,
    },
    BusyChanged(bool),
    Notice(EngineError),
}

/// Model and sampling parameters used for the next submission.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelSelection {
    pub selected_model: String,
    pub sampling: SamplingConfig,
}

pub struct ChatClient {
    session: SessionHandle,
    backend: Arc<dyn GenerationBackend>,
    dispatcher: PromptDispatcher,
    selection: RwLock<ModelSelection>,
    events: broadcast::Sender<ClientEvent>,
}

impl ChatClient {
    pub fn new(backend: Arc<dyn GenerationBackend>, greeting: impl Into<String>) -> Arc<Self> {
        Self::with_session(backend, Session::seeded(greeting))
    }

    pub fn with_session(backend: Arc<dyn GenerationBackend>, session: Session) -> Arc<Self> {
        let (events, _) = broadcast::channel(CLIENT_EVENT_CAPACITY);
        let session = SessionHandle::new(session);
        let dispatcher =
            PromptDispatcher::new(session.clone(), Arc::clone(&backend), events.clone());
        Arc::new(Self {
            session,
            backend,
            dispatcher,
            selection: RwLock::new(ModelSelection::default()),
            events,
        })
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub async fn snapshot(&self) -> SessionView {
        self.session.snapshot().await
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Starts feeding backend stream events into the session. Dropping the
    /// returned subscription unsubscribes.
    pub fn attach(self: &Arc<Self>) -> StreamSubscription {
        StreamSubscription::spawn(Arc::clone(self), self.backend.subscribe_stream())
    }

    pub async fn list_models(&self) -> Result<Vec<ModelSummary>> {
        let models = self.backend.list_models().await?;
        debug!(count = models.len(), "listed local models");
        Ok(models)
    }

    pub async fn selection(&self) -> ModelSelection {
        self.selection.read().await.clone()
    }

    pub async fn select_model(&self, model: impl Into<String>) {
        let model = model.into();
        info!(model = %model, "selected language model");
        self.selection.write().await.selected_model = model;
    }

    pub async fn set_sampling(&self, sampling: SamplingConfig) {
        self.selection.write().await.sampling = sampling;
    }

    pub async fn set_temperature(&self, temperature: f32) {
        self.selection.write().await.sampling.temperature = temperature;
    }

    pub async fn set_top_k(&self, top_k: f32) {
        self.selection.write().await.sampling.top_k = top_k;
    }

    pub async fn set_top_p(&self, top_p: f32) {
        self.selection.write().await.sampling.top_p = top_p;
    }

    /// Submits with the current model selection and sampling parameters.
    pub async fn submit(
        &self,
        prompt_text: impl Into<String>,
        attachment: Option<Attachment>,
    ) -> Result<DispatchHandle, SubmitError> {
        let ModelSelection {
            selected_model,
            sampling,
        } = self.selection().await;
        self.submit_with(PromptSubmission {
            prompt_text: prompt_text.into(),
            attachment,
            sampling,
            selected_model,
        })
        .await
    }

    pub async fn submit_with(
        &self,
        submission: PromptSubmission,
    ) -> Result<DispatchHandle, SubmitError> {
        self.dispatcher.submit(submission).await
    }

    /// Decodes one inbound envelope and applies it to the session. Malformed
    /// and stale envelopes are dropped without surfacing anything to the user.
    pub async fn handle_stream_envelope(&self, envelope: StreamEnvelope) -> Option<AppliedDelta> {
        let StreamEnvelope {
            generation_id,
            event,
        } = envelope;

        let delta = match decode(event) {
            Ok(delta) => delta,
            Err(err) => {
                let engine_error = err.to_engine_error();
                warn!(code = ?engine_error.code, error = %engine_error.message, "dropping stream event");
                return None;
            }
        };
        let fragment = delta.content_fragment.clone();

        let (applied, role) = {
            let mut session = self.session.lock().await;
            if let Some(generation_id) = generation_id {
                if session.active_generation() != Some(generation_id) {
                    debug!(%generation_id, "dropping delta from a stale generation");
                    return None;
                }
            }
            let applied = session.apply_delta(delta);
            (applied, session.turns()[applied.index].role())
        };

        let _ = self.events.send(ClientEvent::DeltaApplied {
            index: applied.index,
            role,
            fragment,
            opened: applied.target == DeltaTarget::OpenedTurn,
            closed: applied.closed,
        });
        Some(applied)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
