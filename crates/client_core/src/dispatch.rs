//! Prompt dispatch: validates a submission, appends the user turn, issues one
//! `send_prompt` command and clears the busy flag once the transport settles.

use std::sync::Arc;

use shared::{
    domain::{GenerationId, SamplingConfig},
    error::{EngineError, ErrorCode},
    protocol::{PromptConfig, SendPromptCommand, SEND_PROMPT_COMMAND},
};
use thiserror::Error;
use tokio::{
    sync::broadcast,
    task::{JoinError, JoinHandle},
};
use tracing::{debug, error, info, warn};

use crate::{
    session::{Attachment, SessionHandle, Turn},
    ClientEvent, GenerationBackend,
};

pub const TRANSPORT_FAILURE_NOTICE: &str = "Failed to send the prompt to the model";

#[derive(Debug, Clone, PartialEq)]
pub struct PromptSubmission {
    pub prompt_text: String,
    pub attachment: Option<Attachment>,
    pub sampling: SamplingConfig,
    pub selected_model: String,
}

/// User-facing rejections. None of them touch the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("Type something to get started!")]
    EmptyPrompt,
    #[error("Select a language model!")]
    NoModelSelected,
    #[error("Wait for the current answer to finish before sending another prompt.")]
    GenerationInFlight,
}

impl SubmitError {
    pub fn to_notice(self) -> EngineError {
        EngineError::new(ErrorCode::Validation, self.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Accepted,
    Rejected(String),
}

/// Handle on one in-flight dispatch. Awaiting it is optional: busy is cleared
/// by the dispatch task itself.
#[derive(Debug)]
pub struct DispatchHandle {
    generation_id: GenerationId,
    task: JoinHandle<DispatchOutcome>,
}

impl DispatchHandle {
    pub fn generation_id(&self) -> GenerationId {
        self.generation_id
    }

    pub async fn settled(self) -> DispatchOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) => DispatchOutcome::Rejected(format!("dispatch task failed: {err}")),
        }
    }
}

pub struct PromptDispatcher {
    session: SessionHandle,
    backend: Arc<dyn GenerationBackend>,
    events: broadcast::Sender<ClientEvent>,
}

impl PromptDispatcher {
    pub fn new(
        session: SessionHandle,
        backend: Arc<dyn GenerationBackend>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            session,
            backend,
            events,
        }
    }

    pub async fn submit(
        &self,
        submission: PromptSubmission,
    ) -> Result<DispatchHandle, SubmitError> {
        if let Err(err) = validate(&submission) {
            return Err(self.reject(err));
        }

        let PromptSubmission {
            prompt_text,
            attachment,
            sampling,
            selected_model,
        } = submission;
        let generation_id = GenerationId::new_v4();

        let (abandoned, turn_index, user_turn, command) = {
            let mut session = self.session.lock().await;
            if session.busy() {
                drop(session);
                return Err(self.reject(SubmitError::GenerationInFlight));
            }

            // No transport call is pending, so nothing will finish an open turn.
            let abandoned = session
                .close_open_turn()
                .map(|index| (index, session.turns()[index].role()));

            let user_turn = Turn::user(prompt_text, attachment);
            let turn_index = match session.append_turn(user_turn.clone()) {
                Ok(index) => index,
                Err(_) => {
                    drop(session);
                    return Err(self.reject(SubmitError::GenerationInFlight));
                }
            };
            session.set_busy(true);
            session.set_active_generation(generation_id);

            let command = SendPromptCommand {
                generation_id,
                config: PromptConfig::new(selected_model, sampling),
                context: session
                    .turns()
                    .iter()
                    .map(Turn::to_context_message)
                    .collect(),
            };
            (abandoned, turn_index, user_turn, command)
        };

        if let Some((index, role)) = abandoned {
            warn!(index, "closing a turn left open by an unfinished answer");
            let _ = self.events.send(ClientEvent::DeltaApplied {
                index,
                role,
                fragment: String::new(),
                opened: false,
                closed: true,
            });
        }
        let _ = self.events.send(ClientEvent::TurnAppended {
            index: turn_index,
            turn: user_turn,
        });
        let _ = self.events.send(ClientEvent::BusyChanged(true));
        info!(
            command = SEND_PROMPT_COMMAND,
            %generation_id,
            model = %command.config.language_model,
            history_len = command.context.len(),
            "dispatching prompt"
        );

        let backend = Arc::clone(&self.backend);
        let session = self.session.clone();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            let send = tokio::spawn(async move { backend.send_prompt(command).await });
            settle(&session, &events, generation_id, send.await).await
        });

        Ok(DispatchHandle {
            generation_id,
            task,
        })
    }

    fn reject(&self, err: SubmitError) -> SubmitError {
        debug!(reason = %err, "prompt submission rejected");
        let _ = self.events.send(ClientEvent::Notice(err.to_notice()));
        err
    }
}

fn validate(submission: &PromptSubmission) -> Result<(), SubmitError> {
    if submission.prompt_text.trim().is_empty() {
        return Err(SubmitError::EmptyPrompt);
    }
    if submission.selected_model.trim().is_empty() {
        return Err(SubmitError::NoModelSelected);
    }
    Ok(())
}

async fn settle(
    session: &SessionHandle,
    events: &broadcast::Sender<ClientEvent>,
    generation_id: GenerationId,
    result: Result<anyhow::Result<()>, JoinError>,
) -> DispatchOutcome {
    if session.set_busy(false).await {
        let _ = events.send(ClientEvent::BusyChanged(false));
    }

    match result {
        Ok(Ok(())) => {
            debug!(%generation_id, "prompt dispatch accepted");
            DispatchOutcome::Accepted
        }
        Err(err) => {
            let reason = format!("prompt dispatch task failed: {err}");
            error!(%generation_id, error = %reason, "backend send did not complete");
            let _ = events.send(ClientEvent::Notice(EngineError::new(
                ErrorCode::Internal,
                reason.clone(),
            )));
            DispatchOutcome::Rejected(reason)
        }
        Ok(Err(err)) => {
            let reason = format!("{err:#}");
            warn!(%generation_id, error = %reason, "prompt dispatch rejected by transport");
            let _ = events.send(ClientEvent::Notice(EngineError::new(
                ErrorCode::Transport,
                format!("{TRANSPORT_FAILURE_NOTICE}: {reason}"),
            )));
            DispatchOutcome::Rejected(reason)
        }
    }
}

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod tests;
