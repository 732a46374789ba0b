use super::*;
use anyhow::anyhow;
use async_trait::async_trait;
use shared::{
    domain::{ModelSummary, Role},
    protocol::StreamEnvelope,
};
use tokio::sync::{oneshot, Mutex};

use crate::{decoder::TokenDelta, session::Session, GenerationBackend};

struct GatedBackend {
    commands: Mutex<Vec<SendPromptCommand>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    fail_with: Option<String>,
    panics: bool,
    stream: broadcast::Sender<StreamEnvelope>,
}

impl GatedBackend {
    fn immediate() -> Self {
        let (stream, _) = broadcast::channel(16);
        Self {
            commands: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
            fail_with: None,
            panics: false,
            stream,
        }
    }

    fn gated() -> (Self, oneshot::Sender<()>) {
        let (release, gate) = oneshot::channel();
        let mut backend = Self::immediate();
        backend.gate = Mutex::new(Some(gate));
        (backend, release)
    }

    fn failing(err: impl Into<String>) -> Self {
        let mut backend = Self::immediate();
        backend.fail_with = Some(err.into());
        backend
    }

    fn panicking() -> Self {
        let mut backend = Self::immediate();
        backend.panics = true;
        backend
    }
}

#[async_trait]
impl GenerationBackend for GatedBackend {
    async fn send_prompt(&self, command: SendPromptCommand) -> anyhow::Result<()> {
        self.commands.lock().await.push(command);
        let gate = self.gate.lock().await.take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.panics {
            panic!("backend blew up mid-request");
        }
        match &self.fail_with {
            Some(err) => Err(anyhow!(err.clone())),
            None => Ok(()),
        }
    }

    async fn list_models(&self) -> anyhow::Result<Vec<ModelSummary>> {
        Ok(Vec::new())
    }

    fn subscribe_stream(&self) -> broadcast::Receiver<StreamEnvelope> {
        self.stream.subscribe()
    }
}

struct Harness {
    session: SessionHandle,
    backend: Arc<GatedBackend>,
    dispatcher: PromptDispatcher,
    events: broadcast::Receiver<ClientEvent>,
}

fn harness(backend: GatedBackend) -> Harness {
    let session = SessionHandle::new(Session::seeded("seed"));
    let backend = Arc::new(backend);
    let (events_tx, events) = broadcast::channel(64);
    let dispatcher = PromptDispatcher::new(
        session.clone(),
        Arc::clone(&backend) as Arc<dyn GenerationBackend>,
        events_tx,
    );
    Harness {
        session,
        backend,
        dispatcher,
        events,
    }
}

fn submission(prompt: &str, model: &str) -> PromptSubmission {
    PromptSubmission {
        prompt_text: prompt.to_string(),
        attachment: None,
        sampling: SamplingConfig::default(),
        selected_model: model.to_string(),
    }
}

fn drain(events: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn busy_cleared_count(events: &[ClientEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, ClientEvent::BusyChanged(false)))
        .count()
}

#[tokio::test]
async fn empty_prompt_is_rejected_without_state_change() {
    let mut h = harness(GatedBackend::immediate());
    let before = h.session.snapshot().await;

    let err = h
        .dispatcher
        .submit(submission("", "llama3"))
        .await
        .expect_err("must reject");

    assert_eq!(err, SubmitError::EmptyPrompt);
    assert_eq!(h.session.snapshot().await, before);
    assert!(h.backend.commands.lock().await.is_empty());

    let events = drain(&mut h.events);
    assert_eq!(events.len(), 1);
    match &events[0] {
        ClientEvent::Notice(notice) => {
            assert_eq!(notice.code, ErrorCode::Validation);
            assert_eq!(notice.message, "Type something to get started!");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn whitespace_prompt_counts_as_empty() {
    let h = harness(GatedBackend::immediate());
    let err = h
        .dispatcher
        .submit(submission("  \n\t", "llama3"))
        .await
        .expect_err("must reject");
    assert_eq!(err, SubmitError::EmptyPrompt);
}

#[tokio::test]
async fn missing_model_is_rejected_without_state_change() {
    let mut h = harness(GatedBackend::immediate());
    let before = h.session.snapshot().await;

    let err = h
        .dispatcher
        .submit(submission("hi", ""))
        .await
        .expect_err("must reject");

    assert_eq!(err, SubmitError::NoModelSelected);
    assert_eq!(h.session.snapshot().await, before);
    assert!(h.backend.commands.lock().await.is_empty());
    assert!(matches!(
        drain(&mut h.events).as_slice(),
        [ClientEvent::Notice(notice)] if notice.message == "Select a language model!"
    ));
}

#[tokio::test]
async fn submit_sets_busy_and_appends_one_closed_user_turn() {
    let (backend, release) = GatedBackend::gated();
    let mut h = harness(backend);

    let handle = h
        .dispatcher
        .submit(submission("hi", "llama3"))
        .await
        .expect("submit");

    let view = h.session.snapshot().await;
    assert!(view.busy);
    assert_eq!(view.turns.len(), 2);
    let user_turn = &view.turns[1];
    assert_eq!(user_turn.role(), Role::User);
    assert_eq!(user_turn.content(), "hi");
    assert!(user_turn.is_done());

    release.send(()).expect("release");
    assert_eq!(handle.settled().await, DispatchOutcome::Accepted);

    let view = h.session.snapshot().await;
    assert!(!view.busy);
    assert_eq!(view.turns.len(), 2);

    let events = drain(&mut h.events);
    assert!(matches!(
        events.first(),
        Some(ClientEvent::TurnAppended { index: 1, .. })
    ));
    assert!(events
        .iter()
        .any(|event| matches!(event, ClientEvent::BusyChanged(true))));
    assert_eq!(busy_cleared_count(&events), 1);
}

#[tokio::test]
async fn command_carries_history_sampling_and_attachment() {
    let h = harness(GatedBackend::immediate());
    let sampling = SamplingConfig {
        temperature: 0.2,
        top_k: 12.0,
        top_p: 0.5,
    };

    let handle = h
        .dispatcher
        .submit(PromptSubmission {
            prompt_text: "describe".to_string(),
            attachment: Some(Attachment::from_base64("aW1n")),
            sampling,
            selected_model: "llava".to_string(),
        })
        .await
        .expect("submit");
    let generation_id = handle.generation_id();
    handle.settled().await;

    let commands = h.backend.commands.lock().await;
    assert_eq!(commands.len(), 1);
    let command = &commands[0];
    assert_eq!(command.generation_id, generation_id);
    assert_eq!(command.config.language_model, "llava");
    assert_eq!(command.config.temperature, 0.2);
    assert_eq!(command.config.top_k, 12.0);
    assert_eq!(command.config.top_p, 0.5);

    let roles: Vec<_> = command.context.iter().map(|message| message.role).collect();
    assert_eq!(roles, vec![Role::System, Role::User]);
    assert_eq!(command.context[1].content, "describe");
    assert_eq!(command.context[1].image.as_deref(), Some("aW1n"));

    let session = h.session.lock().await;
    assert_eq!(session.active_generation(), Some(generation_id));
}

#[tokio::test]
async fn transport_failure_clears_busy_once_and_keeps_user_turn() {
    let mut h = harness(GatedBackend::failing("connection refused"));

    let handle = h
        .dispatcher
        .submit(submission("hi", "llama3"))
        .await
        .expect("submit");
    let outcome = handle.settled().await;

    assert!(matches!(outcome, DispatchOutcome::Rejected(reason) if reason.contains("connection refused")));

    let view = h.session.snapshot().await;
    assert!(!view.busy);
    assert_eq!(view.turns.len(), 2);
    assert_eq!(view.turns[1].content(), "hi");

    let events = drain(&mut h.events);
    assert_eq!(busy_cleared_count(&events), 1);
    let transport_notice = events.iter().find_map(|event| match event {
        ClientEvent::Notice(notice) if notice.code == ErrorCode::Transport => Some(notice),
        _ => None,
    });
    let notice = transport_notice.expect("transport notice");
    assert!(notice.message.starts_with(TRANSPORT_FAILURE_NOTICE));
}

#[tokio::test]
async fn second_submission_is_rejected_while_busy() {
    let (backend, release) = GatedBackend::gated();
    let h = harness(backend);

    let first = h
        .dispatcher
        .submit(submission("first", "llama3"))
        .await
        .expect("submit");

    let err = h
        .dispatcher
        .submit(submission("second", "llama3"))
        .await
        .expect_err("must reject");
    assert_eq!(err, SubmitError::GenerationInFlight);
    assert_eq!(h.session.snapshot().await.turns.len(), 2);

    release.send(()).expect("release");
    first.settled().await;
    assert_eq!(h.backend.commands.lock().await.len(), 1);
}

#[tokio::test]
async fn submission_closes_a_turn_left_open_once_idle() {
    let mut h = harness(GatedBackend::immediate());
    h.session.lock().await.apply_delta(TokenDelta {
        role: Role::Assistant,
        content_fragment: "cut o".to_string(),
        done: false,
        created_at: "t0".to_string(),
    });
    drain(&mut h.events);

    let handle = h
        .dispatcher
        .submit(submission("hi", "llama3"))
        .await
        .expect("idle session accepts a new prompt");

    let view = h.session.snapshot().await;
    assert_eq!(view.turns.len(), 3);
    assert_eq!(view.turns[1].role(), Role::Assistant);
    assert_eq!(view.turns[1].content(), "cut o");
    assert!(view.turns[1].is_done());
    assert_eq!(view.turns[2].content(), "hi");

    let events = drain(&mut h.events);
    assert!(matches!(
        events.first(),
        Some(ClientEvent::DeltaApplied { index: 1, role: Role::Assistant, opened: false, closed: true, fragment })
            if fragment.is_empty()
    ));

    handle.settled().await;
    let commands = h.backend.commands.lock().await;
    assert!(commands[0].context[1].done);
}

#[tokio::test]
async fn panicking_backend_clears_busy_and_reports_an_internal_notice() {
    let mut h = harness(GatedBackend::panicking());

    let handle = h
        .dispatcher
        .submit(submission("hi", "llama3"))
        .await
        .expect("submit");
    let outcome = handle.settled().await;

    assert!(matches!(outcome, DispatchOutcome::Rejected(reason) if reason.contains("dispatch task failed")));
    assert!(!h.session.snapshot().await.busy);

    let events = drain(&mut h.events);
    assert_eq!(busy_cleared_count(&events), 1);
    assert!(events.iter().any(|event| matches!(
        event,
        ClientEvent::Notice(notice) if notice.code == ErrorCode::Internal
    )));

    let retry = h
        .dispatcher
        .submit(submission("again", "llama3"))
        .await
        .expect("session stays usable");
    assert!(matches!(retry.settled().await, DispatchOutcome::Rejected(_)));
    assert_eq!(h.session.snapshot().await.turns.len(), 3);
}

#[tokio::test]
async fn dispatcher_is_usable_after_a_failed_submission() {
    let h = harness(GatedBackend::immediate());

    h.dispatcher
        .submit(submission("", "llama3"))
        .await
        .expect_err("must reject");
    let handle = h
        .dispatcher
        .submit(submission("hi", "llama3"))
        .await
        .expect("submit");

    assert_eq!(handle.settled().await, DispatchOutcome::Accepted);
    assert_eq!(h.session.snapshot().await.turns.len(), 2);
}
