//! Session state: the ordered turn list, the busy flag and the handle that
//! serializes access to both.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use shared::{
    domain::{GenerationId, Role},
    protocol::ContextMessage,
};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

pub const DEFAULT_GREETING: &str =
    "You can ask me **questions** or give me **commands**. I am here to **help you**!";

/// Opaque, already-encoded image attached to a user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment(String);

impl Attachment {
    pub fn from_base64(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_base64(&self) -> &str {
        &self.0
    }
}

/// One conversation entry. Content only grows while the turn is open and
/// nothing changes once it is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    role: Role,
    content: String,
    done: bool,
    created_at: String,
    attachment: Option<Attachment>,
}

pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Turn {
    pub(crate) fn new(role: Role, content: String, done: bool, created_at: String) -> Self {
        Self {
            role,
            content,
            done,
            created_at,
            attachment: None,
        }
    }

    /// A finished user turn as built by the dispatcher.
    pub fn user(content: impl Into<String>, attachment: Option<Attachment>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            done: true,
            created_at: now_timestamp(),
            attachment,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content.into(), true, now_timestamp())
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    /// Caller guarantees the turn is still open.
    pub(crate) fn extend(&mut self, fragment: &str, done: bool) {
        debug_assert!(!self.done, "closed turns are immutable");
        self.content.push_str(fragment);
        self.done = done;
    }

    pub(crate) fn close(&mut self) {
        self.done = true;
    }

    pub fn to_context_message(&self) -> ContextMessage {
        ContextMessage {
            role: self.role,
            content: self.content.clone(),
            done: self.done,
            image: self
                .attachment
                .as_ref()
                .map(|attachment| attachment.as_base64().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("turn {open_index} is still open; new turns can only follow a closed turn")]
    OpenTurnPending { open_index: usize },
    #[error("turn mutation would leave {open_turns} open turns")]
    TooManyOpenTurns { open_turns: usize },
}

/// Read-only copy of the session handed to presentation code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub turns: Vec<Turn>,
    pub busy: bool,
}

impl SessionView {
    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// True while an answer is still streaming into the last turn. This is
    /// not the same as `busy`, which only tracks the transport call.
    pub fn is_streaming(&self) -> bool {
        self.turns.last().is_some_and(|turn| !turn.is_done())
    }
}

#[derive(Debug, Default)]
pub struct Session {
    turns: Vec<Turn>,
    busy: bool,
    active_generation: Option<GenerationId>,
}

fn open_turn_count(turns: &[Turn]) -> usize {
    turns.iter().filter(|turn| !turn.is_done()).count()
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session with one finished system turn, as created at launch.
    pub fn seeded(greeting: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::system(greeting)],
            ..Self::default()
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn busy(&self) -> bool {
        self.busy
    }

    pub fn active_generation(&self) -> Option<GenerationId> {
        self.active_generation
    }

    pub fn open_turn(&self) -> Option<&Turn> {
        self.turns.last().filter(|turn| !turn.is_done())
    }

    pub fn has_open_turn(&self) -> bool {
        self.open_turn().is_some()
    }

    pub fn append_turn(&mut self, turn: Turn) -> Result<usize, SessionError> {
        if self.has_open_turn() {
            return Err(SessionError::OpenTurnPending {
                open_index: self.turns.len() - 1,
            });
        }
        self.turns.push(turn);
        Ok(self.turns.len() - 1)
    }

    /// Applies `mutate` to a working copy and commits it only if at most one
    /// turn is left open.
    pub fn mutate_turns<F>(&mut self, mutate: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut Vec<Turn>),
    {
        let mut working = self.turns.clone();
        mutate(&mut working);

        let open_turns = open_turn_count(&working);
        if open_turns > 1 {
            return Err(SessionError::TooManyOpenTurns { open_turns });
        }
        if open_turns == 1 && working.last().is_some_and(Turn::is_done) {
            let open_index = working
                .iter()
                .position(|turn| !turn.is_done())
                .unwrap_or_default();
            return Err(SessionError::OpenTurnPending { open_index });
        }

        self.turns = working;
        Ok(())
    }

    /// Closes a turn left open by an answer that will never finish, keeping
    /// whatever content it received. Returns the index of the closed turn.
    pub fn close_open_turn(&mut self) -> Option<usize> {
        let index = self.turns.len().checked_sub(1)?;
        let turn = self.turns.get_mut(index).filter(|turn| !turn.is_done())?;
        turn.close();
        Some(index)
    }

    /// Returns whether the flag actually changed.
    pub fn set_busy(&mut self, busy: bool) -> bool {
        let changed = self.busy != busy;
        self.busy = busy;
        changed
    }

    pub(crate) fn set_active_generation(&mut self, generation_id: GenerationId) {
        self.active_generation = Some(generation_id);
    }

    pub(crate) fn turns_mut(&mut self) -> &mut Vec<Turn> {
        &mut self.turns
    }

    pub fn snapshot(&self) -> SessionView {
        SessionView {
            turns: self.turns.clone(),
            busy: self.busy,
        }
    }
}

/// Shared owner of the session. Every mutation happens under one lock
/// acquisition so the open-turn invariant holds on a multi-threaded runtime.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<Session>>,
}

impl SessionHandle {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner.lock().await
    }

    pub async fn snapshot(&self) -> SessionView {
        self.inner.lock().await.snapshot()
    }

    pub async fn append_turn(&self, turn: Turn) -> Result<usize, SessionError> {
        self.inner.lock().await.append_turn(turn)
    }

    pub async fn mutate_turns<F>(&self, mutate: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut Vec<Turn>),
    {
        self.inner.lock().await.mutate_turns(mutate)
    }

    pub async fn set_busy(&self, busy: bool) -> bool {
        self.inner.lock().await.set_busy(busy)
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
