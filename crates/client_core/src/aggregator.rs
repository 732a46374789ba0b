//! Message aggregator.
//!
//! The stream is treated as a sequence of deltas for "the current open turn":
//! turns are never addressed by identifier. A delta extends the last turn while
//! that turn is open and otherwise starts a new one. Only a `done` delta closes
//! a turn; a differing role does not.

use crate::{
    decoder::TokenDelta,
    session::{Session, Turn},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaTarget {
    ExtendedOpenTurn,
    OpenedTurn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedDelta {
    pub index: usize,
    pub target: DeltaTarget,
    pub closed: bool,
}

pub fn apply_delta(turns: &mut Vec<Turn>, delta: TokenDelta) -> AppliedDelta {
    if let Some(open) = turns.last_mut().filter(|turn| !turn.is_done()) {
        open.extend(&delta.content_fragment, delta.done);
        return AppliedDelta {
            index: turns.len() - 1,
            target: DeltaTarget::ExtendedOpenTurn,
            closed: delta.done,
        };
    }

    turns.push(Turn::new(
        delta.role,
        delta.content_fragment,
        delta.done,
        delta.created_at,
    ));
    AppliedDelta {
        index: turns.len() - 1,
        target: DeltaTarget::OpenedTurn,
        closed: delta.done,
    }
}

impl Session {
    pub fn apply_delta(&mut self, delta: TokenDelta) -> AppliedDelta {
        apply_delta(self.turns_mut(), delta)
    }
}

#[cfg(test)]
#[path = "tests/aggregator_tests.rs"]
mod tests;
