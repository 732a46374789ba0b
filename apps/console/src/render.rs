//! Text rendering of client events, transcripts and model listings.

use client_core::{ClientEvent, SessionView, Turn};
use shared::domain::{ModelSummary, Role};

use crate::controller::events::ConsoleNotice;

fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Assistant => "model",
        Role::System => "system",
    }
}

/// Turns client events into terminal output. Streamed fragments are written
/// as they arrive; a turn gets its header when it opens and a newline when it
/// closes. A notice printed mid-turn breaks the line, and the turn's header is
/// repeated when its next fragment arrives.
#[derive(Debug, Default)]
pub struct EventRenderer {
    mid_line: bool,
    resume_header: bool,
}

impl EventRenderer {
    pub fn render(&mut self, event: &ClientEvent) -> String {
        match event {
            ClientEvent::DeltaApplied {
                role,
                fragment,
                opened,
                closed,
                ..
            } => {
                let resumed = std::mem::take(&mut self.resume_header) && !*opened;
                if resumed && fragment.is_empty() && *closed {
                    return String::new();
                }

                let mut out = String::new();
                if *opened || resumed {
                    if self.mid_line {
                        out.push('\n');
                    }
                    out.push_str(speaker(*role));
                    out.push_str(": ");
                }
                out.push_str(fragment);
                self.mid_line = !*closed;
                if *closed {
                    out.push('\n');
                }
                out
            }
            ClientEvent::Notice(error) => {
                let mut out = String::new();
                if std::mem::take(&mut self.mid_line) {
                    out.push('\n');
                    self.resume_header = true;
                }
                out.push_str(&render_notice(&ConsoleNotice::from_engine_error(error)));
                out
            }
            ClientEvent::TurnAppended { .. } | ClientEvent::BusyChanged(_) => String::new(),
        }
    }
}

pub fn render_notice(notice: &ConsoleNotice) -> String {
    let mut out = format!("[{}] {}\n", notice.category().label(), notice.message());
    if let Some(hint) = notice.hint() {
        out.push_str("       ");
        out.push_str(hint);
        out.push('\n');
    }
    out
}

pub fn render_turn(turn: &Turn) -> String {
    let mut line = format!("{}: {}", speaker(turn.role()), turn.content());
    if turn.attachment().is_some() {
        line.push_str(" [image]");
    }
    if !turn.is_done() {
        line.push_str(" …");
    }
    line
}

pub fn render_transcript(view: &SessionView) -> String {
    let mut out = String::new();
    for turn in &view.turns {
        out.push_str(&render_turn(turn));
        out.push('\n');
    }
    if view.busy {
        out.push_str("(waiting for the model)\n");
    }
    out
}

pub fn render_models(models: &[ModelSummary], selected: &str) -> String {
    if models.is_empty() {
        return "no local models; pull one with `ollama pull <model>`\n".to_string();
    }
    let width = models.iter().map(|model| model.name.len()).max().unwrap_or(0);
    models
        .iter()
        .map(|model| {
            let marker = if model.name == selected { '*' } else { ' ' };
            format!(
                "{marker} {:<width$}  {}\n",
                model.name,
                model.formatted_size()
            )
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
