//! Command worker: executes queued console commands against the chat client.

use std::{io::Write, path::PathBuf, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use client_core::{Attachment, ChatClient};
use tokio::sync::mpsc::Receiver;
use tracing::{debug, info, warn};

use crate::{
    backend_bridge::commands::{ConsoleCommand, HELP_TEXT},
    controller::events::ConsoleNotice,
    render::{render_models, render_notice, render_transcript},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

struct PendingImage {
    path: PathBuf,
    attachment: Attachment,
}

pub struct ConsoleRuntime {
    client: Arc<ChatClient>,
    pending_image: Option<PendingImage>,
}

impl ConsoleRuntime {
    pub fn new(client: Arc<ChatClient>) -> Self {
        Self {
            client,
            pending_image: None,
        }
    }

    pub fn has_pending_image(&self) -> bool {
        self.pending_image.is_some()
    }

    /// Runs until `/quit` or until the reader side of the queue goes away.
    pub async fn run<W: Write>(
        &mut self,
        mut cmd_rx: Receiver<ConsoleCommand>,
        out: &mut W,
    ) -> anyhow::Result<()> {
        while let Some(cmd) = cmd_rx.recv().await {
            if self.execute(cmd, out).await? == Flow::Quit {
                break;
            }
        }
        Ok(())
    }

    pub async fn execute<W: Write>(
        &mut self,
        cmd: ConsoleCommand,
        out: &mut W,
    ) -> anyhow::Result<Flow> {
        debug!(command = cmd.name(), "executing console command");
        match cmd {
            ConsoleCommand::Submit(text) => self.submit(text).await,
            ConsoleCommand::ListModels => {
                let selected = self.client.selection().await.selected_model;
                match self.client.list_models().await {
                    Ok(models) => write!(out, "{}", render_models(&models, &selected))?,
                    Err(err) => {
                        warn!(error = %format!("{err:#}"), "model listing failed");
                        let notice = ConsoleNotice::transport(format!(
                            "Failed to list local models: {err:#}"
                        ));
                        write!(out, "{}", render_notice(&notice))?;
                    }
                }
            }
            ConsoleCommand::SelectModel(model) => {
                writeln!(out, "model set to {model}")?;
                self.client.select_model(model).await;
            }
            ConsoleCommand::SetTemperature(value) => {
                self.client.set_temperature(value).await;
                writeln!(out, "temperature set to {value}")?;
            }
            ConsoleCommand::SetTopK(value) => {
                self.client.set_top_k(value).await;
                writeln!(out, "top-k set to {value}")?;
            }
            ConsoleCommand::SetTopP(value) => {
                self.client.set_top_p(value).await;
                writeln!(out, "top-p set to {value}")?;
            }
            ConsoleCommand::AttachImage(path) => match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    writeln!(
                        out,
                        "attached {} ({} bytes) to the next prompt",
                        path.display(),
                        bytes.len()
                    )?;
                    self.pending_image = Some(PendingImage {
                        attachment: Attachment::from_base64(STANDARD.encode(&bytes)),
                        path,
                    });
                }
                Err(err) => {
                    writeln!(out, "could not read image '{}': {err}", path.display())?;
                }
            },
            ConsoleCommand::ClearImage => match self.pending_image.take() {
                Some(image) => writeln!(out, "dropped {}", image.path.display())?,
                None => writeln!(out, "no image attached")?,
            },
            ConsoleCommand::History => {
                write!(out, "{}", render_transcript(&self.client.snapshot().await))?;
            }
            ConsoleCommand::Help => writeln!(out, "{HELP_TEXT}")?,
            ConsoleCommand::Quit => return Ok(Flow::Quit),
        }
        out.flush()?;
        Ok(Flow::Continue)
    }

    /// Rejections are reported by the engine as notices; the pending image is
    /// kept so the user can retry.
    async fn submit(&mut self, text: String) {
        let pending = self.pending_image.take();
        let attachment = pending.as_ref().map(|image| image.attachment.clone());
        match self.client.submit(text, attachment).await {
            Ok(handle) => {
                info!(generation_id = %handle.generation_id(), "prompt submitted");
            }
            Err(err) => {
                debug!(reason = %err, "prompt not submitted");
                self.pending_image = pending;
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/runtime_tests.rs"]
mod tests;
