//! Queues parsed console commands for the command worker.

use tokio::sync::mpsc::{error::TrySendError, Sender};

use crate::backend_bridge::commands::ConsoleCommand;

pub const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Leaves `status` empty when the command was queued.
pub fn dispatch_console_command(
    cmd_tx: &Sender<ConsoleCommand>,
    cmd: ConsoleCommand,
    status: &mut String,
) {
    let cmd_name = cmd.name();

    match cmd_tx.try_send(cmd) {
        Ok(()) => tracing::debug!(command = cmd_name, "queued console command"),
        Err(TrySendError::Full(_)) => {
            *status = "Command queue is full; please retry".to_string();
        }
        Err(TrySendError::Closed(_)) => {
            *status = "Command worker stopped; restart the console".to_string();
        }
    }
}

#[cfg(test)]
#[path = "../tests/orchestration_tests.rs"]
mod tests;
