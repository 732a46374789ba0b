//! Console commands queued from the stdin reader to the command worker.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Submit(String),
    ListModels,
    SelectModel(String),
    SetTemperature(f32),
    SetTopK(f32),
    SetTopP(f32),
    AttachImage(PathBuf),
    ClearImage,
    History,
    Help,
    Quit,
}

impl ConsoleCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ConsoleCommand::Submit(_) => "submit",
            ConsoleCommand::ListModels => "list_models",
            ConsoleCommand::SelectModel(_) => "select_model",
            ConsoleCommand::SetTemperature(_) => "set_temperature",
            ConsoleCommand::SetTopK(_) => "set_top_k",
            ConsoleCommand::SetTopP(_) => "set_top_p",
            ConsoleCommand::AttachImage(_) => "attach_image",
            ConsoleCommand::ClearImage => "clear_image",
            ConsoleCommand::History => "history",
            ConsoleCommand::Help => "help",
            ConsoleCommand::Quit => "quit",
        }
    }
}

pub const HELP_TEXT: &str = "\
commands:
  <text>              send a prompt (start with // to send text beginning with /)
  /models             list local models
  /model <name>       select the model for the next prompt
  /temperature <f>    set the sampling temperature
  /top-k <f>          set top-k
  /top-p <f>          set top-p
  /image <path>       attach an image to the next prompt
  /clear-image        drop the pending image
  /history            print the conversation
  /quit               leave";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    #[error("unknown command '/{0}'; type /help for the list")]
    Unknown(String),
    #[error("/{command} expects {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },
    #[error("/{command}: '{value}' is not a number")]
    InvalidNumber {
        command: &'static str,
        value: String,
    },
}

/// Anything that does not start with `/` is a prompt, blank lines included.
pub fn parse_line(line: &str) -> Result<ConsoleCommand, CommandParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(escaped) = line.strip_prefix("//") {
        return Ok(ConsoleCommand::Submit(format!("/{escaped}")));
    }
    let Some(command_line) = line.strip_prefix('/') else {
        return Ok(ConsoleCommand::Submit(line.to_string()));
    };

    let (name, argument) = match command_line.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (command_line, ""),
    };

    match name {
        "models" => Ok(ConsoleCommand::ListModels),
        "model" => required(argument, "model", "a model name")
            .map(|name| ConsoleCommand::SelectModel(name.to_string())),
        "temperature" => number(argument, "temperature").map(ConsoleCommand::SetTemperature),
        "top-k" => number(argument, "top-k").map(ConsoleCommand::SetTopK),
        "top-p" => number(argument, "top-p").map(ConsoleCommand::SetTopP),
        "image" => required(argument, "image", "a file path")
            .map(|path| ConsoleCommand::AttachImage(PathBuf::from(path))),
        "clear-image" => Ok(ConsoleCommand::ClearImage),
        "history" => Ok(ConsoleCommand::History),
        "help" => Ok(ConsoleCommand::Help),
        "quit" | "exit" => Ok(ConsoleCommand::Quit),
        other => Err(CommandParseError::Unknown(other.to_string())),
    }
}

fn required<'a>(
    argument: &'a str,
    command: &'static str,
    expected: &'static str,
) -> Result<&'a str, CommandParseError> {
    if argument.is_empty() {
        Err(CommandParseError::MissingArgument { command, expected })
    } else {
        Ok(argument)
    }
}

fn number(argument: &str, command: &'static str) -> Result<f32, CommandParseError> {
    let raw = required(argument, command, "a number")?;
    match raw.parse::<f32>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(CommandParseError::InvalidNumber {
            command,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
#[path = "../tests/commands_tests.rs"]
mod tests;
