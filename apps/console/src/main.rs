use std::{
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::ChatClient;
use ollama_bridge::{OllamaBackend, OllamaConfig};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast::error::RecvError, mpsc},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod backend_bridge;
mod config;
mod controller;
mod render;

use backend_bridge::{
    commands::{parse_line, ConsoleCommand},
    runtime::ConsoleRuntime,
};
use config::{load_settings, Settings};
use controller::orchestration::{dispatch_console_command, COMMAND_QUEUE_CAPACITY};
use render::{render_transcript, EventRenderer};

/// Chat with a local Ollama model from the terminal.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// TOML settings file; defaults to ./console.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    ollama_url: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    temperature: Option<f32>,
    #[arg(long)]
    top_k: Option<f32>,
    #[arg(long)]
    top_p: Option<f32>,
    #[arg(long)]
    log_filter: Option<String>,
}

impl Args {
    fn apply_to(&self, settings: &mut Settings) {
        if let Some(v) = &self.ollama_url {
            settings.ollama_url = Some(v.clone());
        }
        if let Some(v) = &self.model {
            settings.default_model = Some(v.clone());
        }
        if let Some(v) = self.temperature {
            settings.sampling.temperature = v;
        }
        if let Some(v) = self.top_k {
            settings.sampling.top_k = v;
        }
        if let Some(v) = self.top_p {
            settings.sampling.top_p = v;
        }
        if let Some(v) = &self.log_filter {
            settings.log_filter = v.clone();
        }
    }
}

fn init_tracing(filter: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let loaded = load_settings(args.config.as_deref())?;
    let mut settings = loaded.settings;
    args.apply_to(&mut settings);

    init_tracing(&settings.log_filter);
    for ignored in &loaded.ignored_overrides {
        warn!(override_value = %ignored, "ignoring malformed numeric override");
    }

    let ollama = OllamaConfig::resolve(settings.ollama_url.as_deref())
        .context("failed to resolve the Ollama url")?;
    info!(url = %ollama.base_url(), "using ollama backend");
    let backend = Arc::new(OllamaBackend::new(ollama));

    let client = ChatClient::new(backend, settings.greeting.clone());
    client.set_sampling(settings.sampling).await;
    if let Some(model) = settings.default_model.clone() {
        client.select_model(model).await;
    }

    let _subscription = client.attach();
    spawn_event_printer(&client);

    print!("{}", render_transcript(&client.snapshot().await));
    println!("type /help for commands");
    io::stdout().flush()?;

    let (cmd_tx, cmd_rx) = mpsc::channel::<ConsoleCommand>(COMMAND_QUEUE_CAPACITY);
    tokio::spawn(read_stdin(cmd_tx));

    let mut runtime = ConsoleRuntime::new(Arc::clone(&client));
    let mut stdout = io::stdout();
    runtime.run(cmd_rx, &mut stdout).await?;

    info!("console closed");
    Ok(())
}

fn spawn_event_printer(client: &Arc<ChatClient>) {
    let mut events = client.subscribe_events();
    tokio::spawn(async move {
        let mut renderer = EventRenderer::default();
        loop {
            match events.recv().await {
                Ok(event) => {
                    let text = renderer.render(&event);
                    if !text.is_empty() {
                        let mut stdout = io::stdout();
                        let _ = write!(stdout, "{text}");
                        let _ = stdout.flush();
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "console fell behind the event stream");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Feeds stdin lines into the command queue. End of input behaves like `/quit`.
async fn read_stdin(cmd_tx: mpsc::Sender<ConsoleCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "failed to read stdin");
                break;
            }
        };

        let mut status = String::new();
        match parse_line(&line) {
            Ok(cmd) => {
                let quit = cmd == ConsoleCommand::Quit;
                dispatch_console_command(&cmd_tx, cmd, &mut status);
                if quit {
                    return;
                }
            }
            Err(err) => status = err.to_string(),
        }
        if !status.is_empty() {
            eprintln!("{status}");
        }
    }
    let _ = cmd_tx.send(ConsoleCommand::Quit).await;
}
