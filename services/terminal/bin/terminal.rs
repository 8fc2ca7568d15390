//! Main Entrypoint for the Terminal Chat
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and the command line.
//! 2. Choosing the webhook (HTTP or simulated) and the audio source.
//! 3. Collecting the lead form, then relaying chat commands to the session.

use anyhow::Context;
use clap::Parser;
use leadchat_core::lead::LeadInfo;
use leadchat_core::runtime::{ChatHandle, ChatRuntime, RuntimeError};
use leadchat_core::session::{ChatSession, SessionError};
use leadchat_core::webhook::{HttpWebhook, OfflineWebhook, Webhook};
use leadchat_terminal::capture::FileCapture;
use leadchat_terminal::config::Config;
use leadchat_terminal::input::{Command, HELP, parse_line};
use leadchat_terminal::render::render_event;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "leadchat")]
#[command(about = "Talk to the lead chat webhook from a terminal")]
#[command(version)]
struct Args {
    /// A webm file played back as the microphone when recording.
    #[arg(long, value_name = "PATH")]
    audio_file: Option<PathBuf>,

    /// Overrides WEBHOOK_URL.
    #[arg(long, value_name = "URL")]
    webhook_url: Option<String>,
}

type InputLines = Lines<BufReader<Stdin>>;

async fn prompt(lines: &mut InputLines, label: &str) -> anyhow::Result<Option<String>> {
    print!("{label}: ");
    std::io::stdout().flush()?;
    Ok(lines.next_line().await?)
}

/// Reads the lead form until it validates. Returns `false` if stdin closed.
async fn collect_lead(handle: &ChatHandle, lines: &mut InputLines) -> anyhow::Result<bool> {
    println!("Preencha seus dados para iniciar o chat.");
    loop {
        let mut fields = Vec::with_capacity(5);
        for label in [
            "Nome",
            "Empresa (opcional)",
            "E-mail",
            "Telefone",
            "Mensagem (opcional)",
        ] {
            match prompt(lines, label).await? {
                Some(value) => fields.push(value),
                None => return Ok(false),
            }
        }
        let optional = |value: &str| Some(value.to_string()).filter(|v| !v.trim().is_empty());
        let lead = LeadInfo {
            name: fields[0].clone(),
            company: optional(&fields[1]),
            email: fields[2].clone(),
            phone: fields[3].clone(),
            message: optional(&fields[4]),
        };

        match handle.submit_lead(lead).await {
            Ok(()) => return Ok(true),
            Err(RuntimeError::Session(SessionError::InvalidLead(errors))) => {
                for field in errors.fields() {
                    if let Some(reason) = errors.get(field) {
                        println!("  {field}: {reason}");
                    }
                }
            }
            Err(e) => return Err(e).context("Failed to submit lead"),
        }
    }
}

/// Relays commands until the chat ends or stdin closes.
async fn chat_loop(handle: &ChatHandle, lines: &mut InputLines) -> anyhow::Result<()> {
    while let Some(line) = lines.next_line().await? {
        let command = match parse_line(&line) {
            None => continue,
            Some(Ok(command)) => command,
            Some(Err(e)) => {
                println!("{e}");
                continue;
            }
        };

        let result = match command {
            Command::Text(text) => handle.send_text(text).await,
            Command::StartRecording => handle.start_recording().await,
            Command::StopRecording => handle.stop_recording().await,
            Command::CancelRecording => handle.cancel_recording().await,
            Command::End { rating, comment } => match handle.end_session(rating, comment).await {
                Ok(_) => return Ok(()),
                Err(e) => Err(e),
            },
            Command::Help => {
                println!("{HELP}");
                Ok(())
            }
            Command::Quit => return Ok(()),
        };

        match result {
            Ok(()) => {}
            // device problems are already shown through events
            Err(RuntimeError::Session(SessionError::Device(_))) => {}
            Err(RuntimeError::Session(e)) => println!("{e}"),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    // --- 3. Build the Session ---
    let webhook: Arc<dyn Webhook> = match args.webhook_url.or(config.webhook_url.clone()) {
        Some(url) => {
            info!(%url, transport = ?config.audio_transport, "Using HTTP webhook");
            Arc::new(HttpWebhook::new(url, config.audio_transport))
        }
        None => {
            warn!("No webhook URL configured, replies will be simulated");
            Arc::new(OfflineWebhook::default())
        }
    };

    let mut session = ChatSession::new(config.chat_config());
    if let Some(path) = args.audio_file {
        info!(path = %path.display(), "Recording from audio file");
        session = session.with_capture(Box::new(FileCapture::new(path)));
    }

    let (handle, mut events, runtime) = ChatRuntime::spawn(session, webhook);
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Some(line) = render_event(&event) {
                println!("{line}");
            }
        }
    });

    // --- 4. Run the Chat ---
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let outcome = match collect_lead(&handle, &mut lines).await {
        Ok(true) => chat_loop(&handle, &mut lines).await,
        Ok(false) => Ok(()),
        Err(e) => Err(e),
    };

    // The runtime may already be gone if it failed; nothing left to stop then.
    let _ = handle.shutdown().await;
    runtime.await.context("Chat runtime panicked")?;
    printer.await.context("Event printer panicked")?;
    outcome
}
