use anyhow::{Context, Result};
use crabchat_core::app::event::AppEvent;
use crabchat_core::app::handler;
use crabchat_core::app::state::AppState;
use crabchat_core::config;
use crabchat_core::irc::connection::ConnectionEvent;
use crabchat_core::logging::ChatLogger;
use crabchat_core::session::SessionNotification;
use futures::StreamExt;
use std::io::Write;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SHUTDOWN_GRACE: Duration = Duration::from_millis(300);

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr; stdout carries the conversation.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crabchat_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load_config().context("Failed to load configuration")?;
    run_app(cfg).await
}

async fn run_app(cfg: config::AppConfig) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (conn_tx, mut conn_rx) = mpsc::unbounded_channel::<ConnectionEvent>();
    let (notify_tx, mut notify_rx) = mpsc::unbounded_channel::<SessionNotification>();

    let mut state = AppState::new(cfg.clone(), notify_tx, conn_tx);
    let mut chat_logger = ChatLogger::new(&cfg.logging);

    // Spawn input task
    let input_tx = event_tx.clone();
    tokio::spawn(async move {
        let mut lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => {
                    if input_tx.send(AppEvent::Input(line)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
        let _ = input_tx.send(AppEvent::InputClosed);
    });

    // Socket tasks report on their own channel; fold them into the app loop.
    let conn_forward = event_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = conn_rx.recv().await {
            if conn_forward.send(AppEvent::Connection(event)).is_err() {
                break;
            }
        }
    });
    drop(event_tx);

    print_welcome(&cfg);

    // Auto-connect servers from config
    for server in cfg.servers.iter().filter(|s| s.auto_connect) {
        let outcome = state.manager.connect_with(
            server.address(),
            cfg.server_identity(server),
            cfg.session_options(Some(server)),
        );
        state.activate(outcome.id(), "");
    }
    flush(&mut state, &mut notify_rx, &mut chat_logger)?;

    // Main event loop
    while let Some(event) = event_rx.recv().await {
        handler::handle_event(&mut state, event);
        flush(&mut state, &mut notify_rx, &mut chat_logger)?;
        if state.should_quit {
            break;
        }
    }

    // Give writer tasks a moment to flush queued QUITs.
    tokio::time::sleep(SHUTDOWN_GRACE).await;
    info!("shutting down");
    Ok(())
}

/// Apply pending notifications and print everything queued for output.
fn flush(
    state: &mut AppState,
    notify_rx: &mut mpsc::UnboundedReceiver<SessionNotification>,
    chat_logger: &mut ChatLogger,
) -> Result<()> {
    while let Ok(note) = notify_rx.try_recv() {
        chat_logger.observe(&note);
        handler::apply_notification(state, &note);
    }
    let mut stdout = std::io::stdout().lock();
    for line in state.take_output() {
        writeln!(stdout, "{}", line).context("Failed to write to stdout")?;
    }
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}

fn print_welcome(cfg: &config::AppConfig) {
    println!("Welcome to CrabChat! You are {}.", cfg.identity.nickname);
    println!("Saved servers:");
    for server in &cfg.servers {
        println!("  {}  ({}:{})", server.name, server.host, server.port);
    }
    println!("Connect with /connect <name|host[:port]>, /help lists commands.");
}
