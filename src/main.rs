use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use loqa_voice::config::DEFAULT_CONFIG_PATH;
use loqa_voice::turn::{Role, StartOutcome};
use loqa_voice::{
    create_router, AppState, AudioDevice, Collaborators, Config, CpalMicrophone, CpalSpeaker,
    FileMicrophone, InMemoryConversationLog, OpenAiClient, PlaybackGate, TurnController,
    TurnState,
};

/// Loqa Voice - push-to-talk voice chat with an assistant
#[derive(Parser)]
#[command(name = "loqa-voice", version, about)]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control API for a host UI
    Serve,
    /// Talk from the terminal: Enter starts listening, Enter again stops
    Talk {
        /// Replay a WAV file instead of using the microphone
        #[arg(short, long)]
        input_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Loqa Voice v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Command::Serve => serve(&cfg).await,
        Command::Talk { input_file } => talk(&cfg, input_file).await,
    }
}

fn build_controller(cfg: &Config, input_file: Option<PathBuf>) -> Result<TurnController> {
    let frame_duration = Duration::from_millis(cfg.audio.fragment_interval_ms);

    let device: Arc<dyn AudioDevice> = match input_file.or_else(|| cfg.audio.input_file.clone()) {
        Some(path) => {
            info!("Using audio file {} as microphone", path.display());
            Arc::new(FileMicrophone::new(path, frame_duration))
        }
        None => Arc::new(CpalMicrophone::new()),
    };

    let client = Arc::new(OpenAiClient::new(cfg.openai.clone())?);
    let collaborators = Collaborators {
        transcriber: client.clone(),
        assistant: client.clone(),
        synthesizer: client,
        log: Arc::new(InMemoryConversationLog::new()),
    };

    let playback = Arc::new(PlaybackGate::new(Arc::new(CpalSpeaker::new())));

    Ok(TurnController::new(
        device,
        collaborators,
        playback,
        cfg.turn_config(),
    ))
}

async fn serve(cfg: &Config) -> Result<()> {
    let controller = build_controller(cfg, None)?;
    let app = create_router(AppState::new(controller));

    let addr = cfg.http_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}

async fn talk(cfg: &Config, input_file: Option<PathBuf>) -> Result<()> {
    let controller = build_controller(cfg, input_file)?;

    // Print every state change, and the turn's outcome once back at Idle
    let mut states = controller.subscribe();
    let observer = controller.clone();
    tokio::spawn(async move {
        let mut shown = 0;
        while let Ok(state) = states.recv().await {
            println!("[{}]", state.label());
            if state != TurnState::Idle {
                continue;
            }

            let turns = observer.conversation();
            for turn in turns.iter().skip(shown) {
                let who = match turn.role {
                    Role::User => "you",
                    Role::Assistant => "assistant",
                };
                println!("{}: {}", who, turn.content);
            }
            shown = turns.len();

            if let Some(notice) = observer.notice() {
                println!("! {}", notice.message);
                observer.clear_notice();
            }
        }
    });

    println!("Press Enter to talk, Enter again to stop. Ctrl-D quits.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while lines.next_line().await?.is_some() {
        match controller.state() {
            TurnState::Idle => {
                if let StartOutcome::Failed(kind) = controller.start().await {
                    println!("! {}", kind.message());
                    controller.clear_notice();
                }
            }
            TurnState::Listening => {
                controller.stop();
            }
            other => println!("Busy ({}), try again shortly", other.label()),
        }
    }

    controller.stop();
    controller.wait_until_idle().await;
    Ok(())
}
