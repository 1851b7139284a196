// Talk to the agent through the default microphone and speakers
//
//   GEMINI_API_KEY=... cargo run --example live_call -- --config config/live-voice
//
// Ctrl-C hangs up.

use anyhow::Result;
use clap::Parser;
use live_voice::{Config, ConnectionState, Conversation, Role};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "live_call", about = "Duplex voice call with a live agent")]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the agent voice
    #[arg(long)]
    voice: Option<String>,

    /// Input device name
    #[arg(long)]
    input: Option<String>,

    /// Output device name
    #[arg(long)]
    output: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("live_voice=info")),
        )
        .init();

    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(voice) = args.voice {
        cfg.agent.voice = voice;
    }
    if let Some(input) = args.input {
        cfg.audio.input_device = input;
    }
    if let Some(output) = args.output {
        cfg.audio.output_device = output;
    }

    info!("Agent: {} (voice {})", cfg.agent.model, cfg.agent.voice);

    let conversation = Conversation::with_defaults(cfg);

    let mut states = conversation.subscribe_state();
    let mut messages = conversation.subscribe_messages();
    let mut printed = 0;

    conversation.connect().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Hanging up");
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                info!("Call is {}", state);
                match state {
                    ConnectionState::Disconnected => break,
                    ConnectionState::Error => {
                        warn!("Call failed");
                        break;
                    }
                    _ => {}
                }
            }
            changed = messages.changed() => {
                if changed.is_err() {
                    break;
                }
                let transcript = messages.borrow_and_update().clone();
                for message in transcript.iter().skip(printed) {
                    let speaker = match message.role {
                        Role::User => "you",
                        Role::Agent => "agent",
                    };
                    println!("[{}] {}: {}", message.timestamp.format("%H:%M:%S"), speaker, message.text);
                }
                printed = transcript.len();
            }
        }
    }

    conversation.disconnect().await;

    if let Some(stats) = conversation.stats().await {
        info!(
            "Call {}: {} frames sent ({} dropped), {} chunks played, {} dropped, {} interruptions, {} turns",
            stats.call_id,
            stats.frames_sent,
            stats.frames_dropped,
            stats.chunks_played,
            stats.chunks_dropped,
            stats.interruptions,
            stats.turns
        );
    }

    Ok(())
}
