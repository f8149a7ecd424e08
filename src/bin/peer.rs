use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use roomcall::config::Config;
use roomcall::error::Error;
use roomcall::media::{DeviceInfo, RemoteTrack, SourceSelector, SyntheticMediaSource};
use roomcall::models::RoomToken;
use roomcall::peer::{ConnectionState, RtcBackend};
use roomcall::session::{self, SessionController, SessionObserver, SessionSettings};
use roomcall::signaling::WsTransport;

#[derive(Parser)]
#[command(name = "roomcall-peer")]
#[command(about = "Join a two-party room call from the terminal")]
struct Cli {
    /// Relay WebSocket endpoint
    #[arg(long, env = "RELAY_URL")]
    relay_url: Option<String>,

    /// Label shown to the other party
    #[arg(short, long)]
    label: String,

    /// Room to join (email-shaped)
    #[arg(short, long, conflicts_with = "random", required_unless_present = "random")]
    room: Option<String>,

    /// Let the relay pair us with a waiting peer
    #[arg(long)]
    random: bool,
}

/// Prints session callbacks to stdout
struct ConsoleObserver;

impl SessionObserver for ConsoleObserver {
    fn on_local_label_ready(&self, label: &str) {
        println!("* you are {}", label);
    }

    fn on_remote_label_changed(&self, label: Option<&str>) {
        match label {
            Some(label) => println!("* talking to {}", label),
            None => println!("* the other party is gone"),
        }
    }

    fn on_remote_stream_attached(&self, track: &RemoteTrack) {
        println!("* receiving {} ({})", track.kind(), track.id());
    }

    fn on_remote_stream_detached(&self) {
        println!("* remote media stopped");
    }

    fn on_chat_message(&self, text: &str) {
        println!("< {}", text);
    }

    fn on_room_full(&self) {
        println!("* the room is full, try again later or pick another room");
    }

    fn on_devices_enumerated(&self, devices: &[DeviceInfo]) {
        for device in devices {
            println!("  device {:?}: {} [{}]", device.kind, device.label, device.device_id);
        }
    }

    fn on_connection_state(&self, state: ConnectionState) {
        println!("* connection {}", state);
    }

    fn on_error(&self, error: &Error) {
        eprintln!("! {}", error);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    if let Some(room) = &cli.room {
        if !RoomToken::is_email_shaped(room) {
            anyhow::bail!("Please enter a valid room (name@domain.tld)");
        }
    }

    let relay_url = cli.relay_url.unwrap_or_else(|| config.relay_url.clone());
    let (tx, rx) = session::channel();
    let transport = WsTransport::connect(&relay_url, tx.clone())
        .await
        .with_context(|| format!("Failed to reach relay at {}", relay_url))?;
    let backend = RtcBackend::new(&config).context("Failed to set up WebRTC")?;

    let (controller, handle) = SessionController::new(
        SessionSettings::from_config(&cli.label, &config),
        Arc::new(backend),
        Arc::new(transport),
        Arc::new(SyntheticMediaSource::new()),
        Arc::new(ConsoleObserver),
        (tx, rx),
    );
    let session_task = tokio::spawn(controller.run());

    match cli.room {
        Some(room) => handle.join(room)?,
        None => handle.join_random()?,
    }
    println!("* type to chat; /mic /cam /screen /camera <id> /audio <id> /leave /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let mut parts = line.splitn(2, ' ');
        match (parts.next(), parts.next()) {
            (Some(""), _) => continue,
            (Some("/mic"), _) => handle.toggle_mic()?,
            (Some("/cam"), _) => handle.toggle_camera()?,
            (Some("/screen"), _) => handle.switch_source(SourceSelector::Screen)?,
            (Some("/camera"), Some(id)) => handle.switch_source(SourceSelector::Camera(id.into()))?,
            (Some("/audio"), Some(id)) => {
                handle.switch_source(SourceSelector::Microphone(id.into()))?
            }
            (Some("/leave"), _) => handle.leave()?,
            (Some("/quit"), _) => break,
            _ => {
                handle.send_chat(line)?;
                println!("> {}", line);
            }
        }
    }

    handle.shutdown()?;
    session_task.await?;
    Ok(())
}
