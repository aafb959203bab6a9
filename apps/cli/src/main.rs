use std::{
    fs,
    path::PathBuf,
    sync::{
        atomic::{AtomicI32, AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    load_settings_from, ClientEvent, MessageClient, MessageCodec, MissingNetworkSession,
    NetworkSession, NoopSyncBarrier,
};
use highway::HighwayUploader;
use shared::{
    domain::{BotId, BotProfile, Contact, GroupId, SequenceId},
    message::{Flag, ForwardNode, MessageChain, MessageElement},
    protocol::{ConfirmationEvent, IncomingMessage, OutgoingPacket, SendResponse, ServerEvent},
    wire::WireElement,
};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "client.toml")]
    settings: PathBuf,
    #[arg(long, default_value_t = 10_000)]
    bot_id: i64,
    #[arg(long, default_value = "bot")]
    bot_nick: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ContactArg {
    Friend,
    Group,
    Temp,
    Stranger,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sends a text message to an in-process loopback server.
    Send {
        #[arg(value_enum)]
        kind: ContactArg,
        id: i64,
        text: String,
        #[arg(long, default_value_t = 0)]
        via_group: i64,
        #[arg(long)]
        mention_all: bool,
        #[arg(long)]
        force_long: bool,
        /// Answer "too large" to messages estimated above this many bytes.
        #[arg(long)]
        max_inline_bytes: Option<usize>,
        /// Reject every message with this server policy code.
        #[arg(long)]
        policy_code: Option<i32>,
    },
    /// Decodes an inbound message stored as JSON and prints the chain.
    Decode { path: PathBuf },
}

/// Accepts packets in memory and confirms them on the server event stream.
struct LoopbackServer {
    bot: BotId,
    events: broadcast::Sender<ServerEvent>,
    next_sequence: AtomicI32,
    max_inline_bytes: Option<usize>,
    policy_code: Option<i32>,
}

#[async_trait]
impl NetworkSession for LoopbackServer {
    async fn send_and_await(&self, packet: OutgoingPacket) -> Result<SendResponse> {
        if let Some(code) = self.policy_code {
            return Ok(SendResponse::PolicyRejected(code));
        }
        let size: usize = match &packet {
            OutgoingPacket::Message { elements, .. } => {
                elements.iter().map(WireElement::estimated_size).sum()
            }
            OutgoingPacket::MusicShare { .. } | OutgoingPacket::FileFeed { .. } => 0,
        };
        if self.max_inline_bytes.is_some_and(|max| size > max) {
            info!(size, "loopback: replying too large");
            return Ok(SendResponse::TooLarge);
        }

        let sequence_id = SequenceId(self.next_sequence.fetch_add(1, Ordering::SeqCst));
        info!(
            internal_id = packet.internal_id().0,
            sequence_id = sequence_id.0,
            size,
            "loopback: packet accepted"
        );
        let _ = self.events.send(ServerEvent::SendConfirmed(ConfirmationEvent {
            issuer: self.bot,
            internal_id: packet.internal_id(),
            sequence_id,
        }));
        Ok(SendResponse::Success)
    }
}

#[derive(Default)]
struct LoopbackHighway {
    uploads: AtomicUsize,
}

#[async_trait]
impl HighwayUploader for LoopbackHighway {
    async fn upload(&self, target: &Contact, nodes: &[ForwardNode], is_long: bool) -> Result<String> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        info!(contact = %target, nodes = nodes.len(), is_long, "loopback: upload stored");
        Ok(format!("loopback-{n}"))
    }
}

fn contact(kind: ContactArg, id: i64, via_group: i64) -> Contact {
    match kind {
        ContactArg::Friend => Contact::friend(id),
        ContactArg::Group => Contact::group(id),
        ContactArg::Temp => Contact::group_temp(id, GroupId(via_group)),
        ContactArg::Stranger => Contact::stranger(id),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();
    let settings = load_settings_from(&cli.settings)?;
    let bot = BotProfile::new(cli.bot_id, cli.bot_nick);

    match cli.command {
        Command::Send {
            kind,
            id,
            text,
            via_group,
            mention_all,
            force_long,
            max_inline_bytes,
            policy_code,
        } => {
            let (events, pump) = broadcast::channel(64);
            let server = Arc::new(LoopbackServer {
                bot: bot.id,
                events,
                next_sequence: AtomicI32::new(1),
                max_inline_bytes,
                policy_code,
            });
            let client = MessageClient::new_with_dependencies(
                bot,
                settings,
                MessageCodec::global(),
                server,
                Arc::new(LoopbackHighway::default()),
                Arc::new(NoopSyncBarrier),
            );
            client.spawn_event_pump(pump);

            let mut chain = MessageChain::builder();
            if mention_all {
                chain = chain.element(MessageElement::MentionAll).text(" ");
            }
            chain = chain.text(text);
            if force_long {
                chain = chain.flag(Flag::ForceAsLongMessage);
            }

            let receipt = client
                .send(&contact(kind, id, via_group), chain.build())
                .await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
        Command::Decode { path } => {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            let incoming: IncomingMessage = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse '{}'", path.display()))?;
            let client = MessageClient::new(bot, settings, Arc::new(MissingNetworkSession));
            let mut events = client.subscribe_events();
            client.handle_server_event(ServerEvent::MessageReceived(incoming))?;
            if let Ok(ClientEvent::MessageDecoded(chain)) = events.try_recv() {
                println!("{}", serde_json::to_string_pretty(&chain)?);
            }
        }
    }

    Ok(())
}
