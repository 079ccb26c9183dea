use std::io::{self, BufRead, Read};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use pc_core::{paths, ContentKind, CoreConfig, SecureMessenger, StoredMessage};
use pc_proto::Reassembler;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "pc_cli=info,pc_core=info,pc_store=info,pc_proto=info";

#[derive(Parser)]
#[command(name = "pc-cli")]
#[command(about = "Inspect and manage the local encrypted message history", long_about = None)]
struct Cli {
    /// Config file (JSON).  Defaults to the platform config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, overriding config and PC_DATA_DIR
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Local user handle, overriding config
    #[arg(long, global = true)]
    handle: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print this process' public key and fingerprint
    Pubkey,

    /// Append a text message to a conversation
    Store {
        #[arg(long)]
        peer: String,
        /// Record as received from the peer instead of sent
        #[arg(long)]
        incoming: bool,
        text: String,
    },

    /// Show a page of history, newest first
    History {
        #[arg(long)]
        peer: String,
        #[arg(long, default_value = "0")]
        page: usize,
        #[arg(long, default_value = "50")]
        size: usize,
    },

    /// Number of stored messages with a peer
    Count {
        #[arg(long)]
        peer: String,
    },

    /// Delete one message by id
    Delete {
        #[arg(long)]
        peer: String,
        id: String,
    },

    /// Delete a whole conversation
    Clear {
        #[arg(long)]
        peer: String,
    },

    /// List peers with stored history
    Conversations,

    /// Frame stdin for the transport, one frame per line
    Split,

    /// Read frames (one per line) from stdin and print completed payloads
    Reassemble,
}

fn load_config(cli: &Cli) -> Result<CoreConfig> {
    let mut config = match &cli.config {
        Some(path) => CoreConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            let default_path = paths::default_config_path()?;
            if default_path.exists() {
                CoreConfig::load(&default_path)
                    .with_context(|| format!("loading config {}", default_path.display()))?
            } else {
                CoreConfig::new("local")
            }
        }
    };
    if let Some(handle) = &cli.handle {
        config.local_handle = handle.clone();
    }
    config.validate()?;
    Ok(config)
}

fn open_messenger(cli: &Cli, config: CoreConfig) -> Result<SecureMessenger> {
    let messenger = match &cli.data_dir {
        Some(dir) => SecureMessenger::open(config, dir)?,
        None => SecureMessenger::from_config(config)?,
    };
    Ok(messenger)
}

fn print_messages(messages: &[StoredMessage]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(messages)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    info!(handle = %config.local_handle, "pc-cli starting");

    match &cli.command {
        Commands::Pubkey => {
            let messenger = open_messenger(&cli, config)?;
            let key = messenger.public_key();
            println!("{}", key.to_b64());
            println!("fingerprint: {}", key.fingerprint());
        }

        Commands::Store {
            peer,
            incoming,
            text,
        } => {
            let messenger = open_messenger(&cli, config)?;
            let local = messenger.local_handle();
            let message = if *incoming {
                StoredMessage::new_incoming(peer, local, text.clone(), ContentKind::Text)
            } else {
                StoredMessage::new_outgoing(local, peer, text.clone(), ContentKind::Text)
            };
            let path = messenger.store().store_message(peer, &message)?;
            info!(peer = %peer, message_id = %message.id, incoming = *incoming, "stored message");
            println!("{} -> {}", message.id, path.display());
        }

        Commands::History { peer, page, size } => {
            let messenger = open_messenger(&cli, config)?;
            print_messages(&messenger.store().load_messages(peer, *page, *size)?)?;
        }

        Commands::Count { peer } => {
            let messenger = open_messenger(&cli, config)?;
            println!("{}", messenger.store().get_message_count(peer)?);
        }

        Commands::Delete { peer, id } => {
            let messenger = open_messenger(&cli, config)?;
            if !messenger.store().delete_message(peer, id)? {
                warn!(peer = %peer, message_id = %id, "delete found nothing");
                return Err(anyhow!("no message {id} with {peer}"));
            }
            info!(peer = %peer, message_id = %id, "deleted message");
            println!("deleted {id}");
        }

        Commands::Clear { peer } => {
            let messenger = open_messenger(&cli, config)?;
            let removed = messenger.store().clear_messages(peer)?;
            info!(peer = %peer, removed, "cleared conversation");
            println!("removed {removed} message(s)");
        }

        Commands::Conversations => {
            let messenger = open_messenger(&cli, config)?;
            for peer in messenger.store().list_conversations()? {
                println!("{peer}");
            }
        }

        Commands::Split => {
            let mut input = String::new();
            io::stdin().read_to_string(&mut input)?;
            let reassembler = Reassembler::new(config.chunking);
            let frames = reassembler.split_message(input.trim_end_matches('\n'))?;
            info!(bytes = input.len(), frames = frames.len(), "split input");
            for frame in frames {
                println!("{frame}");
            }
        }

        Commands::Reassemble => {
            let reassembler = Reassembler::new(config.chunking);
            for line in io::stdin().lock().lines() {
                if let Some(payload) = reassembler.process_received_message(&line?) {
                    println!("{payload}");
                }
            }
            let pending = reassembler.pending_count();
            if pending > 0 {
                return Err(anyhow!("{pending} message(s) still incomplete"));
            }
        }
    }

    Ok(())
}
