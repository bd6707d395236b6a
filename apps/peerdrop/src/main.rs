//! peerdrop terminal client entry point.

mod app;
mod config;
mod render;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::app::Mode;

/// Peer-to-peer chat and resumable file transfer with copy/paste signaling.
#[derive(Parser)]
#[command(name = "peerdrop", version, about, long_about = None)]
struct Cli {
    /// Configuration file to use instead of the platform default.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Name announced to the remote peer.
    #[arg(short, long, global = true)]
    username: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Listen and print a connection description for the other peer
    Offer {
        /// Address to listen on
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Address to publish in the description
        #[arg(long)]
        advertise: Option<SocketAddr>,
    },

    /// Connect using a description pasted from the offering peer
    Answer {
        /// The connection description
        description: String,
    },

    /// List partial transfers that can be resumed
    Pending,
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they do not interleave with the chat on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting peerdrop");

    let cli = Cli::parse();

    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(username) = cli.username {
        config.username = username;
    }

    let mode = match cli.command {
        Command::Offer { bind, advertise } => {
            if let Some(bind) = bind {
                config.bind_address = bind;
            }
            if advertise.is_some() {
                config.advertise_address = advertise;
            }
            Mode::Offer
        }
        Command::Answer { description } => Mode::Answer(description),
        Command::Pending => Mode::Pending,
    };
    tracing::info!(username = %config.username, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config, mode))?;

    tracing::info!("peerdrop shut down cleanly");
    Ok(())
}
