//! Application orchestrator: connects, then runs the chat loop.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use peerdrop_data_channel::{ChannelListener, ConnectionDescription, DataChannel, client};
use peerdrop_peer::{Peer, PeerEvent};
use peerdrop_transfer::{ResumeStore, format_size};

use crate::config::Config;
use crate::render::Renderer;

const HELP: &str = "\
commands:
  /file <path>   select a file to send
  /clear         clear the selection
  /send          send the selected file
  /pending       list partial transfers that can be resumed
  /quit          disconnect and exit
anything else is sent as a chat message";

/// How to obtain the data channel.
pub enum Mode {
    Offer,
    Answer(String),
    Pending,
}

/// Runs the client until the user quits or the peer disconnects.
pub async fn run(config: Config, mode: Mode) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    let channel = match mode {
        Mode::Pending => return list_pending(&config.resume_dir).await,
        Mode::Offer => offer(&config, cancel.clone()).await?,
        Mode::Answer(text) => {
            let description = ConnectionDescription::decode(&text)?;
            println!("connecting to {}...", description.address);
            client::connect(&description, cancel.clone()).await?
        }
    };

    let (peer, events) = Peer::start(channel, config.peer_config()).await?;
    tracing::info!(resume_dir = %config.resume_dir.display(), "session ready");

    chat_loop(&peer, events, &config.resume_dir).await;

    peer.disconnect();
    cancel.cancel();
    Ok(())
}

async fn offer(config: &Config, cancel: CancellationToken) -> anyhow::Result<DataChannel> {
    let listener =
        ChannelListener::bind(config.bind_address, config.advertise_address, cancel.clone())
            .await?;

    println!("Send this connection description to your peer:\n");
    println!("{}\n", listener.description().encode());
    println!("waiting for the peer to connect...");

    tokio::select! {
        result = listener.accept() => Ok(result?),
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            anyhow::bail!("interrupted while waiting for the peer")
        }
    }
}

async fn list_pending(dir: &Path) -> anyhow::Result<()> {
    for line in pending_lines(dir).await? {
        println!("{line}");
    }
    Ok(())
}

/// One line per partial transfer in `dir`.
async fn pending_lines(dir: &Path) -> anyhow::Result<Vec<String>> {
    let store = ResumeStore::open(dir).await?;
    let names = store.pending_transfers().await?;
    if names.is_empty() {
        return Ok(vec![format!("no partial transfers in {}", dir.display())]);
    }
    let mut lines = Vec::with_capacity(names.len());
    for name in names {
        match store.read_existing(&name).await {
            Ok(Some(existing)) => lines.push(format!(
                "{name}: {} of {} chunks ({} of {})",
                existing.recovered_count(),
                existing.manifest.chunk_count(),
                format_size(existing.recovered_bytes),
                format_size(existing.manifest.total_size)
            )),
            Ok(None) => {}
            Err(e) => lines.push(format!("{name}: unreadable ({e})")),
        }
    }
    Ok(lines)
}

async fn chat_loop(peer: &Arc<Peer>, mut events: mpsc::Receiver<PeerEvent>, resume_dir: &Path) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut renderer = Renderer::default();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let disconnected = event == PeerEvent::Disconnected;
                if let Some(line) = renderer.render(&event) {
                    println!("{line}");
                }
                if disconnected {
                    break;
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !handle_line(peer, line.trim_end(), resume_dir).await {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read stdin");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("SIGINT received, shutting down");
                break;
            }
        }
    }
}

/// Handles one line of user input. Returns `false` to quit.
async fn handle_line(peer: &Arc<Peer>, line: &str, resume_dir: &Path) -> bool {
    let (command, arg) = match line.split_once(' ') {
        Some((c, a)) => (c, a.trim()),
        None => (line, ""),
    };

    match command {
        "/quit" | "/exit" => return false,
        "/help" => println!("{HELP}"),
        "/file" if arg.is_empty() => println!("usage: /file <path>"),
        "/file" => match peer.select_file(Path::new(arg)).await {
            Ok(size) => println!("selected {arg} ({})", format_size(size)),
            Err(e) => println!("cannot select {arg}: {e}"),
        },
        "/clear" => {
            peer.clear_selection();
            println!("selection cleared");
        }
        "/send" => {
            if let Err(e) = peer.send_selected() {
                println!("cannot send: {e}");
            }
        }
        "/pending" => {
            if let Err(e) = list_pending(resume_dir).await {
                println!("cannot list partial transfers: {e:#}");
            }
        }
        _ => {
            if let Err(e) = peer.send_chat(line).await {
                println!("message not sent: {e}");
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerdrop_protocol::Manifest;

    #[tokio::test]
    async fn pending_lines_reports_empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let lines = pending_lines(tmp.path()).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("no partial transfers"));
    }

    #[tokio::test]
    async fn pending_lines_lists_recovered_chunks() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ResumeStore::open(tmp.path()).await.unwrap();
        let manifest = Manifest::plan("a.bin", 10, 4).unwrap();
        store.write_manifest(&manifest).await.unwrap();
        store.write_chunk("a.bin", 0, b"0123").await.unwrap();
        store.finalize("done.bin", b"whole").await.unwrap();

        let lines = pending_lines(tmp.path()).await.unwrap();
        assert_eq!(lines, vec!["a.bin: 1 of 3 chunks (4.0 B of 10.0 B)".to_string()]);
    }
}
