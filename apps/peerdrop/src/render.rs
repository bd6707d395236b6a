//! Turns peer events into terminal lines.

use peerdrop_peer::PeerEvent;
use peerdrop_transfer::{
    Artifact, ReceiveEvent, SpeedCalculator, TransferProgress, format_size,
};

/// Throttled progress line for one direction.
#[derive(Default)]
struct ProgressLine {
    speed: SpeedCalculator,
    last_bytes: u64,
    last_percent: Option<u8>,
}

impl ProgressLine {
    fn reset(&mut self) {
        self.speed.reset();
        self.last_bytes = 0;
        self.last_percent = None;
    }

    /// Returns a line only when the rounded percentage changes.
    fn update(&mut self, verb: &str, p: &TransferProgress) -> Option<String> {
        if p.transferred < self.last_bytes {
            self.reset();
        }
        // Bytes already held when a transfer (re)starts are not throughput.
        let delta = if self.last_percent.is_none() {
            0
        } else {
            p.transferred - self.last_bytes
        };
        self.last_bytes = p.transferred;
        self.speed.add_sample(delta);

        let percent = p.percent();
        if self.last_percent == Some(percent) {
            return None;
        }
        self.last_percent = Some(percent);

        let mut line = format!(
            "{verb} {}: {percent}% ({} / {})",
            p.file_name,
            format_size(p.transferred),
            format_size(p.total)
        );
        let rate = self.speed.bytes_per_second();
        if rate > 0.0 {
            line.push_str(&format!(", {}/s", format_size(rate as u64)));
            if let Some(eta) = self.speed.eta(p.total.saturating_sub(p.transferred)) {
                line.push_str(&format!(", {}s left", eta.as_secs()));
            }
        }
        Some(line)
    }
}

/// Stateful event renderer.
#[derive(Default)]
pub struct Renderer {
    sending: ProgressLine,
    receiving: ProgressLine,
}

impl Renderer {
    pub fn render(&mut self, event: &PeerEvent) -> Option<String> {
        match event {
            PeerEvent::Connected => Some("connected. Type /help for commands.".into()),
            PeerEvent::RemoteUsername(name) => Some(format!("peer is {name}")),
            PeerEvent::Chat { from, text } => Some(format!("<{from}> {text}")),
            PeerEvent::Receive(event) => self.render_receive(event),
            PeerEvent::SendProgress(p) => self.sending.update("sending", p),
            PeerEvent::SendCompleted(report) => {
                self.sending.reset();
                let mut line = format!(
                    "sent {} ({})",
                    report.file_name,
                    format_size(report.total_size)
                );
                if report.chunks_skipped > 0 {
                    line.push_str(&format!(
                        ", resumed: {} of {} chunks were already there",
                        report.chunks_skipped,
                        report.chunks_skipped + report.chunks_sent
                    ));
                }
                Some(line)
            }
            PeerEvent::SendFailed { file_name, error } => {
                self.sending.reset();
                Some(format!("sending {file_name} failed: {error}"))
            }
            PeerEvent::Disconnected => Some("peer disconnected".into()),
        }
    }

    fn render_receive(&mut self, event: &ReceiveEvent) -> Option<String> {
        match event {
            ReceiveEvent::Started {
                file_name,
                total_size,
                resumed_chunks,
                resumed_bytes,
            } => {
                self.receiving.reset();
                let mut line = format!("receiving {file_name} ({})", format_size(*total_size));
                if *resumed_chunks > 0 {
                    line.push_str(&format!(
                        ", resuming with {resumed_chunks} chunks ({}) on disk",
                        format_size(*resumed_bytes)
                    ));
                }
                Some(line)
            }
            ReceiveEvent::Progress(p) => self.receiving.update("receiving", p),
            ReceiveEvent::Completed(file) => {
                self.receiving.reset();
                Some(match &file.artifact {
                    Artifact::Saved(path) => format!(
                        "received {} ({}), saved to {}",
                        file.file_name,
                        format_size(file.size),
                        path.display()
                    ),
                    Artifact::InMemory(_) => {
                        format!("received {} ({})", file.file_name, format_size(file.size))
                    }
                })
            }
            ReceiveEvent::Paused { file_name, reason } => Some(format!(
                "transfer of {file_name} paused: {reason}. It can be resumed later."
            )),
            ReceiveEvent::Failed { file_name, reason } => {
                self.receiving.reset();
                Some(format!("receiving {file_name} failed: {reason}"))
            }
            // Already logged by the receiver.
            ReceiveEvent::Dropped { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerdrop_transfer::SendReport;

    fn progress(transferred: u64, total: u64) -> TransferProgress {
        TransferProgress {
            file_name: "a.bin".into(),
            transferred,
            total,
        }
    }

    #[test]
    fn chat_line() {
        let mut r = Renderer::default();
        let line = r.render(&PeerEvent::Chat {
            from: "bob".into(),
            text: "hi".into(),
        });
        assert_eq!(line.as_deref(), Some("<bob> hi"));
    }

    #[test]
    fn progress_is_throttled_by_percent() {
        let mut r = Renderer::default();
        let first = r.render(&PeerEvent::SendProgress(progress(0, 2000)));
        assert_eq!(first.as_deref(), Some("sending a.bin: 0% (0.0 B / 2.0 KB)"));
        // 1 / 2000 still rounds to 0%.
        assert!(r.render(&PeerEvent::SendProgress(progress(1, 2000))).is_none());
        let half = r.render(&PeerEvent::SendProgress(progress(1000, 2000))).unwrap();
        assert!(half.starts_with("sending a.bin: 50% (1000.0 B / 2.0 KB)"));
    }

    #[test]
    fn resumed_start_mentions_chunks_on_disk() {
        let mut r = Renderer::default();
        let line = r
            .render(&PeerEvent::Receive(ReceiveEvent::Started {
                file_name: "big.bin".into(),
                total_size: 40_000,
                resumed_chunks: 1,
                resumed_bytes: 16_384,
            }))
            .unwrap();
        assert_eq!(
            line,
            "receiving big.bin (39.1 KB), resuming with 1 chunks (16.0 KB) on disk"
        );
    }

    #[test]
    fn send_report_mentions_skipped_chunks() {
        let mut r = Renderer::default();
        let line = r
            .render(&PeerEvent::SendCompleted(SendReport {
                file_name: "big.bin".into(),
                total_size: 40_000,
                chunks_sent: 2,
                chunks_skipped: 1,
            }))
            .unwrap();
        assert_eq!(
            line,
            "sent big.bin (39.1 KB), resumed: 1 of 3 chunks were already there"
        );
    }

    #[test]
    fn dropped_messages_are_not_printed() {
        let mut r = Renderer::default();
        assert!(
            r.render(&PeerEvent::Receive(ReceiveEvent::Dropped {
                reason: "x".into()
            }))
            .is_none()
        );
    }
}
