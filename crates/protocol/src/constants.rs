use std::time::Duration;

/// Size of one transfer chunk in bytes (16 KiB).
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Largest file accepted for sending (100 MiB).
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Default number of unacknowledged chunks a sender keeps in flight.
///
/// Zero disables acknowledgements entirely (plain push).
pub const DEFAULT_ACK_WINDOW: usize = 8;

/// How long a sender waits for a `chunk-ack` or `resume-state` reply.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Suffix of the persisted manifest artifact (`<fileName>.manifest`).
pub const MANIFEST_SUFFIX: &str = ".manifest";

/// Infix of persisted chunk artifacts (`<fileName>.chunk.<index>`).
pub const CHUNK_INFIX: &str = ".chunk.";
