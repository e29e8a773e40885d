//! Worker-level error taxonomy. Per-packet parse/send failures are never
//! surfaced here; they are logged and counted in place. Only a dead socket
//! is fatal to the worker and surfaced to the lifecycle manager.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("udp socket for channel died: {0}")]
    SocketDied(#[source] std::io::Error),
}
