//! Process-wide error taxonomy.
//!
//! Each subsystem owns a narrower error enum (see [`crate::control::ControlError`],
//! [`crate::port_pool::PortPoolError`], [`crate::worker::WorkerError`]); this
//! module only carries the startup-fatal configuration error, since it has no
//! natural subsystem home.

use thiserror::Error;

/// Errors that abort the process before it starts serving traffic.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Cli(String),

    #[error("invalid PORT_RANGE {0:?}: expected MIN-MAX")]
    BadPortRange(String),

    #[error("invalid address {0:?}: {1}")]
    BadAddr(String, String),

    #[error("invalid SERVICE_PORT {0:?}")]
    BadServicePort(String),

    #[error("invalid value {0:?} for {1}")]
    BadEnumVar(String, &'static str),
}
