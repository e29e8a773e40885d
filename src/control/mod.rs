//! The engine control surface, treated as a capability interface
//! (spec.md §9 "Dynamic dispatch"): the worker and lifecycle manager depend
//! only on this trait, never on the concrete REST+WebSocket implementation,
//! so a fake client can stand in for tests.

pub mod error;
pub mod events;
pub mod model;
pub mod rest;

pub use error::{ControlError, ControlResult};
pub use model::LookupResult;

use async_trait::async_trait;
use std::net::SocketAddr;

/// Fixed media parameters for the mirror this system creates; see spec.md §4.2.
#[derive(Debug, Clone, Copy)]
pub struct MirrorSpec {
    pub codec: &'static str,
    pub transport: &'static str,
    pub encapsulation: &'static str,
    pub bidirectional: bool,
}

impl Default for MirrorSpec {
    fn default() -> Self {
        Self {
            codec: "ulaw",
            transport: "udp",
            encapsulation: "rtp",
            bidirectional: true,
        }
    }
}

#[async_trait]
pub trait ControlClient: Send + Sync {
    /// Marks the call active. Retries internally on `NotFound` per spec.md §4.2.
    async fn answer(&self, channel_id: &str) -> ControlResult<()>;

    /// Asks the engine to duplicate the channel's media to `sink`.
    async fn create_mirror(
        &self,
        channel_id: &str,
        sink: SocketAddr,
        spec: MirrorSpec,
    ) -> ControlResult<String>;

    async fn create_conference(&self) -> ControlResult<String>;

    async fn attach(&self, bridge_id: &str, channel_id: &str) -> ControlResult<()>;

    async fn hangup(&self, channel_id: &str) -> ControlResult<()>;

    async fn destroy_conference(&self, bridge_id: &str) -> ControlResult<()>;

    /// Used by the zombie scrubber; collapses transport failures into
    /// `TransportError` rather than propagating a `Result`, since the
    /// scrubber's only two reactions are "tear down" or "skip this round".
    async fn lookup(&self, channel_id: &str) -> LookupResult;

    /// A persistent, ordered stream of `CallBegin`/`CallEnd` events. The
    /// concrete implementation is responsible for transparent reconnection
    /// and a polling-based fallback if the stream is unavailable; see
    /// [`events`].
    fn events(&self) -> flume::Receiver<model::EngineEvent>;
}
