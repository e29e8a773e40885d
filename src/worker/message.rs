//! Messages flowing between a worker's reader and processor tasks.

use bytes::Bytes;
use std::net::SocketAddr;
use tokio::time::Instant;

/// Where a datagram was classified as having come from, by source-address
/// equality with the engine's peer IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketSource {
    Engine,
    Echo,
}

/// A single datagram handed from the reader task to the processor task.
#[derive(Debug)]
pub struct InboundDatagram {
    pub data: Bytes,
    pub arrival: Instant,
    pub source: PacketSource,
    pub peer_addr: SocketAddr,
}

impl InboundDatagram {
    pub fn from_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}
