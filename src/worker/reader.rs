//! Reader task: receives datagrams with a short deadline (to remain
//! cancellation-responsive), classifies their source, and pushes them onto
//! the bounded queue shared with the processor task. Preferring to drop a
//! datagram over buffering it unboundedly trades loss for latency.

use super::message::{InboundDatagram, PacketSource};
use crate::constants::{MAX_DATAGRAM_SIZE, RECV_DEADLINE};
use bytes::Bytes;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{trace, warn};

pub async fn run(
    socket: Arc<UdpSocket>,
    tx: flume::Sender<InboundDatagram>,
    engine_peer_ip: IpAddr,
    mut stop: watch::Receiver<bool>,
    channel_id: String,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        if *stop.borrow() {
            break;
        }

        tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() {
                    // Sender dropped; treat like a stop request.
                    break;
                }
                continue;
            }
            result = tokio::time::timeout(RECV_DEADLINE, socket.recv_from(&mut buf)) => {
                match result {
                    Ok(Ok((len, addr))) => {
                        let source = if addr.ip() == engine_peer_ip {
                            PacketSource::Engine
                        } else {
                            PacketSource::Echo
                        };

                        let datagram = InboundDatagram {
                            data: Bytes::copy_from_slice(&buf[..len]),
                            arrival: Instant::now(),
                            source,
                            peer_addr: addr,
                        };

                        if tx.try_send(datagram).is_err() {
                            warn!(channel = %channel_id, "worker queue full, dropping datagram");
                        }
                    },
                    Ok(Err(e)) => {
                        warn!(channel = %channel_id, error = %e, "udp recv error");
                    },
                    Err(_elapsed) => {
                        // Receive deadline hit; loop back to re-check the stop signal.
                    },
                }
            }
        }
    }

    trace!(channel = %channel_id, "reader task stopped");
}
