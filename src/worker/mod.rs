//! Per-channel UDP worker: owns one socket, parses headers, paces egress
//! against the media clock, correlates returns, and records RTT/loss/lateness.

pub mod correlator;
pub mod error;
pub mod header;
pub mod message;
pub mod pacer;
mod processor;
mod reader;
pub mod sequence;

pub use error::WorkerError;

use crate::constants::{UDP_SOCKET_BUFFER_BYTES, WORKER_QUEUE_CAPACITY};
use crate::metrics::ChannelMetrics;
use message::InboundDatagram;
use processor::Processor;
use socket2::{Domain, Socket, Type};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

/// Construction inputs for a single channel's worker.
pub struct WorkerConfig {
    pub channel_id: String,
    pub local_bind_ip: IpAddr,
    pub local_port: u16,
    pub echo_addr: SocketAddr,
    pub engine_peer_ip: IpAddr,
    pub sample_rate_hz: u32,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    New = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

/// A handle to a running worker: a stop signal plus the join points for its
/// two tasks. The worker does not decide its own lifetime; the lifecycle
/// manager (or a zombie scrub / process shutdown) triggers `stop()`.
pub struct WorkerHandle {
    state: Arc<AtomicU8>,
    stop_tx: watch::Sender<bool>,
    reader_task: Option<JoinHandle<()>>,
    processor_task: Option<JoinHandle<()>>,
    pub fatal_rx: flume::Receiver<WorkerError>,
}

impl WorkerHandle {
    pub fn state(&self) -> WorkerState {
        match self.state.load(Ordering::Acquire) {
            0 => WorkerState::New,
            1 => WorkerState::Running,
            2 => WorkerState::Stopping,
            _ => WorkerState::Stopped,
        }
    }

    /// Signals both tasks to stop and joins them. Idempotent: calling this
    /// more than once (or after the worker already died) is a safe no-op.
    pub async fn stop(&mut self) {
        if self.state.load(Ordering::Acquire) == WorkerState::Stopped as u8 {
            return;
        }
        self.state.store(WorkerState::Stopping as u8, Ordering::Release);

        let _ = self.stop_tx.send(true);

        if let Some(h) = self.reader_task.take() {
            let _ = h.await;
        }
        if let Some(h) = self.processor_task.take() {
            let _ = h.await;
        }

        self.state.store(WorkerState::Stopped as u8, Ordering::Release);
    }
}

/// Binds the channel's socket, enlarges its kernel buffers, and spawns the
/// reader and processor tasks.
#[instrument(skip(metrics), fields(channel = %config.channel_id))]
pub async fn spawn(
    config: WorkerConfig,
    metrics: Arc<ChannelMetrics>,
) -> std::io::Result<WorkerHandle> {
    let bind_addr = SocketAddr::new(config.local_bind_ip, config.local_port);
    let socket = bind_tuned_socket(bind_addr)?;
    let socket = Arc::new(socket);

    let (tx, rx) = flume::bounded::<InboundDatagram>(WORKER_QUEUE_CAPACITY);
    let (stop_tx, stop_rx) = watch::channel(false);
    let (fatal_tx, fatal_rx) = flume::bounded(2);

    let reader_task = tokio::spawn(reader::run(
        socket.clone(),
        tx,
        config.engine_peer_ip,
        stop_rx.clone(),
        config.channel_id.clone(),
    ));

    let processor = Processor::new(
        config.channel_id.clone(),
        socket,
        rx,
        config.echo_addr,
        config.sample_rate_hz,
        metrics,
        stop_rx,
        fatal_tx,
    );
    let processor_task = tokio::spawn(processor.run());

    info!("worker started");

    Ok(WorkerHandle {
        state: Arc::new(AtomicU8::new(WorkerState::Running as u8)),
        stop_tx,
        reader_task: Some(reader_task),
        processor_task: Some(processor_task),
        fatal_rx,
    })
}

fn bind_tuned_socket(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::DGRAM, None)?;
    socket.set_nonblocking(true)?;
    socket.set_recv_buffer_size(UDP_SOCKET_BUFFER_BYTES)?;
    socket.set_send_buffer_size(UDP_SOCKET_BUFFER_BYTES)?;
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsStore;

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_is_idempotent() {
        let store = MetricsStore::new();
        let metrics = store.register_channel("test");

        let config = WorkerConfig {
            channel_id: "test".into(),
            local_bind_ip: "127.0.0.1".parse().unwrap(),
            local_port: 0,
            echo_addr: "127.0.0.1:0".parse().unwrap(),
            engine_peer_ip: "127.0.0.1".parse().unwrap(),
            sample_rate_hz: 8000,
        };

        let mut handle = spawn(config, metrics).await.expect("worker should bind");
        handle.stop().await;
        handle.stop().await; // must not panic or hang
        assert_eq!(handle.state(), WorkerState::Stopped);
    }
}
