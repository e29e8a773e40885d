//! Processor task: the CPU side of the worker. Drains the queue the reader
//! task fills, classifies each datagram as egress (engine -> echo) or
//! ingress (echo -> engine), paces, correlates, and forwards.

use super::correlator::LatencyCorrelator;
use super::header::parse_header;
use super::message::{InboundDatagram, PacketSource};
use super::pacer::PacketPacer;
use super::sequence::SequenceMeter;
use crate::constants::LATENESS_TOLERANCE;
use crate::metrics::ChannelMetrics;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// True if an I/O error on a connectionless UDP socket indicates the socket
/// itself is no longer usable, as opposed to a transient per-packet failure.
fn is_fatal_io(e: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    !matches!(e.kind(), WouldBlock | TimedOut | ConnectionReset | ConnectionRefused | Interrupted)
}

pub struct Processor {
    channel_id: String,
    socket: Arc<UdpSocket>,
    rx: flume::Receiver<InboundDatagram>,
    echo_addr: SocketAddr,
    engine_return_addr: Option<SocketAddr>,
    correlator: LatencyCorrelator,
    sequence: SequenceMeter,
    pacer: PacketPacer,
    metrics: Arc<ChannelMetrics>,
    stop: watch::Receiver<bool>,
    fatal_tx: flume::Sender<super::error::WorkerError>,
}

impl Processor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        channel_id: String,
        socket: Arc<UdpSocket>,
        rx: flume::Receiver<InboundDatagram>,
        echo_addr: SocketAddr,
        sample_rate_hz: u32,
        metrics: Arc<ChannelMetrics>,
        stop: watch::Receiver<bool>,
        fatal_tx: flume::Sender<super::error::WorkerError>,
    ) -> Self {
        Self {
            channel_id,
            socket,
            rx,
            echo_addr,
            engine_return_addr: None,
            correlator: LatencyCorrelator::new(),
            sequence: SequenceMeter::new(),
            pacer: PacketPacer::new(sample_rate_hz),
            metrics,
            stop,
            fatal_tx,
        }
    }

    pub async fn run(mut self) {
        loop {
            if *self.stop.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = self.stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                msg = self.rx.recv_async() => {
                    match msg {
                        Ok(datagram) => {
                            if !self.handle(datagram).await {
                                break;
                            }
                        },
                        Err(_) => break, // reader's sender dropped; queue is fully drained.
                    }
                }
            }
        }

        trace!(channel = %self.channel_id, "processor task stopped");
    }

    /// Returns `false` if the worker should terminate (fatal socket error).
    async fn handle(&mut self, datagram: InboundDatagram) -> bool {
        match datagram.source {
            PacketSource::Engine => self.handle_egress(datagram).await,
            PacketSource::Echo => self.handle_ingress(datagram).await,
        }
    }

    async fn handle_egress(&mut self, datagram: InboundDatagram) -> bool {
        self.engine_return_addr = Some(datagram.from_addr());

        let header = match parse_header(&datagram.data) {
            Ok(h) => h,
            Err(_) => {
                warn!(channel = %self.channel_id, "malformed egress header, dropping");
                return true;
            },
        };

        self.pacer.init_if_unset(header.media_timestamp, datagram.arrival);
        self.correlator.record(header.sequence_number, Instant::now());
        self.sequence.record_outbound();
        self.metrics.record_outbound();

        let now = Instant::now();
        let scheduled = self.pacer.scheduled_instant(header.media_timestamp, now);

        if scheduled > now {
            tokio::select! {
                biased;
                changed = self.stop.changed() => {
                    if changed.is_err() || *self.stop.borrow() {
                        // Stop observed during the pacing sleep: abort the send.
                        return false;
                    }
                },
                () = tokio::time::sleep_until(scheduled) => {},
            }
        }

        match self.socket.send_to(&datagram.data, self.echo_addr).await {
            Ok(_) => true,
            Err(e) => {
                warn!(channel = %self.channel_id, error = %e, "egress send failed");
                self.report_if_fatal(e)
            },
        }
    }

    async fn handle_ingress(&mut self, datagram: InboundDatagram) -> bool {
        let header = match parse_header(&datagram.data) {
            Ok(h) => h,
            Err(_) => {
                warn!(channel = %self.channel_id, "malformed ingress header, dropping");
                return true;
            },
        };

        if let Some(sent_at) = self.correlator.consume(header.sequence_number) {
            let rtt = datagram.arrival.saturating_duration_since(sent_at);
            self.metrics.record_rtt(rtt.as_secs_f64() * 1000.0);
        } else {
            debug!(
                channel = %self.channel_id,
                sequence = header.sequence_number,
                "no correlator entry for returning sequence (lost, aged out, or duplicate)"
            );
        }

        let gap = self.sequence.record_inbound(header.sequence_number);
        self.metrics.record_gap(gap);

        let expected = self.pacer.scheduled_instant(header.media_timestamp, datagram.arrival);
        if datagram.arrival > expected + LATENESS_TOLERANCE {
            self.metrics.record_late();
        }

        let Some(engine_addr) = self.engine_return_addr else {
            warn!(channel = %self.channel_id, "ingress packet before any egress packet seen, dropping");
            return true;
        };

        match self.socket.send_to(&datagram.data, engine_addr).await {
            Ok(_) => true,
            Err(e) => {
                warn!(channel = %self.channel_id, error = %e, "ingress send failed");
                self.report_if_fatal(e)
            },
        }
    }

    fn report_if_fatal(&self, e: std::io::Error) -> bool {
        if is_fatal_io(&e) {
            let _ = self
                .fatal_tx
                .send(super::error::WorkerError::SocketDied(e));
            false
        } else {
            true
        }
    }
}
