//! Shared test doubles for the end-to-end scenarios: a fake engine control
//! client driven by hand, and a loopback echo reflector standing in for the
//! external reflector the worker forwards egress media to.

use async_trait::async_trait;
use parking_lot::Mutex;
use rtt_echo_relay::control::model::{ChannelObject, EngineEvent};
use rtt_echo_relay::control::{ControlClient, ControlResult, LookupResult, MirrorSpec};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// Stands in for the engine's REST+event-stream surface. Events are emitted
/// by calling `begin`/`end` directly; the remaining calls trivially succeed
/// unless a test arranges otherwise via `set_lookup`.
pub struct FakeControlClient {
    events_tx: flume::Sender<EngineEvent>,
    events_rx: flume::Receiver<EngineEvent>,
    lookups: Mutex<HashMap<String, LookupResult>>,
    bridge_seq: AtomicUsize,
    hung_up: Mutex<HashSet<String>>,
}

impl FakeControlClient {
    pub fn new() -> Arc<Self> {
        let (events_tx, events_rx) = flume::unbounded();
        Arc::new(Self {
            events_tx,
            events_rx,
            lookups: Mutex::new(HashMap::new()),
            bridge_seq: AtomicUsize::new(0),
            hung_up: Mutex::new(HashSet::new()),
        })
    }

    pub fn begin(&self, channel_id: &str) {
        let _ = self.events_tx.send(EngineEvent::CallBegin {
            channel: ChannelObject { id: channel_id.to_string(), name: None },
        });
    }

    pub fn end(&self, channel_id: &str) {
        let _ = self.events_tx.send(EngineEvent::CallEnd {
            channel: ChannelObject { id: channel_id.to_string(), name: None },
        });
    }

    pub fn set_lookup(&self, channel_id: &str, result: LookupResult) {
        self.lookups.lock().insert(channel_id.to_string(), result);
    }

    pub fn was_hung_up(&self, channel_id: &str) -> bool {
        self.hung_up.lock().contains(channel_id)
    }
}

#[async_trait]
impl ControlClient for FakeControlClient {
    async fn answer(&self, _channel_id: &str) -> ControlResult<()> {
        Ok(())
    }

    async fn create_mirror(
        &self,
        channel_id: &str,
        _sink: SocketAddr,
        _spec: MirrorSpec,
    ) -> ControlResult<String> {
        Ok(format!("mirror-{channel_id}"))
    }

    async fn create_conference(&self) -> ControlResult<String> {
        let n = self.bridge_seq.fetch_add(1, Ordering::Relaxed);
        Ok(format!("bridge-{n}"))
    }

    async fn attach(&self, _bridge_id: &str, _channel_id: &str) -> ControlResult<()> {
        Ok(())
    }

    async fn hangup(&self, channel_id: &str) -> ControlResult<()> {
        self.hung_up.lock().insert(channel_id.to_string());
        Ok(())
    }

    async fn destroy_conference(&self, _bridge_id: &str) -> ControlResult<()> {
        Ok(())
    }

    async fn lookup(&self, channel_id: &str) -> LookupResult {
        self.lookups.lock().get(channel_id).copied().unwrap_or(LookupResult::Exists)
    }

    fn events(&self) -> flume::Receiver<EngineEvent> {
        self.events_rx.clone()
    }
}

/// Binds a UDP socket at `addr` that echoes every datagram back to its
/// sender, except sequence numbers in `drop_seqs` (dropped entirely) and
/// sequence numbers in `delay_seqs` (held for the given delay before being
/// echoed). Bound to a loopback address distinct from the simulated engine's
/// so the worker's source-IP classification cannot confuse the two roles.
pub fn spawn_echo_reflector(
    addr: SocketAddr,
    drop_seqs: HashSet<u16>,
    delay_seqs: HashMap<u16, Duration>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let socket = Arc::new(UdpSocket::bind(addr).await.expect("echo reflector bind"));
        let mut buf = [0u8; rtt_echo_relay::constants::MAX_DATAGRAM_SIZE];
        loop {
            let (len, from) = match socket.recv_from(&mut buf).await {
                Ok(r) => r,
                Err(_) => break,
            };
            let datagram = buf[..len].to_vec();
            let header = match rtt_echo_relay::worker::header::parse_header(&datagram) {
                Ok(h) => h,
                Err(_) => continue,
            };

            if drop_seqs.contains(&header.sequence_number) {
                continue;
            }

            let socket = Arc::clone(&socket);
            let delay = delay_seqs.get(&header.sequence_number).copied();
            tokio::spawn(async move {
                if let Some(d) = delay {
                    tokio::time::sleep(d).await;
                }
                let _ = socket.send_to(&datagram, from).await;
            });
        }
    })
}

/// Builds a `MEDIA_HEADER_LEN`-byte-prefixed datagram with a small fixed
/// payload, matching the wire layout the worker's header parser expects.
pub fn media_packet(seq: u16, ts: u32) -> Vec<u8> {
    let mut buf = vec![0u8; rtt_echo_relay::constants::MEDIA_HEADER_LEN + 160];
    buf[0..2].copy_from_slice(&seq.to_be_bytes());
    buf[2..6].copy_from_slice(&ts.to_be_bytes());
    buf
}

/// A minimal engine-side config for a `LifecycleManager` under test: binds
/// to `127.0.0.1`, forwards to an echo reflector at `127.0.0.2`.
pub fn test_config(port_min: u16, port_max: u16, echo_port: u16) -> rtt_echo_relay::config::Config {
    rtt_echo_relay::config::Config {
        engine_url: "127.0.0.1:8088".to_string(),
        engine_user: "test".to_string(),
        engine_pass: "test".to_string(),
        app_name: "rtt-echo-test".to_string(),
        bind_ip: "127.0.0.1".parse().unwrap(),
        port_range: (port_min, port_max),
        echo_host: "127.0.0.2".parse().unwrap(),
        echo_port,
        metrics_interval_sec: 10,
        service_port: 0,
        external_media_style: rtt_echo_relay::config::ExternalMediaStyle::QueryParams,
        event_auth_style: rtt_echo_relay::config::EventAuthStyle::QueryString,
    }
}

pub const ENGINE_IP: std::net::IpAddr = std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1));
