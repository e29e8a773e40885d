//! End-to-end scenarios driving the real lifecycle manager and worker stack
//! over loopback UDP, against a hand-driven fake engine and a controllable
//! echo reflector.

mod common;

use common::{media_packet, spawn_echo_reflector, test_config, FakeControlClient, ENGINE_IP};
use rtt_echo_relay::control::LookupResult;
use rtt_echo_relay::lifecycle::LifecycleManager;
use rtt_echo_relay::metrics::MetricsStore;
use rtt_echo_relay::port_pool::PortPool;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

const SAMPLES_PER_FRAME: u32 = 160; // 20ms at 8000Hz.
const PACING_INTERVAL: Duration = Duration::from_millis(20);

async fn wire_one_channel(
    port_min: u16,
    port_max: u16,
    echo_port: u16,
    drop_seqs: HashSet<u16>,
    delay_seqs: HashMap<u16, Duration>,
) -> (
    Arc<FakeControlClient>,
    Arc<LifecycleManager<FakeControlClient>>,
    Arc<MetricsStore>,
) {
    let echo_addr: SocketAddr = format!("127.0.0.2:{echo_port}").parse().unwrap();
    spawn_echo_reflector(echo_addr, drop_seqs, delay_seqs);

    let control = FakeControlClient::new();
    let port_pool = Arc::new(PortPool::new(port_min, port_max));
    let metrics = Arc::new(MetricsStore::new());
    let config = test_config(port_min, port_max, echo_port);

    let manager = Arc::new(LifecycleManager::new(
        Arc::clone(&control),
        Arc::clone(&port_pool),
        Arc::clone(&metrics),
        config,
        ENGINE_IP,
    ));

    tokio::spawn(Arc::clone(&manager).run_event_loop());

    (control, manager, metrics)
}

async fn drive_packets(
    engine_socket: &UdpSocket,
    first_seq: u16,
    count: u16,
) {
    for i in 0..count {
        let seq = first_seq.wrapping_add(i);
        let ts = u32::from(i) * SAMPLES_PER_FRAME;
        let packet = media_packet(seq, ts);
        let _ = engine_socket.send(&packet).await;
        tokio::time::sleep(PACING_INTERVAL).await;
    }
}

async fn count_echoes(engine_socket: &UdpSocket, idle_timeout: Duration) -> usize {
    let mut buf = [0u8; 1500];
    let mut received = 0;
    loop {
        match tokio::time::timeout(idle_timeout, engine_socket.recv(&mut buf)).await {
            Ok(Ok(_)) => received += 1,
            _ => break,
        }
    }
    received
}

#[tokio::test(flavor = "multi_thread")]
async fn single_call_clean_rtt() {
    let (control, manager, metrics) =
        wire_one_channel(41101, 41101, 41191, HashSet::new(), HashMap::new()).await;

    control.begin("call-1");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.active_count(), 1);

    let worker_addr: SocketAddr = "127.0.0.1:41101".parse().unwrap();
    let engine_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    engine_socket.connect(worker_addr).await.unwrap();

    drive_packets(&engine_socket, 1000, 100).await;
    let received = count_echoes(&engine_socket, Duration::from_millis(500)).await;

    assert_eq!(received, 100);

    let snap = metrics.snapshot();
    assert_eq!(snap.total_latencies, 100);
    assert_eq!(snap.loss_ratio, 0.0);
    assert_eq!(snap.late_ratio, 0.0);

    control.end("call-1");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.active_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn lost_return_packets_are_counted_as_loss_not_failure() {
    let drop_seqs: HashSet<u16> = [2005u16, 2015, 2025, 2035, 2045].into_iter().collect();
    let (control, manager, metrics) =
        wire_one_channel(41102, 41102, 41192, drop_seqs, HashMap::new()).await;

    control.begin("call-2");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let worker_addr: SocketAddr = "127.0.0.1:41102".parse().unwrap();
    let engine_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    engine_socket.connect(worker_addr).await.unwrap();

    drive_packets(&engine_socket, 2000, 50).await;
    let received = count_echoes(&engine_socket, Duration::from_millis(500)).await;

    assert_eq!(received, 45);

    let snap = metrics.snapshot();
    assert_eq!(snap.total_latencies, 45);
    assert!((snap.loss_ratio - 0.1).abs() < 1e-9, "loss ratio was {}", snap.loss_ratio);
    assert_eq!(snap.late_ratio, 0.0);

    control.end("call-2");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.active_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn a_single_return_delayed_past_tolerance_is_marked_late() {
    let mut delay_seqs = HashMap::new();
    delay_seqs.insert(3010u16, Duration::from_millis(15));
    let (control, manager, metrics) =
        wire_one_channel(41103, 41103, 41193, HashSet::new(), delay_seqs).await;

    control.begin("call-3");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let worker_addr: SocketAddr = "127.0.0.1:41103".parse().unwrap();
    let engine_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    engine_socket.connect(worker_addr).await.unwrap();

    drive_packets(&engine_socket, 3000, 20).await;
    let received = count_echoes(&engine_socket, Duration::from_millis(500)).await;
    assert_eq!(received, 20);

    let snap = metrics.snapshot();
    assert!((snap.late_ratio - 0.05).abs() < 1e-9, "late ratio was {}", snap.late_ratio);
    assert_eq!(snap.loss_ratio, 0.0);

    control.end("call-3");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.active_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn port_exhaustion_hangs_up_the_overflow_call_and_recovers_on_release() {
    let (control, manager, _metrics) =
        wire_one_channel(41104, 41106, 41194, HashSet::new(), HashMap::new()).await;

    let ids = ["c1", "c2", "c3", "c4"];
    for id in ids {
        control.begin(id);
    }
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(manager.active_count(), 3);

    let hung_up: Vec<&str> = ids.iter().copied().filter(|id| control.was_hung_up(id)).collect();
    assert_eq!(hung_up.len(), 1, "expected exactly one overflow call to be hung up");

    let survivors: Vec<&str> = ids.iter().copied().filter(|id| !control.was_hung_up(id)).collect();
    assert_eq!(survivors.len(), 3);

    control.end(survivors[0]);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.active_count(), 2);

    control.begin("c5");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.active_count(), 3);
    assert!(!control.was_hung_up("c5"));
}

#[tokio::test(flavor = "multi_thread")]
async fn zombie_channel_is_torn_down_by_the_scrubber() {
    let (control, manager, _metrics) =
        wire_one_channel(41107, 41107, 41195, HashSet::new(), HashMap::new()).await;

    control.begin("call-zombie");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.active_count(), 1);

    control.set_lookup("call-zombie", LookupResult::NotFound);

    let scrubber = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.run_scrubber(Duration::from_millis(200)).await })
    };

    tokio::time::sleep(Duration::from_millis(500)).await;
    scrubber.abort();

    assert_eq!(manager.active_count(), 0);
    assert!(control.was_hung_up("mirror-call-zombie"));
}

#[tokio::test(flavor = "multi_thread")]
async fn sequence_numbers_wrap_cleanly_across_the_u16_boundary() {
    let (control, manager, metrics) =
        wire_one_channel(41108, 41108, 41196, HashSet::new(), HashMap::new()).await;

    control.begin("call-wrap");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let worker_addr: SocketAddr = "127.0.0.1:41108".parse().unwrap();
    let engine_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    engine_socket.connect(worker_addr).await.unwrap();

    // Sequence numbers run 0xFFF0..=0xFFFF then wrap to 0x0000..=0x000F.
    drive_packets(&engine_socket, 0xFFF0, 32).await;
    let received = count_echoes(&engine_socket, Duration::from_millis(500)).await;

    assert_eq!(received, 32);

    let snap = metrics.snapshot();
    assert_eq!(snap.total_latencies, 32);
    assert_eq!(snap.loss_ratio, 0.0);

    control.end("call-wrap");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.active_count(), 0);
}
