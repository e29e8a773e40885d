//! Consumes control-plane events and drives the begin/end/scrub state
//! machine described in spec.md §4.4. The active-channel map is a
//! `DashMap` of per-entry handles (grounded on the call-map pattern in
//! `manager.rs` of the teacher), so lookups and the scrubber never
//! contend with a single global lock.

use crate::config::Config;
use crate::control::model::EngineEvent;
use crate::control::{ControlClient, LookupResult, MirrorSpec};
use crate::metrics::MetricsStore;
use crate::port_pool::PortPool;
use crate::worker::{self, WorkerConfig, WorkerHandle};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

const SAMPLE_RATE_HZ: u32 = crate::constants::SAMPLE_RATE_G711_HZ;

/// A single active call's wiring, from spec.md §3 "ChannelRecord".
pub struct ChannelRecord {
    pub channel_id: String,
    bridge_id: String,
    mirror_id: String,
    local_port: u16,
    worker: WorkerHandle,
    pub t_call_start: Instant,
}

pub struct LifecycleManager<C: ControlClient> {
    control: Arc<C>,
    port_pool: Arc<PortPool>,
    metrics: Arc<MetricsStore>,
    config: Config,
    engine_peer_ip: IpAddr,
    active: DashMap<String, ChannelRecord>,
}

impl<C: ControlClient + 'static> LifecycleManager<C> {
    pub fn new(
        control: Arc<C>,
        port_pool: Arc<PortPool>,
        metrics: Arc<MetricsStore>,
        config: Config,
        engine_peer_ip: IpAddr,
    ) -> Self {
        Self {
            control,
            port_pool,
            metrics,
            config,
            engine_peer_ip,
            active: DashMap::new(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Drains control-plane events forever. Exits only when the event
    /// channel is closed (process shutdown).
    pub async fn run_event_loop(self: Arc<Self>) {
        let events = self.control.events();
        while let Ok(event) = events.recv_async().await {
            match event {
                EngineEvent::CallBegin { channel } => {
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = this.begin(channel.id).await {
                            warn!(error = %e, "call begin failed");
                        }
                    });
                },
                EngineEvent::CallEnd { channel } => {
                    self.end(&channel.id).await;
                },
                EngineEvent::Other => {},
            }
        }
        info!("event stream closed, event loop exiting");
    }

    /// Runs the zombie scrubber forever at `interval`, per spec.md §4.4.
    pub async fn run_scrubber(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it.
        loop {
            ticker.tick().await;
            self.scrub_once().await;
        }
    }

    async fn scrub_once(&self) {
        let ids: Vec<String> = self.active.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            match self.control.lookup(&id).await {
                LookupResult::NotFound => {
                    info!(channel = %id, "zombie scrub: channel no longer exists on engine");
                    self.end(&id).await;
                },
                LookupResult::TransportError => {
                    warn!(channel = %id, "zombie scrub: transport error, skipping this round");
                },
                LookupResult::Exists => {},
            }
        }
    }

    async fn begin(self: Arc<Self>, channel_id: String) -> Result<(), BeginError> {
        self.metrics.mark_channel_started();

        self.control
            .answer(&channel_id)
            .await
            .map_err(BeginError::Answer)?;

        let port = match self.port_pool.allocate() {
            Ok(p) => p,
            Err(e) => {
                if let Err(hangup_err) = self.control.hangup(&channel_id).await {
                    warn!(channel = %channel_id, error = %hangup_err, "failed to hang up call after port exhaustion");
                }
                return Err(BeginError::PortExhausted(e));
            },
        };

        let this = Arc::clone(&self);
        if let Err(e) = self.wire(this, &channel_id, port).await {
            self.port_pool.release(port);
            return Err(e);
        }

        Ok(())
    }

    /// Wires the channel's bridge/mirror/worker and, on success, spawns a
    /// watcher that tears the channel down if the worker later reports a
    /// fatal socket error (spec.md §4.3 "Failure semantics").
    async fn wire(&self, this: Arc<Self>, channel_id: &str, port: u16) -> Result<(), BeginError> {
        let sink = SocketAddr::new(self.config.bind_ip, port);

        let bridge_id = self
            .control
            .create_conference()
            .await
            .map_err(BeginError::Control)?;

        let mirror_id = match self
            .control
            .create_mirror(channel_id, sink, MirrorSpec::default())
            .await
        {
            Ok(id) => id,
            Err(e) => {
                let _ = self.control.destroy_conference(&bridge_id).await;
                return Err(BeginError::Control(e));
            },
        };

        if let Err(e) = self.control.attach(&bridge_id, channel_id).await {
            self.rollback_mirror_and_bridge(&mirror_id, &bridge_id).await;
            return Err(BeginError::Control(e));
        }

        if let Err(e) = self.control.attach(&bridge_id, &mirror_id).await {
            self.rollback_mirror_and_bridge(&mirror_id, &bridge_id).await;
            return Err(BeginError::Control(e));
        }

        let worker_config = WorkerConfig {
            channel_id: channel_id.to_string(),
            local_bind_ip: self.config.bind_ip,
            local_port: port,
            echo_addr: SocketAddr::new(self.config.echo_host, self.config.echo_port),
            engine_peer_ip: self.engine_peer_ip,
            sample_rate_hz: SAMPLE_RATE_HZ,
        };

        let channel_metrics = self.metrics.register_channel(channel_id);

        let worker = match worker::spawn(worker_config, channel_metrics).await {
            Ok(w) => w,
            Err(e) => {
                self.metrics.remove_channel(channel_id);
                self.rollback_mirror_and_bridge(&mirror_id, &bridge_id).await;
                return Err(BeginError::Socket(e));
            },
        };

        let fatal_rx = worker.fatal_rx.clone();

        self.active.insert(
            channel_id.to_string(),
            ChannelRecord {
                channel_id: channel_id.to_string(),
                bridge_id,
                mirror_id,
                local_port: port,
                worker,
                t_call_start: Instant::now(),
            },
        );

        let watched_channel_id = channel_id.to_string();
        tokio::spawn(async move {
            if let Ok(err) = fatal_rx.recv_async().await {
                error!(channel = %watched_channel_id, error = %err, "worker reported a fatal socket error, tearing down");
                this.end(&watched_channel_id).await;
            }
        });

        Ok(())
    }

    async fn rollback_mirror_and_bridge(&self, mirror_id: &str, bridge_id: &str) {
        let _ = self.control.hangup(mirror_id).await;
        let _ = self.control.destroy_conference(bridge_id).await;
    }

    /// Exactly-once cleanup: removal from the map is the single winner,
    /// matching spec.md §4.4's "atomically remove ... then tear down".
    async fn end(&self, channel_id: &str) {
        let Some((_, mut record)) = self.active.remove(channel_id) else {
            return;
        };

        record.worker.stop().await;
        self.port_pool.release(record.local_port);
        self.metrics.remove_channel(&record.channel_id);

        if let Err(e) = self.control.hangup(&record.mirror_id).await {
            error!(channel = %channel_id, error = %e, "failed to hang up mirror during teardown");
        }
        if let Err(e) = self.control.destroy_conference(&record.bridge_id).await {
            error!(channel = %channel_id, error = %e, "failed to destroy bridge during teardown");
        }

        info!(channel = %channel_id, "channel torn down");
    }

    /// Runs the End handler for every active channel, then logs a final
    /// SLA report. Called once on process shutdown (spec.md §4.4).
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.active.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.end(&id).await;
        }

        let snapshot = self.metrics.snapshot();
        info!(
            total_channels = snapshot.total_channels,
            active_channels = self.active.len(),
            total_latencies = snapshot.total_latencies,
            p50_ms = snapshot.latency.p50_ms,
            p95_ms = snapshot.latency.p95_ms,
            p99_ms = snapshot.latency.p99_ms,
            max_ms = snapshot.latency.max_ms,
            late_ratio = snapshot.late_ratio,
            loss_ratio = snapshot.loss_ratio,
            allocated_ports = self.port_pool.in_use_count(),
            "final SLA report",
        );
    }
}

#[derive(Debug, thiserror::Error)]
enum BeginError {
    #[error("engine rejected answer: {0}")]
    Answer(#[source] crate::control::ControlError),
    #[error("no free port available")]
    PortExhausted(#[source] crate::port_pool::PortPoolError),
    #[error("control-plane call failed: {0}")]
    Control(#[source] crate::control::ControlError),
    #[error("worker failed to start: {0}")]
    Socket(#[source] std::io::Error),
}
