//! Lock-light per-channel metrics with a global percentile rollup.

pub mod latency;

use crate::constants::{SAMPLE_BUFFER_CAPACITY, SAMPLE_BUFFER_EVICT_CHUNK};
use dashmap::DashMap;
use latency::{LatencyStats, SampleBuffer};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Per-channel counters and bounded sample history.
pub struct ChannelMetrics {
    samples: Mutex<SampleBuffer>,
    outbound_count: AtomicU64,
    drop_count: AtomicU64,
    late_count: AtomicU64,
    // Shared with the owning `MetricsStore` so a recorded RTT is never lost
    // to the sample buffer's eviction once the channel is bounded.
    total_latencies_recorded: Arc<AtomicU64>,
}

impl ChannelMetrics {
    fn new(total_latencies_recorded: Arc<AtomicU64>) -> Self {
        Self {
            samples: Mutex::new(SampleBuffer::new(SAMPLE_BUFFER_CAPACITY, SAMPLE_BUFFER_EVICT_CHUNK)),
            outbound_count: AtomicU64::new(0),
            drop_count: AtomicU64::new(0),
            late_count: AtomicU64::new(0),
            total_latencies_recorded,
        }
    }

    pub fn record_outbound(&self) {
        self.outbound_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rtt(&self, rtt_ms: f64) {
        self.samples.lock().push(rtt_ms);
        self.total_latencies_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gap(&self, gap: u32) {
        if gap > 0 {
            self.drop_count.fetch_add(gap as u64, Ordering::Relaxed);
        }
    }

    pub fn record_late(&self) {
        self.late_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn outbound_count(&self) -> u64 {
        self.outbound_count.load(Ordering::Relaxed)
    }

    pub fn drop_count(&self) -> u64 {
        self.drop_count.load(Ordering::Relaxed)
    }

    pub fn late_count(&self) -> u64 {
        self.late_count.load(Ordering::Relaxed)
    }
}

/// Process-wide metrics: a per-channel map plus two global monotone counters.
pub struct MetricsStore {
    channels: DashMap<String, Arc<ChannelMetrics>>,
    total_channels_started: AtomicU64,
    total_latencies_recorded: Arc<AtomicU64>,
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsStore {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            total_channels_started: AtomicU64::new(0),
            total_latencies_recorded: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Bumps the monotone started counter. Called once per begin event, even
    /// if wiring later fails — this is a count of attempts, not successes.
    pub fn mark_channel_started(&self) {
        self.total_channels_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Registers a fresh per-channel bucket for a channel whose wiring
    /// succeeded.
    pub fn register_channel(&self, channel_id: &str) -> Arc<ChannelMetrics> {
        let metrics = Arc::new(ChannelMetrics::new(Arc::clone(&self.total_latencies_recorded)));
        self.channels.insert(channel_id.to_string(), metrics.clone());
        metrics
    }

    pub fn remove_channel(&self, channel_id: &str) {
        self.channels.remove(channel_id);
    }

    pub fn active_channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn total_channels_started(&self) -> u64 {
        self.total_channels_started.load(Ordering::Relaxed)
    }

    pub fn total_latencies_recorded(&self) -> u64 {
        self.total_latencies_recorded.load(Ordering::Relaxed)
    }

    /// Walks the per-channel map, concatenates sample histories, and computes
    /// the global rollup. Pure with respect to internal state.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut all_samples = Vec::new();
        let mut outbound_total: u64 = 0;
        let mut drop_total: u64 = 0;
        let mut late_total: u64 = 0;

        for entry in self.channels.iter() {
            let m = entry.value();
            all_samples.extend_from_slice(m.samples.lock().as_slice());
            outbound_total += m.outbound_count();
            drop_total += m.drop_count();
            late_total += m.late_count();
        }

        let latency = LatencyStats::compute(&all_samples);

        let late_ratio = ratio(late_total, outbound_total);
        let loss_ratio = ratio(drop_total, outbound_total);

        MetricsSnapshot {
            total_channels: self.total_channels_started(),
            active_channels: self.active_channel_count(),
            total_latencies: self.total_latencies_recorded(),
            latency,
            late_ratio,
            loss_ratio,
        }
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub total_channels: u64,
    pub active_channels: usize,
    pub total_latencies: u64,
    pub latency: LatencyStats,
    pub late_ratio: f64,
    pub loss_ratio: f64,
}
