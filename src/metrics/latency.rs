//! Bounded per-channel latency sample buffer and percentile rollup.

/// A bounded sequence of RTT samples (milliseconds), oldest-first eviction
/// in chunks once full.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    samples: Vec<f64>,
    capacity: usize,
    evict_chunk: usize,
}

impl SampleBuffer {
    pub fn new(capacity: usize, evict_chunk: usize) -> Self {
        Self {
            samples: Vec::new(),
            capacity,
            evict_chunk,
        }
    }

    pub fn push(&mut self, value_ms: f64) {
        if self.samples.len() >= self.capacity {
            let drop_n = self.evict_chunk.min(self.samples.len());
            // Shrink rather than copy-in-place, per the bounded-buffer contract.
            self.samples = self.samples.split_off(drop_n);
            self.samples.shrink_to_fit();
        }
        self.samples.push(value_ms);
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Rolled-up latency statistics over a (possibly multi-channel) sample set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
}

impl LatencyStats {
    /// Zero for every field, used when the sample set is empty.
    pub const fn zero() -> Self {
        Self {
            p50_ms: 0.0,
            p95_ms: 0.0,
            p99_ms: 0.0,
            max_ms: 0.0,
            avg_ms: 0.0,
        }
    }

    /// Computes percentiles over `samples` using the nearest-rank method,
    /// `samples_sorted[floor(n * q)]` clamped to the last index. `samples`
    /// need not be pre-sorted; this function sorts a local copy.
    pub fn compute(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::zero();
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("latency samples are never NaN"));

        let rank = |q: f64| -> f64 {
            let idx = ((sorted.len() as f64) * q).floor() as usize;
            sorted[idx.min(sorted.len() - 1)]
        };

        let sum: f64 = sorted.iter().sum();

        Self {
            p50_ms: rank(0.50),
            p95_ms: rank(0.95),
            p99_ms: rank(0.99),
            max_ms: *sorted.last().unwrap(),
            avg_ms: sum / sorted.len() as f64,
        }
    }
}
