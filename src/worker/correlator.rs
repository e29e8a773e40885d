//! Per-channel mapping from sequence number to send-instant, used to compute
//! round-trip time on the matching return. Channel-private; never shared
//! across tasks or channels.

use crate::constants::CORRELATOR_MAX_AGE;
use std::collections::HashMap;
use tokio::time::Instant;

pub struct LatencyCorrelator {
    sent_at: HashMap<u16, Instant>,
}

impl LatencyCorrelator {
    pub fn new() -> Self {
        Self {
            sent_at: HashMap::new(),
        }
    }

    /// Records the send instant for `sequence`, and sweeps entries older
    /// than the age ceiling.
    pub fn record(&mut self, sequence: u16, sent_at: Instant) {
        self.sent_at.insert(sequence, sent_at);
        self.sweep(sent_at);
    }

    /// Consumes (removes) the entry for `sequence` if present. Returns
    /// `None` if the sequence was never recorded, already consumed, or aged
    /// out, at which point no RTT is attributed to it.
    pub fn consume(&mut self, sequence: u16) -> Option<Instant> {
        self.sent_at.remove(&sequence)
    }

    fn sweep(&mut self, now: Instant) {
        self.sent_at
            .retain(|_, sent_at| now.saturating_duration_since(*sent_at) <= CORRELATOR_MAX_AGE);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sent_at.len()
    }
}

impl Default for LatencyCorrelator {
    fn default() -> Self {
        Self::new()
    }
}
