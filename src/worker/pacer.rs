//! Paces outbound packets against the media clock, and derives the expected
//! arrival instant for the matching return used for lateness detection.

use tokio::time::Instant;

pub struct PacketPacer {
    base: Option<(u32, Instant)>,
    sample_rate_hz: u32,
}

impl PacketPacer {
    pub fn new(sample_rate_hz: u32) -> Self {
        Self {
            base: None,
            sample_rate_hz,
        }
    }

    /// Initialises `base_ts`/`base_instant` from the channel's first egress
    /// packet. A no-op on subsequent calls: once set, the base never changes
    /// for the channel's lifetime.
    pub fn init_if_unset(&mut self, media_timestamp: u32, now: Instant) {
        if self.base.is_none() {
            self.base = Some((media_timestamp, now));
        }
    }

    /// The instant at which a packet carrying `media_timestamp` should be
    /// sent (or was expected to return), derived from the media clock.
    /// Returns `now` itself if the pacer has not yet been initialised.
    pub fn scheduled_instant(&self, media_timestamp: u32, now: Instant) -> Instant {
        match self.base {
            None => now,
            Some((base_ts, base_instant)) => {
                let delta_samples = media_timestamp.wrapping_sub(base_ts);
                let delta = samples_to_duration(delta_samples, self.sample_rate_hz);
                base_instant + delta
            },
        }
    }
}

fn samples_to_duration(samples: u32, sample_rate_hz: u32) -> std::time::Duration {
    std::time::Duration::from_secs_f64(f64::from(samples) / f64::from(sample_rate_hz))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_call_sets_the_base_and_never_moves_it() {
        let mut pacer = PacketPacer::new(8000);
        let t0 = Instant::now();
        pacer.init_if_unset(1000, t0);
        pacer.init_if_unset(9999, t0 + Duration::from_secs(5));

        // Base still (1000, t0): a packet at ts=1160 (one 20ms frame later)
        // should be scheduled 20ms after t0.
        let scheduled = pacer.scheduled_instant(1160, t0);
        assert_eq!(scheduled, t0 + Duration::from_millis(20));
    }

    #[test]
    fn uninitialised_pacer_schedules_immediately() {
        let pacer = PacketPacer::new(8000);
        let now = Instant::now();
        assert_eq!(pacer.scheduled_instant(500, now), now);
    }
}
