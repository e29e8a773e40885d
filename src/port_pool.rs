//! Fixed-range UDP port allocator.
//!
//! A single mutex guards a bitset over `[min, max]`. Both operations are
//! brief; `allocate` is O(range) which is acceptable for ranges up to a few
//! thousand ports.

use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PortPoolError {
    #[error("no free port available in the configured range")]
    Exhausted,
}

pub struct PortPool {
    min: u16,
    max: u16,
    allocated: Mutex<Vec<bool>>,
}

impl PortPool {
    /// Creates a pool over the inclusive range `[min, max]`.
    pub fn new(min: u16, max: u16) -> Self {
        assert!(min <= max, "port pool range must be non-empty");
        let len = (max - min) as usize + 1;
        Self {
            min,
            max,
            allocated: Mutex::new(vec![false; len]),
        }
    }

    /// Returns the lowest-numbered free port and marks it allocated, or
    /// `Exhausted` if none remain.
    pub fn allocate(&self) -> Result<u16, PortPoolError> {
        let mut bits = self.allocated.lock();
        for (idx, used) in bits.iter_mut().enumerate() {
            if !*used {
                *used = true;
                return Ok(self.min + idx as u16);
            }
        }
        Err(PortPoolError::Exhausted)
    }

    /// Releases a port. A no-op if `port` is out of range or already free;
    /// never panics.
    pub fn release(&self, port: u16) {
        if port < self.min || port > self.max {
            return;
        }
        let idx = (port - self.min) as usize;
        self.allocated.lock()[idx] = false;
    }

    /// Number of ports currently allocated, for diagnostics.
    pub fn in_use_count(&self) -> usize {
        self.allocated.lock().iter().filter(|b| **b).count()
    }

    pub fn range(&self) -> (u16, u16) {
        (self.min, self.max)
    }
}
