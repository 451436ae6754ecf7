//! Rotation policy.
//!
//! # Algorithm
//! Round-robin advances a pool-global atomic counter and takes it modulo the
//! currently available candidate count; random draws uniformly. The counter
//! is global rather than per healthy-subset, preserving approximate fairness
//! as health changes.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

/// Which entry handles the next request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    RoundRobin,
    Random,
}

impl Rotation {
    /// Parse the configured rotation name; empty means round-robin.
    /// Unknown names are rejected at config validation, so this only sees
    /// the three accepted spellings.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "random" => Rotation::Random,
            _ => Rotation::RoundRobin,
        }
    }
}

/// Selection state: policy plus the monotonically increasing counter.
#[derive(Debug)]
pub(crate) struct Selector {
    rotation: Rotation,
    counter: AtomicU64,
}

impl Selector {
    pub(crate) fn new(rotation: Rotation) -> Self {
        Self {
            rotation,
            counter: AtomicU64::new(0),
        }
    }

    /// Pick an index in `0..available`. The counter advances on every call,
    /// including the trivial single-candidate case.
    pub(crate) fn pick(&self, available: usize) -> usize {
        debug_assert!(available > 0);
        match self.rotation {
            Rotation::Random => {
                let drawn = rand::thread_rng().gen_range(0..available);
                self.counter.fetch_add(1, Ordering::Relaxed);
                drawn
            }
            Rotation::RoundRobin => {
                let count = self.counter.fetch_add(1, Ordering::Relaxed);
                (count % available as u64) as usize
            }
        }
    }
}
