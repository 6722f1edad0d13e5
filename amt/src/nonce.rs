//! Nonce generation for discovery and request messages.
//!
//! The generator is an explicit object handed to the components that
//! need one rather than process-global state, so tests can seed it for
//! deterministic sequences.

use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};

pub struct NonceGenerator {
    next: AtomicU32,
}

impl NonceGenerator {
    /// Creates a generator starting from a random value.
    pub fn new() -> NonceGenerator {
        NonceGenerator::from_seed(rand::thread_rng().gen())
    }

    pub fn from_seed(seed: u32) -> NonceGenerator {
        NonceGenerator {
            next: AtomicU32::new(seed),
        }
    }

    pub fn next_nonce(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for NonceGenerator {
    fn default() -> NonceGenerator {
        NonceGenerator::new()
    }
}
