//! Randomness for backoff jitter.
//!
//! A tiny xorshift64 generator is enough here: jitter only has to
//! desynchronize clients, it does not need to be unpredictable. A fixed seed
//! gives reproducible delay sequences.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Lower bound of the jitter scale factor.
pub const JITTER_MIN: f64 = 0.5;
/// Upper bound of the jitter scale factor.
pub const JITTER_MAX: f64 = 1.0;

static SEED_COUNTER: AtomicU64 = AtomicU64::new(0x9E37_79B9_7F4A_7C15);

/// Pseudo-random source for jitter factors.
#[derive(Debug, Clone)]
pub struct JitterRng {
    state: u64,
}

impl JitterRng {
    /// Creates a generator with a fixed seed. Zero is replaced with one.
    pub const fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    /// Creates a generator seeded from the wall clock.
    ///
    /// Generators created in the same instant still diverge because every
    /// call mixes in a process-wide counter.
    pub fn from_clock() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let salt = SEED_COUNTER.fetch_add(0x9E37_79B9_7F4A_7C15, Ordering::Relaxed);
        Self::new(nanos ^ salt)
    }

    /// Next raw value.
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform value in `[0, 1)`.
    pub fn next_unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform scale factor in `[JITTER_MIN, JITTER_MAX]`.
    pub fn factor(&mut self) -> f64 {
        JITTER_MIN + (JITTER_MAX - JITTER_MIN) * self.next_unit()
    }
}
