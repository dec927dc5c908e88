//! Inter-step pacing.
//!
//! The engine asks a [`Pacer`] how long to wait before each step after the
//! first; sleeping itself goes through tokio time so tests can pause it.

use rand::prelude::*;
use rand_pcg::Mcg128Xsl64;
use std::time::Duration;

pub trait Pacer {
    fn next_delay(&mut self) -> Duration;
}

/// `base + uniform(0, jitter)` milliseconds, both bounds inclusive.
#[derive(Debug, Clone)]
pub struct JitterPacer<R = Mcg128Xsl64> {
    base_ms: u64,
    jitter_ms: u64,
    rng: R,
}

impl JitterPacer<Mcg128Xsl64> {
    /// Seeded for reproducible runs; `None` draws from entropy.
    pub fn new(base_ms: u64, jitter_ms: u64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => Mcg128Xsl64::seed_from_u64(seed),
            None => Mcg128Xsl64::from_entropy(),
        };
        Self::with_rng(base_ms, jitter_ms, rng)
    }
}

impl<R: Rng> JitterPacer<R> {
    pub fn with_rng(base_ms: u64, jitter_ms: u64, rng: R) -> Self {
        Self {
            base_ms,
            jitter_ms,
            rng,
        }
    }

    pub fn bounds(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.base_ms),
            Duration::from_millis(self.base_ms.saturating_add(self.jitter_ms)),
        )
    }
}

impl<R: Rng> Pacer for JitterPacer<R> {
    fn next_delay(&mut self) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            self.rng.gen_range(0..=self.jitter_ms)
        };
        Duration::from_millis(self.base_ms.saturating_add(jitter))
    }
}

/// Same delay every time.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPacer(pub Duration);

impl Pacer for FixedPacer {
    fn next_delay(&mut self) -> Duration {
        self.0
    }
}
