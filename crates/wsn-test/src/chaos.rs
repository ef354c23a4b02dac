//! Lossy radio links

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Link conditions
#[derive(Clone, Debug)]
pub struct ChaosConfig {
    /// Base one-way latency
    pub base_latency: Duration,
    /// Uniform extra latency in `0..=max_jitter`
    pub max_jitter: Duration,
    /// Independent loss probability (0.0 - 1.0)
    pub loss_rate: f64,
    /// Probability a loss burst starts
    pub burst_loss_prob: f64,
    /// Burst length range, in datagrams
    pub burst_length: (u32, u32),
    /// Probability a datagram is delivered twice
    pub duplicate_prob: f64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(10),
            max_jitter: Duration::from_millis(10),
            loss_rate: 0.02,
            burst_loss_prob: 0.01,
            burst_length: (2, 4),
            duplicate_prob: 0.0,
        }
    }
}

impl ChaosConfig {
    /// Every datagram arrives after a fixed latency
    pub fn perfect() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(5),
            max_jitter: Duration::ZERO,
            loss_rate: 0.0,
            burst_loss_prob: 0.0,
            burst_length: (0, 0),
            duplicate_prob: 0.0,
        }
    }

    /// Typical 6LoWPAN conditions
    pub fn good() -> Self {
        Self::default()
    }

    /// Congested, multi-hop conditions
    pub fn lossy() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(40),
            max_jitter: Duration::from_millis(60),
            loss_rate: 0.15,
            burst_loss_prob: 0.05,
            burst_length: (2, 6),
            duplicate_prob: 0.02,
        }
    }
}

/// Link statistics
#[derive(Clone, Debug, Default)]
pub struct ChaosStats {
    pub sent: u64,
    pub delivered: u64,
    pub lost: u64,
    pub duplicated: u64,
}

impl ChaosStats {
    pub fn loss_rate(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            self.lost as f64 / self.sent as f64
        }
    }
}

/// One directed link
pub struct ChaosLink {
    config: ChaosConfig,
    rng: StdRng,
    burst_remaining: u32,
    stats: ChaosStats,
}

impl ChaosLink {
    pub fn new(config: ChaosConfig, seed: u64) -> Self {
        ChaosLink {
            config,
            rng: StdRng::seed_from_u64(seed),
            burst_remaining: 0,
            stats: ChaosStats::default(),
        }
    }

    /// Push one datagram through the link. Returns one delay per copy
    /// that arrives: none when lost, two when duplicated.
    pub fn transmit(&mut self) -> Vec<Duration> {
        self.stats.sent += 1;

        if self.should_drop() {
            self.stats.lost += 1;
            return Vec::new();
        }

        let mut delays = vec![self.latency()];
        if self.config.duplicate_prob > 0.0 && self.rng.gen::<f64>() < self.config.duplicate_prob {
            delays.push(self.latency());
            self.stats.duplicated += 1;
        }
        self.stats.delivered += delays.len() as u64;
        delays
    }

    fn latency(&mut self) -> Duration {
        let jitter_ms = self.config.max_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.config.base_latency;
        }
        self.config.base_latency + Duration::from_millis(self.rng.gen_range(0..=jitter_ms))
    }

    fn should_drop(&mut self) -> bool {
        if self.burst_remaining > 0 {
            self.burst_remaining -= 1;
            return true;
        }

        if self.config.burst_loss_prob > 0.0 && self.rng.gen::<f64>() < self.config.burst_loss_prob
        {
            let (min, max) = self.config.burst_length;
            // This datagram is the first of the burst
            self.burst_remaining = self.rng.gen_range(min..=max.max(min)).saturating_sub(1);
            return true;
        }

        self.config.loss_rate > 0.0 && self.rng.gen::<f64>() < self.config.loss_rate
    }

    pub fn stats(&self) -> &ChaosStats {
        &self.stats
    }
}
