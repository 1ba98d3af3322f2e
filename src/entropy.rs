//! Adaptive entropy pool and the decision helpers built on it.
//!
//! The pool is a rolling array of 256 values seeded from a logistic-map
//! expansion. Each draw blends two slots and writes the blend back, so future
//! draws depend on past ones. This correlation is intended; the pool is not a
//! cryptographic source.
//!
//! The engine owns one explicitly constructed pool. There is no process-wide
//! instance; tests build their own with a fixed seed.

use std::time::{SystemTime, UNIX_EPOCH};

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Number of slots in the rolling pool.
pub const POOL_SIZE: usize = 256;

const LOGISTIC_R: f64 = 3.99;
const PRIMARY_WEIGHT: f64 = 0.6;
const PARTNER_WEIGHT: f64 = 0.4;

const MINUTE_MS: u64 = 60_000;
const MAX_LOAD_PENALTY_MS: u64 = 15 * MINUTE_MS;

/// Coarse part of the day used by [`EntropyPool::adaptive_rate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayPart {
    Morning,
    Lunch,
    Dinner,
    Night,
}

impl DayPart {
    pub fn from_hour(hour: u32) -> DayPart {
        match hour {
            6..=10 => DayPart::Morning,
            11..=16 => DayPart::Lunch,
            17..=21 => DayPart::Dinner,
            _ => DayPart::Night,
        }
    }

    pub fn multiplier(self) -> f64 {
        match self {
            DayPart::Morning => 1.5,
            DayPart::Lunch => 2.0,
            DayPart::Dinner => 2.5,
            DayPart::Night => 0.5,
        }
    }
}

/// Self-reseeding pseudo-random pool.
#[derive(Clone, Debug)]
pub struct EntropyPool {
    pool: Vec<f64>,
    chaos: f64,
    draws: usize,
}

impl EntropyPool {
    /// Builds a pool from `seed`. Same seed ⇒ same sequence of draws.
    pub fn new(seed: u64) -> Self {
        let mut pool = Self {
            pool: vec![0.0; POOL_SIZE],
            chaos: 0.5,
            draws: 0,
        };
        pool.reseed(seed);
        pool
    }

    /// Seeds from the system clock.
    pub fn from_time() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self::new(nanos ^ 0x5DEE_CE66_D1CE_B00C)
    }

    /// Discards all state and refills the pool from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        let mut x = seed_to_unit(seed);
        // Burn in so nearby seeds diverge before the pool is filled.
        for _ in 0..64 {
            x = logistic(x);
        }
        for slot in self.pool.iter_mut() {
            x = logistic(x);
            *slot = x;
        }
        self.chaos = logistic(x);
        self.draws = 0;
    }

    /// Next value in `[0, 1)`.
    pub fn next(&mut self) -> f64 {
        let i = self.draws;
        self.chaos = logistic(self.chaos);
        let offset = 1 + (self.chaos * (POOL_SIZE - 1) as f64) as usize;
        let j = (i + offset) % POOL_SIZE;
        let blended = (PRIMARY_WEIGHT * self.pool[i] + PARTNER_WEIGHT * self.pool[j] + self.chaos).fract();
        self.pool[i] = blended;
        self.draws = (self.draws + 1) % POOL_SIZE;
        blended
    }

    /// Draw counter modulo the pool size.
    pub fn position(&self) -> usize {
        self.draws
    }

    /// `base` scaled by the day part's multiplier, jittered by ±10 %.
    pub fn adaptive_rate(&mut self, base: f64, day_part: DayPart) -> f64 {
        let jitter = 0.9 + 0.2 * self.next();
        base * day_part.multiplier() * jitter
    }

    /// Admission probability for the current kitchen load.
    ///
    /// Starts at 0.7 and drops by up to 0.4 as `current_load / capacity` rises
    /// to 1. A capacity of zero counts as full.
    pub fn admission_threshold(current_load: usize, capacity: usize) -> f64 {
        let load_fraction = if capacity == 0 {
            1.0
        } else {
            (current_load as f64 / capacity as f64).min(1.0)
        };
        0.7 - 0.4 * load_fraction
    }

    /// Whether to admit a new order at the current load.
    pub fn should_admit_order(&mut self, current_load: usize, capacity: usize) -> bool {
        self.next() < Self::admission_threshold(current_load, capacity)
    }

    /// Demand-based price: `base × (1 + max(min(demand / 100, 2) − 1, 0) × 0.3)`.
    ///
    /// Never below `base` for non-negative demand; capped at a 30 % markup.
    pub fn dynamic_price(base_price: Decimal, demand: f64) -> Decimal {
        let ratio = if demand.is_finite() { (demand / 100.0).min(2.0) } else { 0.0 };
        let markup = ((ratio - 1.0).max(0.0) * 0.3 * 10_000.0).round();
        let markup = Decimal::from_f64(markup).unwrap_or(Decimal::ZERO) / Decimal::from(10_000);
        base_price * (Decimal::ONE + markup)
    }

    /// Estimated wait in milliseconds: 5 min + 2 min per item + 1 min per order
    /// already in the kitchen, the load part capped at 15 min.
    pub fn fair_wait_estimate(item_count: u32, kitchen_load: usize) -> u64 {
        let base = 5 * MINUTE_MS + 2 * MINUTE_MS * u64::from(item_count);
        let penalty = (kitchen_load as u64)
            .saturating_mul(MINUTE_MS)
            .min(MAX_LOAD_PENALTY_MS);
        base + penalty
    }
}

fn logistic(x: f64) -> f64 {
    let next = LOGISTIC_R * x * (1.0 - x);
    // The map has fixed points at 0 and 1 - 1/r; nudge off them.
    if next <= f64::EPSILON || next >= 1.0 || (next - x).abs() < 1e-12 {
        0.123_456_789 + x * 0.5
    } else {
        next
    }
}

fn seed_to_unit(seed: u64) -> f64 {
    // splitmix64 finaliser, then 53 bits into (0, 1).
    let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    let unit = (z >> 11) as f64 / (1u64 << 53) as f64;
    unit.clamp(0.01, 0.99)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_draws_and_reseed_restarts() {
        let mut a = EntropyPool::new(17);
        let mut b = EntropyPool::new(17);
        let first: Vec<f64> = (0..600).map(|_| a.next()).collect();
        let second: Vec<f64> = (0..600).map(|_| b.next()).collect();
        assert_eq!(first, second);
        a.reseed(17);
        assert_eq!(a.next(), first[0]);
        assert_eq!(a.position(), 1);
    }

    #[test]
    fn draws_stay_in_unit_interval_and_spread() {
        let mut pool = EntropyPool::new(3);
        let draws: Vec<f64> = (0..10_000).map(|_| pool.next()).collect();
        assert!(draws.iter().all(|v| (0.0..1.0).contains(v)));
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        assert!((mean - 0.5).abs() < 0.1, "mean {}", mean);
        let below_tenth = draws.iter().filter(|v| **v < 0.1).count();
        assert!(below_tenth > 200, "pool collapsed: {} draws below 0.1", below_tenth);
    }

    #[test]
    fn counter_wraps_at_pool_size() {
        let mut pool = EntropyPool::new(1);
        for _ in 0..POOL_SIZE {
            pool.next();
        }
        assert_eq!(pool.position(), 0);
    }

    #[test]
    fn adaptive_rate_within_jitter_band() {
        let mut pool = EntropyPool::new(9);
        for _ in 0..500 {
            let rate = pool.adaptive_rate(10.0, DayPart::Dinner);
            assert!((22.5..=27.5).contains(&rate), "rate {}", rate);
        }
        assert_eq!(DayPart::from_hour(12), DayPart::Lunch);
        assert_eq!(DayPart::from_hour(2), DayPart::Night);
    }

    #[test]
    fn admission_threshold_drops_with_load() {
        let mut last = f64::MAX;
        for load in 0..=12 {
            let t = EntropyPool::admission_threshold(load, 10);
            assert!(t <= last);
            last = t;
        }
        assert!((EntropyPool::admission_threshold(0, 10) - 0.7).abs() < 1e-12);
        assert!((EntropyPool::admission_threshold(10, 10) - 0.3).abs() < 1e-12);
        assert!((EntropyPool::admission_threshold(3, 0) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn higher_load_admits_fewer_orders() {
        let mut idle = EntropyPool::new(77);
        let mut busy = EntropyPool::new(77);
        let admitted_idle = (0..5_000).filter(|_| idle.should_admit_order(0, 10)).count();
        let admitted_busy = (0..5_000).filter(|_| busy.should_admit_order(10, 10)).count();
        assert!(admitted_busy < admitted_idle, "{} vs {}", admitted_busy, admitted_idle);
    }

    #[test]
    fn dynamic_price_example_and_floor() {
        let base = Decimal::from(10);
        assert_eq!(EntropyPool::dynamic_price(base, 300.0), Decimal::new(130, 1));
        assert_eq!(EntropyPool::dynamic_price(base, 150.0), Decimal::new(115, 1));
        for demand in [0.0, 10.0, 99.0, 100.0] {
            assert_eq!(EntropyPool::dynamic_price(base, demand), base);
        }
        assert!(EntropyPool::dynamic_price(base, 1e6) <= Decimal::new(130, 1));
    }

    #[test]
    fn fair_wait_estimate_caps_load_penalty() {
        assert_eq!(EntropyPool::fair_wait_estimate(0, 0), 5 * MINUTE_MS);
        assert_eq!(EntropyPool::fair_wait_estimate(2, 3), (5 + 4 + 3) * MINUTE_MS);
        assert_eq!(EntropyPool::fair_wait_estimate(1, 100), (5 + 2 + 15) * MINUTE_MS);
    }
}
