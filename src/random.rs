//! Random processes behind the synthetic traffic.
//!
//! A seeded linear-congruential generator plus samplers for arrival intervals,
//! weighted choices, kitchen and dining durations, and cosmetic identities.
//! Every sampler is generic over [`rand::Rng`], so the engine can use
//! [`SeededLcg`] while tests may substitute any other generator.

use rand::{Rng, RngCore, SeedableRng};

use crate::types::ArrivalRate;

const LCG_MULTIPLIER: u64 = 6_364_136_223_846_793_005;
const LCG_INCREMENT: u64 = 1_442_695_040_888_963_407;

/// Arrival intervals are sampled in tenths of a minute.
pub const POISSON_UNIT_MS: u64 = 6_000;
const POISSON_MAX_TRIALS: u64 = 10_000;
/// Above this mean `e^-λ` is too close to underflow for the thinning sampler.
const POISSON_MAX_LAMBDA: f64 = 700.0;

const MINUTE_MS: f64 = 60_000.0;

/// 64-bit linear-congruential generator (MMIX constants, high-bit output).
///
/// Same seed ⇒ same stream. Not suitable for anything security related.
#[derive(Clone, Debug)]
pub struct SeededLcg {
    state: u64,
}

impl SeededLcg {
    pub fn new(seed: u64) -> Self {
        let mut rng = Self { state: seed };
        rng.step();
        rng
    }

    fn step(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(LCG_MULTIPLIER)
            .wrapping_add(LCG_INCREMENT);
        self.state
    }
}

impl RngCore for SeededLcg {
    fn next_u32(&mut self) -> u32 {
        (self.step() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        let hi = u64::from(self.next_u32());
        let lo = u64::from(self.next_u32());
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for SeededLcg {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u64::from_le_bytes(seed))
    }

    fn seed_from_u64(state: u64) -> Self {
        Self::new(state)
    }
}

/// Named time-of-day windows with elevated arrival rates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RushWindow {
    /// 07:00–09:59
    Breakfast,
    /// 11:00–13:59
    Lunch,
    /// 18:00–20:59
    Dinner,
}

impl RushWindow {
    pub fn at(hour: u32) -> Option<RushWindow> {
        match hour {
            7..=9 => Some(RushWindow::Breakfast),
            11..=13 => Some(RushWindow::Lunch),
            18..=20 => Some(RushWindow::Dinner),
            _ => None,
        }
    }

    pub fn multiplier(self) -> f64 {
        match self {
            RushWindow::Breakfast => 1.5,
            RushWindow::Lunch => 2.0,
            RushWindow::Dinner => 2.5,
        }
    }
}

/// Arrival multiplier for the given hour of day (1.0 outside rush windows).
pub fn rush_multiplier(hour: u32) -> f64 {
    RushWindow::at(hour).map_or(1.0, RushWindow::multiplier)
}

/// True iff `hour` falls in the breakfast, lunch or dinner window.
pub fn is_peak_hour(hour: u32) -> bool {
    RushWindow::at(hour).is_some()
}

/// Expected orders per hour for a tier at a given hour of day.
pub fn orders_per_hour(hour: u32, tier: ArrivalRate) -> f64 {
    tier.base_orders_per_hour() * rush_multiplier(hour)
}

/// Draws a Poisson(`lambda`) variate by multiplying uniforms until the product
/// falls below `e^-lambda`.
///
/// Bounded: trials are capped, and a mean too large for the thinning method
/// returns the rounded mean instead.
pub fn poisson_sample<R: Rng + ?Sized>(rng: &mut R, lambda: f64) -> u64 {
    if !lambda.is_finite() || lambda <= 0.0 {
        return 0;
    }
    if lambda > POISSON_MAX_LAMBDA {
        return lambda.round() as u64;
    }
    let threshold = (-lambda).exp();
    let mut trials = 0u64;
    let mut product = 1.0f64;
    loop {
        trials += 1;
        product *= rng.gen::<f64>();
        if product <= threshold {
            return trials - 1;
        }
        if trials >= POISSON_MAX_TRIALS {
            return lambda.round() as u64;
        }
    }
}

/// Milliseconds until the next synthetic arrival at `hour` for `tier`, at speed 1.
///
/// The tier's hourly rate (times the rush multiplier) gives a mean inter-arrival
/// time; a Poisson sample in units of [`POISSON_UNIT_MS`] is drawn around it.
/// Never returns zero.
pub fn next_arrival_delay<R: Rng + ?Sized>(rng: &mut R, hour: u32, tier: ArrivalRate) -> u64 {
    let per_minute = orders_per_hour(hour, tier) / 60.0;
    let mean_interval_ms = MINUTE_MS / per_minute;
    let lambda = mean_interval_ms / POISSON_UNIT_MS as f64;
    poisson_sample(rng, lambda).max(1) * POISSON_UNIT_MS
}

/// Picks an item with probability proportional to its weight.
///
/// Weights need not sum to 1; negative or non-finite weights count as zero.
/// Returns `None` only if there is nothing to pick from. If floating-point
/// residue survives the scan, the last item is returned.
pub fn weighted_choice<'a, T, R: Rng + ?Sized>(rng: &mut R, items: &'a [T], weights: &[f64]) -> Option<&'a T> {
    let n = items.len().min(weights.len());
    if n == 0 {
        return None;
    }
    let clean = |w: f64| if w.is_finite() && w > 0.0 { w } else { 0.0 };
    let total: f64 = weights[..n].iter().map(|&w| clean(w)).sum();
    if total <= 0.0 {
        return None;
    }
    let mut remaining = rng.gen::<f64>() * total;
    for (item, &weight) in items[..n].iter().zip(weights) {
        let weight = clean(weight);
        if remaining < weight {
            return Some(item);
        }
        remaining -= weight;
    }
    items.get(n - 1)
}

/// Kitchen time for `item_count` items: 5 min + 2 min per item, ±20 % jitter.
pub fn cooking_duration<R: Rng + ?Sized>(rng: &mut R, item_count: u32) -> u64 {
    let base_minutes = 5.0 + 2.0 * f64::from(item_count);
    let jitter = rng.gen_range(0.8..=1.2);
    (base_minutes * jitter * MINUTE_MS).round() as u64
}

/// Time at the table: uniform between 15 and 25 minutes.
pub fn dining_duration<R: Rng + ?Sized>(rng: &mut R) -> u64 {
    let minutes: f64 = rng.gen_range(15.0..=25.0);
    (minutes * MINUTE_MS).round() as u64
}

const FIRST_NAMES: &[&str] = &[
    "Ava", "Ben", "Chloe", "Daniel", "Elena", "Farid", "Grace", "Hugo", "Ines", "Jonah", "Keiko", "Liam",
    "Maya", "Noah", "Olga", "Priya", "Quinn", "Rosa", "Sami", "Tariq", "Uma", "Victor", "Wen", "Yusuf",
];

const LAST_NAMES: &[&str] = &[
    "Alvarez", "Brooks", "Chen", "Dubois", "Evans", "Fischer", "Garcia", "Haddad", "Ito", "Jensen", "Kowalski",
    "Lopez", "Mensah", "Novak", "Okafor", "Patel", "Rossi", "Silva", "Tanaka", "Weber",
];

const AVATAR_GLYPHS: &[&str] = &[
    "🧑", "👩", "👨", "🧔", "👵", "👴", "👱", "🧕", "👲", "🧑‍🍳", "🧑‍💼", "🧑‍🎓", "🧑‍🎨", "🧑‍🚀",
];

/// Random "First Last" display name. No uniqueness guarantee.
pub fn customer_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let first = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
    let last = LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())];
    format!("{} {}", first, last)
}

pub fn avatar_glyph<R: Rng + ?Sized>(rng: &mut R) -> String {
    AVATAR_GLYPHS[rng.gen_range(0..AVATAR_GLYPHS.len())].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = SeededLcg::new(7);
        let mut b = SeededLcg::new(7);
        for _ in 0..32 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
        let mut c = SeededLcg::seed_from_u64(8);
        assert_ne!(SeededLcg::new(7).next_u64(), c.next_u64());
    }

    #[test]
    fn fill_bytes_handles_partial_chunks() {
        let mut rng = SeededLcg::new(1);
        let mut buf = [0u8; 13];
        rng.fill_bytes(&mut buf);
        assert!(buf.iter().any(|&b| b != 0));
    }

    #[test]
    fn rush_windows() {
        assert_eq!(rush_multiplier(8), 1.5);
        assert_eq!(rush_multiplier(12), 2.0);
        assert_eq!(rush_multiplier(19), 2.5);
        assert_eq!(rush_multiplier(15), 1.0);
        assert_eq!(rush_multiplier(3), 1.0);
        assert!(is_peak_hour(7));
        assert!(!is_peak_hour(10));
        assert!(!is_peak_hour(21));
    }

    #[test]
    fn weighted_choice_with_single_nonzero_weight_always_returns_it() {
        let mut rng = SeededLcg::new(99);
        let items = ["first", "second", "third"];
        for _ in 0..1000 {
            assert_eq!(weighted_choice(&mut rng, &items, &[1.0, 0.0, 0.0]), Some(&"first"));
        }
    }

    #[test]
    fn weighted_choice_empty_or_zero_weights_is_none() {
        let mut rng = SeededLcg::new(1);
        let empty: [u8; 0] = [];
        assert_eq!(weighted_choice(&mut rng, &empty, &[]), None);
        assert_eq!(weighted_choice(&mut rng, &[1, 2], &[0.0, 0.0]), None);
    }

    #[test]
    fn weighted_choice_roughly_proportional() {
        let mut rng = SeededLcg::new(2024);
        let items = [1u32, 2, 3, 4];
        let weights = [0.2, 0.4, 0.3, 0.1];
        let mut counts = [0u32; 4];
        for _ in 0..20_000 {
            let picked = *weighted_choice(&mut rng, &items, &weights).unwrap();
            counts[(picked - 1) as usize] += 1;
        }
        let share = |i: usize| f64::from(counts[i]) / 20_000.0;
        assert!((share(1) - 0.4).abs() < 0.03, "share of 2 items: {}", share(1));
        assert!((share(3) - 0.1).abs() < 0.03, "share of 4 items: {}", share(3));
    }

    #[test]
    fn poisson_sample_mean_close_to_lambda() {
        let mut rng = SeededLcg::new(5);
        let n = 5_000;
        let sum: u64 = (0..n).map(|_| poisson_sample(&mut rng, 12.0)).sum();
        let mean = sum as f64 / n as f64;
        assert!((mean - 12.0).abs() < 0.5, "mean {}", mean);
    }

    #[test]
    fn poisson_sample_degenerate_inputs_terminate() {
        let mut rng = SeededLcg::new(5);
        assert_eq!(poisson_sample(&mut rng, 0.0), 0);
        assert_eq!(poisson_sample(&mut rng, -3.0), 0);
        assert_eq!(poisson_sample(&mut rng, f64::NAN), 0);
        assert_eq!(poisson_sample(&mut rng, 1e9), 1_000_000_000);
    }

    #[test]
    fn arrival_delay_positive_and_mean_twelve_minutes_for_low_tier() {
        let mut rng = SeededLcg::new(11);
        let n = 2_000;
        let mut total = 0u64;
        for _ in 0..n {
            let d = next_arrival_delay(&mut rng, 15, ArrivalRate::Low);
            assert!(d > 0);
            total += d;
        }
        let mean_minutes = total as f64 / n as f64 / MINUTE_MS;
        assert!((mean_minutes - 12.0).abs() < 0.5, "mean {} min", mean_minutes);
    }

    #[test]
    fn arrival_delay_never_zero_in_rush() {
        let mut rng = SeededLcg::new(3);
        for _ in 0..5_000 {
            assert!(next_arrival_delay(&mut rng, 19, ArrivalRate::Rush) >= POISSON_UNIT_MS);
        }
    }

    #[test]
    fn cooking_duration_for_three_items_within_jitter_band() {
        let mut rng = SeededLcg::new(42);
        for _ in 0..1_000 {
            let ms = cooking_duration(&mut rng, 3) as f64;
            assert!(ms >= 8.8 * MINUTE_MS - 1.0 && ms <= 13.2 * MINUTE_MS + 1.0, "{} ms", ms);
        }
    }

    #[test]
    fn dining_duration_between_fifteen_and_twenty_five_minutes() {
        let mut rng = SeededLcg::new(42);
        for _ in 0..1_000 {
            let ms = dining_duration(&mut rng) as f64;
            assert!((15.0 * MINUTE_MS..=25.0 * MINUTE_MS).contains(&ms));
        }
    }

    #[test]
    fn identities_come_from_pools() {
        let mut rng = SeededLcg::new(1);
        let name = customer_name(&mut rng);
        assert_eq!(name.split(' ').count(), 2);
        assert!(AVATAR_GLYPHS.contains(&avatar_glyph(&mut rng).as_str()));
    }
}
