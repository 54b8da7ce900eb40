//! Rarity odds: validation and weighted draws.
//!
//! Odds are six percentages, one per [`Rarity`] tier. A draw rolls a
//! uniform value in `[0, 100)` and walks the tiers in [`Rarity::ALL`]
//! order, returning the first tier whose cumulative upper bound exceeds the
//! roll. Odds summing to slightly under 100 leave a gap at the top of the
//! range; rolls landing there resolve to [`Rarity::Legendary`].

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::Rarity;

/// Allowed distance between the odds total and 100.
pub const ODDS_TOLERANCE: f64 = 0.01;

/// Draw probability per rarity tier, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RarityOdds {
    pub common: f64,
    pub uncommon: f64,
    pub rare: f64,
    pub ultra_rare: f64,
    pub epic: f64,
    pub legendary: f64,
}

impl RarityOdds {
    pub const fn new(
        common: f64,
        uncommon: f64,
        rare: f64,
        ultra_rare: f64,
        epic: f64,
        legendary: f64,
    ) -> Self {
        Self {
            common,
            uncommon,
            rare,
            ultra_rare,
            epic,
            legendary,
        }
    }

    /// Probability for one tier.
    pub fn get(&self, rarity: Rarity) -> f64 {
        match rarity {
            Rarity::Common => self.common,
            Rarity::Uncommon => self.uncommon,
            Rarity::Rare => self.rare,
            Rarity::UltraRare => self.ultra_rare,
            Rarity::Epic => self.epic,
            Rarity::Legendary => self.legendary,
        }
    }

    pub fn total(&self) -> f64 {
        Rarity::ALL.iter().map(|r| self.get(*r)).sum()
    }
}

/// True iff the odds sum to 100 within [`ODDS_TOLERANCE`].
pub fn validate_pack_odds(odds: &RarityOdds) -> bool {
    (odds.total() - 100.0).abs() <= ODDS_TOLERANCE
}

/// Resolve a roll in `[0, 100)` to a tier.
pub fn rarity_for_roll(odds: &RarityOdds, roll: f64) -> Rarity {
    let mut cumulative = 0.0;
    for rarity in Rarity::ALL {
        cumulative += odds.get(rarity);
        if roll < cumulative {
            return rarity;
        }
    }
    Rarity::Legendary
}

/// Draw one tier.
pub fn select_rarity_by_odds<R: Rng + ?Sized>(odds: &RarityOdds, rng: &mut R) -> Rarity {
    let roll = rng.gen_range(0.0..100.0);
    rarity_for_roll(odds, roll)
}

/// Draw `count` tiers independently; tiers may repeat.
pub fn draw_rarities<R: Rng + ?Sized>(odds: &RarityOdds, count: u32, rng: &mut R) -> Vec<Rarity> {
    (0..count).map(|_| select_rarity_by_odds(odds, rng)).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    const STANDARD: RarityOdds = RarityOdds::new(60.0, 25.0, 10.0, 3.0, 1.5, 0.5);

    #[test]
    fn valid_odds_pass() {
        assert!(validate_pack_odds(&STANDARD));
        assert!(validate_pack_odds(&RarityOdds::new(100.0, 0.0, 0.0, 0.0, 0.0, 0.0)));
        assert!(validate_pack_odds(&RarityOdds::new(60.0, 25.0, 10.0, 3.0, 1.5, 0.495)));
        assert!(validate_pack_odds(&RarityOdds::new(60.0, 25.0, 10.0, 3.0, 1.5, 0.505)));
    }

    #[test]
    fn odds_outside_tolerance_fail() {
        assert!(!validate_pack_odds(&RarityOdds::new(60.0, 25.0, 10.0, 3.0, 1.5, 0.48)));
        assert!(!validate_pack_odds(&RarityOdds::new(60.0, 25.0, 10.0, 3.0, 1.5, 0.52)));
        assert!(!validate_pack_odds(&RarityOdds::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0)));
        assert!(!validate_pack_odds(&RarityOdds::new(50.0, 50.0, 50.0, 0.0, 0.0, 0.0)));
    }

    #[test]
    fn total_sums_all_tiers() {
        assert!((STANDARD.total() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn roll_walks_buckets_in_order() {
        assert_eq!(rarity_for_roll(&STANDARD, 0.0), Rarity::Common);
        assert_eq!(rarity_for_roll(&STANDARD, 59.999), Rarity::Common);
        assert_eq!(rarity_for_roll(&STANDARD, 60.0), Rarity::Uncommon);
        assert_eq!(rarity_for_roll(&STANDARD, 85.0), Rarity::Rare);
        assert_eq!(rarity_for_roll(&STANDARD, 95.0), Rarity::UltraRare);
        assert_eq!(rarity_for_roll(&STANDARD, 98.0), Rarity::Epic);
        assert_eq!(rarity_for_roll(&STANDARD, 99.5), Rarity::Legendary);
        assert_eq!(rarity_for_roll(&STANDARD, 99.999), Rarity::Legendary);
    }

    #[test]
    fn zero_weight_tiers_are_skipped() {
        let odds = RarityOdds::new(0.0, 100.0, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(rarity_for_roll(&odds, 0.0), Rarity::Uncommon);
        assert_eq!(rarity_for_roll(&odds, 99.9), Rarity::Uncommon);
    }

    #[test]
    fn shortfall_falls_back_to_legendary() {
        // sums to 99.995, within tolerance
        let odds = RarityOdds::new(99.995, 0.0, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(rarity_for_roll(&odds, 99.994), Rarity::Common);
        assert_eq!(rarity_for_roll(&odds, 99.996), Rarity::Legendary);

        let empty = RarityOdds::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(rarity_for_roll(&empty, 0.0), Rarity::Legendary);
    }

    #[test]
    fn draw_count_matches_request() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        assert_eq!(draw_rarities(&STANDARD, 5, &mut rng).len(), 5);
        assert!(draw_rarities(&STANDARD, 0, &mut rng).is_empty());
    }

    #[test]
    fn same_seed_same_draws() {
        let a = draw_rarities(&STANDARD, 50, &mut ChaCha8Rng::seed_from_u64(42));
        let b = draw_rarities(&STANDARD, 50, &mut ChaCha8Rng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn empirical_frequencies_track_odds() {
        const DRAWS: u32 = 100_000;
        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        let mut counts: HashMap<Rarity, u32> = HashMap::new();
        for rarity in draw_rarities(&STANDARD, DRAWS, &mut rng) {
            *counts.entry(rarity).or_default() += 1;
        }

        for rarity in Rarity::ALL {
            let observed = f64::from(counts.get(&rarity).copied().unwrap_or(0)) * 100.0
                / f64::from(DRAWS);
            let expected = STANDARD.get(rarity);
            assert!(
                (observed - expected).abs() < 0.5,
                "{rarity}: observed {observed:.3}%, expected {expected}%"
            );
        }
    }
}
