//! Weighted Selector: biased sampling of browse candidates.
//!
//! Candidates are partitioned into a human pool and a bot pool, each sorted
//! by popularity (highest first). The human pool is preferred; the bot pool is
//! only used when no humans came back, and the raw input is returned untouched
//! when both pools are empty.
//!
//! Within the chosen pool one *bias draw* decides between:
//!
//! - with probability `bias_probability`: the biased slice of the active
//!   [`BiasPolicy`] (top half, or one pick from the bottom half)
//! - otherwise: one weighted pick over the whole pool, weight from the policy
//!
//! The two draws are exposed through [`WeightedSelector::select_with_draws`]
//! so every branch can be asserted exactly.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::service::Candidate;

/// Default probability of taking the biased slice.
pub const DEFAULT_BIAS_PROBABILITY: f64 = 0.8;

/// Smallest split point, so a one-element pool still has a "top half".
pub const MIN_SPLIT: usize = 1;

/// Base weight every candidate gets in the weighted pick.
pub const BASE_WEIGHT: f64 = 1.0;

/// Split point between the top and bottom halves of a pool.
pub fn split_point(len: usize) -> usize {
    (len / 2).max(MIN_SPLIT)
}

/// Which end of the popularity ranking selection leans toward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasPolicy {
    /// Rich get richer: top half, weight `1 + popularity`
    #[default]
    FavorPopular,
    /// Exposure leveling: one pick from the bottom half, weight
    /// `1 + sqrt(max - popularity)`
    FavorUnderexposed,
}

impl BiasPolicy {
    /// Weight of a candidate with `popularity` in a pool whose highest score
    /// is `max`.
    pub fn weight(&self, popularity: f64, max: f64) -> f64 {
        match self {
            Self::FavorPopular => BASE_WEIGHT + popularity.max(0.0),
            Self::FavorUnderexposed => BASE_WEIGHT + (max - popularity).max(0.0).sqrt(),
        }
    }

    /// Get descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::FavorPopular => "favor_popular",
            Self::FavorUnderexposed => "favor_underexposed",
        }
    }
}

impl std::fmt::Display for BiasPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for BiasPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "favor_popular" | "popular" => Ok(Self::FavorPopular),
            "favor_underexposed" | "underexposed" | "leveling" => Ok(Self::FavorUnderexposed),
            _ => Err(format!("Unknown selector policy: {s}")),
        }
    }
}

/// Browse results split by kind, each sorted by popularity descending.
#[derive(Debug, Clone, Default)]
pub struct CandidatePools {
    /// Human profiles
    pub humans: Vec<Candidate>,
    /// Bot profiles
    pub bots: Vec<Candidate>,
    /// Unfiltered input, as returned by the service
    pub all: Vec<Candidate>,
}

impl CandidatePools {
    /// Partition `candidates`, dropping the agent's own profile
    pub fn partition(candidates: Vec<Candidate>, self_id: AgentId) -> Self {
        let (mut bots, mut humans): (Vec<_>, Vec<_>) = candidates
            .iter()
            .filter(|c| c.id != self_id.0)
            .cloned()
            .partition(|c| c.bot);

        humans.sort_by(|a, b| b.popularity.total_cmp(&a.popularity));
        bots.sort_by(|a, b| b.popularity.total_cmp(&a.popularity));

        Self {
            humans,
            bots,
            all: candidates,
        }
    }
}

/// Selector settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Bias policy
    pub policy: BiasPolicy,
    /// Probability of taking the biased slice
    pub bias_probability: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            policy: BiasPolicy::default(),
            bias_probability: DEFAULT_BIAS_PROBABILITY,
        }
    }
}

/// Biased sampler over browse candidates.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedSelector {
    config: SelectorConfig,
}

impl WeightedSelector {
    /// Create a selector
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    /// Active configuration
    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Partition `candidates` and select from the preferred pool
    pub fn select<R: Rng + ?Sized>(
        &self,
        candidates: Vec<Candidate>,
        self_id: AgentId,
        rng: &mut R,
    ) -> Vec<Candidate> {
        let bias_draw: f64 = rng.gen();
        let pick_draw: f64 = rng.gen();
        self.select_with_draws(CandidatePools::partition(candidates, self_id), bias_draw, pick_draw)
    }

    /// Select with explicit draws in `[0, 1)`.
    pub fn select_with_draws(
        &self,
        pools: CandidatePools,
        bias_draw: f64,
        pick_draw: f64,
    ) -> Vec<Candidate> {
        let pool = if !pools.humans.is_empty() {
            pools.humans
        } else if !pools.bots.is_empty() {
            pools.bots
        } else {
            return pools.all;
        };
        self.select_from_pool(&pool, bias_draw, pick_draw)
    }

    /// Apply the bias draw to one sorted, non-empty pool
    pub fn select_from_pool(
        &self,
        pool: &[Candidate],
        bias_draw: f64,
        pick_draw: f64,
    ) -> Vec<Candidate> {
        if pool.len() <= 1 {
            return pool.to_vec();
        }

        if bias_draw < self.config.bias_probability {
            let split = split_point(pool.len());
            return match self.config.policy {
                BiasPolicy::FavorPopular => pool[..split].to_vec(),
                BiasPolicy::FavorUnderexposed => {
                    let bottom = &pool[split..];
                    vec![bottom[pick_index(bottom.len(), pick_draw)].clone()]
                },
            };
        }

        vec![self.weighted_pick(pool, pick_draw).clone()]
    }

    fn weighted_pick<'p>(&self, pool: &'p [Candidate], pick_draw: f64) -> &'p Candidate {
        let max = pool
            .iter()
            .map(|c| c.popularity)
            .fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = pool
            .iter()
            .map(|c| self.config.policy.weight(c.popularity, max))
            .collect();
        let total: f64 = weights.iter().sum();

        let target = pick_draw * total;
        let mut cumulative = 0.0;
        for (candidate, weight) in pool.iter().zip(&weights) {
            cumulative += weight;
            if target <= cumulative {
                return candidate;
            }
        }

        &pool[0]
    }
}

/// Uniform index into a slice of `len` from a draw in `[0, 1)`
fn pick_index(len: usize, draw: f64) -> usize {
    ((draw * len as f64) as usize).min(len.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    const SELF: AgentId = AgentId(1);

    fn ranked(pops: &[f64]) -> Vec<Candidate> {
        pops.iter()
            .enumerate()
            .map(|(i, p)| Candidate::human(100 + i as i64, *p))
            .collect()
    }

    fn popular() -> WeightedSelector {
        WeightedSelector::new(SelectorConfig::default())
    }

    fn leveling() -> WeightedSelector {
        WeightedSelector::new(SelectorConfig {
            policy: BiasPolicy::FavorUnderexposed,
            ..Default::default()
        })
    }

    #[test]
    fn test_split_point() {
        assert_eq!(split_point(1), 1);
        assert_eq!(split_point(2), 1);
        assert_eq!(split_point(5), 2);
        assert_eq!(split_point(20), 10);
    }

    #[test]
    fn test_partition_sorts_and_skips_self() {
        let pools = CandidatePools::partition(
            vec![
                Candidate::human(1, 50.0),
                Candidate::human(2, 3.0),
                Candidate::bot(3, 1.0),
                Candidate::human(4, 9.0),
                Candidate::bot(5, 7.0),
            ],
            SELF,
        );
        let humans: Vec<i64> = pools.humans.iter().map(|c| c.id).collect();
        let bots: Vec<i64> = pools.bots.iter().map(|c| c.id).collect();
        assert_eq!(humans, vec![4, 2]);
        assert_eq!(bots, vec![5, 3]);
        assert_eq!(pools.all.len(), 5);
    }

    #[test]
    fn test_prefers_human_pool() {
        let pools = CandidatePools::partition(
            vec![Candidate::bot(3, 99.0), Candidate::human(4, 0.0)],
            SELF,
        );
        let picked = popular().select_with_draws(pools, 0.9, 0.5);
        assert_eq!(picked, vec![Candidate::human(4, 0.0)]);
    }

    #[test]
    fn test_falls_back_to_bot_pool() {
        let pools = CandidatePools::partition(
            vec![Candidate::bot(3, 2.0), Candidate::bot(5, 8.0)],
            SELF,
        );
        let picked = popular().select_with_draws(pools, 0.1, 0.0);
        assert_eq!(picked, vec![Candidate::bot(5, 8.0)]);
    }

    #[test]
    fn test_both_pools_empty_returns_input_unchanged() {
        let input = vec![Candidate::human(SELF.0, 12.0)];
        let pools = CandidatePools::partition(input.clone(), SELF);
        assert_eq!(popular().select_with_draws(pools, 0.1, 0.1), input);

        let pools = CandidatePools::partition(Vec::new(), SELF);
        assert!(popular().select_with_draws(pools, 0.1, 0.1).is_empty());
    }

    #[test]
    fn test_favor_popular_bias_returns_top_half() {
        let pool = ranked(&[9.0, 7.0, 5.0, 3.0, 1.0]);
        let picked = popular().select_from_pool(&pool, 0.79, 0.0);
        assert_eq!(picked, pool[..2].to_vec());
    }

    #[test]
    fn test_favor_popular_weighted_pick() {
        // weights 11, 6, 1 -> total 18
        let pool = ranked(&[10.0, 5.0, 0.0]);
        let selector = popular();
        assert_eq!(selector.select_from_pool(&pool, 0.8, 0.5)[0].id, 100);
        assert_eq!(selector.select_from_pool(&pool, 0.8, 0.7)[0].id, 101);
        assert_eq!(selector.select_from_pool(&pool, 0.8, 0.99)[0].id, 102);
    }

    #[test]
    fn test_favor_underexposed_bias_picks_from_bottom_half() {
        let pool = ranked(&[9.0, 7.0, 5.0, 3.0, 1.0]);
        let selector = leveling();
        assert_eq!(selector.select_from_pool(&pool, 0.1, 0.0)[0].id, 102);
        assert_eq!(selector.select_from_pool(&pool, 0.1, 0.5)[0].id, 103);
        assert_eq!(selector.select_from_pool(&pool, 0.1, 0.999)[0].id, 104);
    }

    #[test]
    fn test_favor_underexposed_weighted_pick() {
        // max 9: weights 1, 3, 4 -> total 8
        let pool = ranked(&[9.0, 5.0, 0.0]);
        let selector = leveling();
        assert_eq!(selector.select_from_pool(&pool, 0.9, 0.05)[0].id, 100);
        assert_eq!(selector.select_from_pool(&pool, 0.9, 0.3)[0].id, 101);
        assert_eq!(selector.select_from_pool(&pool, 0.9, 0.9)[0].id, 102);
    }

    #[test]
    fn test_single_candidate_pool() {
        let pool = ranked(&[4.0]);
        assert_eq!(leveling().select_from_pool(&pool, 0.1, 0.9), pool);
        assert_eq!(popular().select_from_pool(&pool, 0.9, 0.9), pool);
    }

    #[test]
    fn test_same_seed_same_selection() {
        let input = vec![
            Candidate::human(10, 1.0),
            Candidate::human(11, 4.0),
            Candidate::human(12, 2.0),
            Candidate::bot(13, 8.0),
            Candidate::human(14, 0.5),
        ];
        for selector in [popular(), leveling()] {
            for seed in 0..20 {
                let a = selector.select(input.clone(), SELF, &mut ChaCha8Rng::seed_from_u64(seed));
                let b = selector.select(input.clone(), SELF, &mut ChaCha8Rng::seed_from_u64(seed));
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "favor-underexposed".parse::<BiasPolicy>().unwrap(),
            BiasPolicy::FavorUnderexposed
        );
        assert_eq!("popular".parse::<BiasPolicy>().unwrap(), BiasPolicy::FavorPopular);
        assert!("random".parse::<BiasPolicy>().is_err());
    }

    proptest! {
        #[test]
        fn prop_selection_is_non_empty_subset(
            pops in proptest::collection::vec(0.0f64..100.0, 1..30),
            bias_draw in 0.0f64..1.0,
            pick_draw in 0.0f64..1.0,
            underexposed in any::<bool>(),
        ) {
            let selector = if underexposed { leveling() } else { popular() };
            let mut pool = ranked(&pops);
            pool.sort_by(|a, b| b.popularity.total_cmp(&a.popularity));

            let picked = selector.select_from_pool(&pool, bias_draw, pick_draw);
            prop_assert!(!picked.is_empty());
            for c in &picked {
                prop_assert!(pool.contains(c));
            }
        }
    }
}
