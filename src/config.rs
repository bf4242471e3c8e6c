use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Arguments of an API call are searched at depth 1; deeper arguments may nest
/// down to this depth.
pub const MAX_ARGUMENT_DEPTH: usize = 2;
/// Longest method chain the enumerator composes from a variable.
pub const MAX_COMPOSE_LENGTH: usize = 3;
/// Weight of one argument relative to one call in the chain cost.
pub const ARG_COST_WEIGHT: usize = 3;
pub const DEFAULT_MAX_PROGRAMS: usize = 10;

/// How equally ranked candidates are ordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TieBreak {
    /// Keep discovery order; reproducible output.
    Deterministic,
    /// Shuffle each group of ties with a seeded generator; varied output.
    Seeded(u64),
}

#[derive(Clone, Debug)]
pub struct SynthesisConfig {
    pub max_argument_depth: usize,
    pub max_compose_length: usize,
    pub arg_cost_weight: usize,
    pub tie_break: TieBreak,
    pub max_programs: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        SynthesisConfig {
            max_argument_depth: MAX_ARGUMENT_DEPTH,
            max_compose_length: MAX_COMPOSE_LENGTH,
            arg_cost_weight: ARG_COST_WEIGHT,
            tie_break: TieBreak::Deterministic,
            max_programs: DEFAULT_MAX_PROGRAMS,
        }
    }
}

/// Ranks candidates by ascending cost, breaking ties per the configured policy.
pub struct Ranker {
    rng: Option<StdRng>,
}

impl Ranker {
    /// `attempt` decorrelates the generators of successive candidates.
    pub fn new(tie_break: TieBreak, attempt: u64) -> Ranker {
        let rng = match tie_break {
            TieBreak::Deterministic => None,
            TieBreak::Seeded(seed) => Some(StdRng::seed_from_u64(seed.wrapping_add(attempt))),
        };
        Ranker { rng }
    }

    pub fn rank<T, F>(&mut self, mut items: Vec<T>, cost: F) -> Vec<T>
    where
        F: Fn(&T) -> usize,
    {
        items.sort_by_key(|item| cost(item));
        if let Some(rng) = self.rng.as_mut() {
            let mut start = 0;
            while start < items.len() {
                let c = cost(&items[start]);
                let end = start + items[start..].iter().take_while(|i| cost(i) == c).count();
                items[start..end].shuffle(rng);
                start = end;
            }
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_rank_is_stable() {
        let mut ranker = Ranker::new(TieBreak::Deterministic, 0);
        let ranked = ranker.rank(vec![(3, 'a'), (1, 'b'), (3, 'c'), (1, 'd')], |x| x.0);
        assert_eq!(ranked, vec![(1, 'b'), (1, 'd'), (3, 'a'), (3, 'c')]);
    }

    #[test]
    fn test_seeded_rank_keeps_cost_order() {
        let mut ranker = Ranker::new(TieBreak::Seeded(7), 0);
        let items: Vec<(usize, usize)> = (0..20).map(|i| (i % 3, i)).collect();
        let ranked = ranker.rank(items, |x| x.0);
        assert!(ranked.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(ranked.len(), 20);
    }
}
