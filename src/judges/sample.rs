//! Picks a random panel of judges.

use std::collections::HashSet;

use rand::{
    Rng,
    seq::{IteratorRandom, SliceRandom},
};
use thiserror::Error;

use crate::judges::Judge;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SampleError {
    #[error("there are no judges on the roster")]
    NoJudgesAvailable,
}

/// Picks up to `count` distinct judges from `pool`, skipping any whose id is
/// in `exclude`.
///
/// When fewer than `count` judges remain after exclusion the panel is drawn
/// from the whole pool instead, so excluded judges may be reused. Small
/// rosters would otherwise be unable to hear appeals at all.
pub fn sample(
    pool: &[Judge],
    count: usize,
    exclude: &HashSet<String>,
    rng: &mut impl Rng,
) -> Result<Vec<Judge>, SampleError> {
    if pool.is_empty() {
        return Err(SampleError::NoJudgesAvailable);
    }

    let eligible = pool
        .iter()
        .filter(|judge| !exclude.contains(&judge.id))
        .collect::<Vec<_>>();

    let mut panel = if eligible.len() >= count {
        eligible.into_iter().choose_multiple(rng, count)
    } else {
        if !exclude.is_empty() {
            tracing::debug!(
                eligible = eligible.len(),
                count,
                "not enough unused judges, sampling from the full roster"
            );
        }
        pool.iter().choose_multiple(rng, count.min(pool.len()))
    };

    // `choose_multiple` does not randomise the order of its output
    panel.shuffle(rng);

    Ok(panel.into_iter().cloned().collect())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn roster(n: usize) -> Vec<Judge> {
        (0..n)
            .map(|i| Judge {
                id: format!("judge-{i}"),
                name: format!("Judge {i}"),
                system_prompt: format!("You are judge {i}."),
                debates_judged: 0,
                created_at: Utc::now().naive_utc(),
            })
            .collect()
    }

    fn ids(panel: &[Judge]) -> HashSet<String> {
        panel.iter().map(|j| j.id.clone()).collect()
    }

    #[test]
    fn empty_pool_is_an_error() {
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        assert_eq!(
            sample(&[], 3, &HashSet::new(), &mut rng),
            Err(SampleError::NoJudgesAvailable)
        );
    }

    #[test]
    fn picks_distinct_judges() {
        let pool = roster(10);
        for seed in 0..20 {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let panel = sample(&pool, 3, &HashSet::new(), &mut rng).unwrap();
            assert_eq!(panel.len(), 3);
            assert_eq!(ids(&panel).len(), 3);
        }
    }

    #[test]
    fn small_pool_gives_smaller_panel() {
        let pool = roster(2);
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let panel = sample(&pool, 3, &HashSet::new(), &mut rng).unwrap();
        assert_eq!(ids(&panel), ids(&pool));
    }

    #[test]
    fn excluded_judges_are_skipped_when_possible() {
        let pool = roster(6);
        let exclude: HashSet<String> =
            ["judge-0", "judge-1", "judge-2"].map(String::from).into();
        for seed in 0..20 {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let panel = sample(&pool, 3, &exclude, &mut rng).unwrap();
            assert!(ids(&panel).is_disjoint(&exclude));
            assert_eq!(panel.len(), 3);
        }
    }

    #[test]
    fn falls_back_to_full_pool_when_exclusion_leaves_too_few() {
        let pool = roster(4);
        let exclude: HashSet<String> =
            ["judge-0", "judge-1", "judge-2"].map(String::from).into();
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let panel = sample(&pool, 3, &exclude, &mut rng).unwrap();
        assert_eq!(panel.len(), 3);
        assert_eq!(ids(&panel).len(), 3);
    }
}
