//! Per-item membership update decisions
//!
//! An [`UpdatePolicy`] looks at one row (or column) at a time: its current
//! clusters and its combined scores against every cluster. It answers with a
//! short list of [`Move`]s which the membership applies in order.

use rand::rngs::StdRng;
use rand::Rng;

/// Score substituted for `NaN` and infinite cells: the worst possible fit
pub const SENTINEL_LOW_SCORE: f64 = -1.0e30;

/// Fraction of an item's score range a new cluster may trail its best member by
pub const FILL_THRESHOLD: f64 = 0.25;

/// One membership change for one item, in zero-based cluster indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    Add(usize),
    Replace { from: usize, to: usize },
}

/// Bounds that apply to a single item on one side of the matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateLimits {
    /// Maximum clusters per item
    pub cap: usize,
    pub max_changes: usize,
    pub prob_change: f64,
}

pub trait UpdatePolicy: Send + Sync {
    /// Moves for an item currently in `members` with combined `scores`
    ///
    /// Must never produce a membership larger than `limits.cap` or an empty one.
    fn decide(
        &self,
        members: &[usize],
        scores: &[f64],
        limits: &UpdateLimits,
        fuzzy_coeff: f64,
        rng: &mut StdRng,
    ) -> Vec<Move>;
}

/// Noise amplitude for `iteration`, decaying from 0.75 towards 0.05
pub fn fuzzy_coefficient(iteration: u32, num_iterations: u32) -> f64 {
    let scale = (num_iterations as f64 / 3.0).max(1.0);
    0.7 * (-(iteration as f64) / scale).exp() + 0.05
}

/// Replace non-finite scores with [`SENTINEL_LOW_SCORE`]
pub fn sanitize(scores: &[f64]) -> Vec<f64> {
    scores
        .iter()
        .map(|&s| if s.is_finite() { s } else { SENTINEL_LOW_SCORE })
        .collect()
}

/// True when every cluster scores the same for this item
pub fn has_no_preference(clean: &[f64]) -> bool {
    clean.windows(2).all(|w| w[0] == w[1])
}

/// Spread of the finite, non-sentinel scores
fn score_range(clean: &[f64]) -> f64 {
    let (lo, hi) = clean
        .iter()
        .filter(|&&s| s > SENTINEL_LOW_SCORE)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));
    if hi >= lo {
        hi - lo
    } else {
        0.0
    }
}

fn standard_deviation(clean: &[f64]) -> f64 {
    let values: Vec<f64> = clean.iter().copied().filter(|&s| s > SENTINEL_LOW_SCORE).collect();
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64).sqrt()
}

/// Index of the highest score among `candidates`, lowest index on ties
fn best_of(scores: &[f64], candidates: impl Iterator<Item = usize>) -> Option<usize> {
    candidates.fold(None, |best, k| match best {
        Some(b) if scores[b] >= scores[k] => Some(b),
        _ => Some(k),
    })
}

/// Index of the lowest score among `candidates`, lowest index on ties
fn worst_of(scores: &[f64], candidates: impl Iterator<Item = usize>) -> Option<usize> {
    candidates.fold(None, |worst, k| match worst {
        Some(w) if scores[w] <= scores[k] => Some(w),
        _ => Some(k),
    })
}

/// Greedy threshold fill, probabilistic replacement, bounded change count
///
/// Open slots are filled with the best-ranked non-member whose clean score is
/// close enough to the item's best member. A full item swaps its worst member
/// for the best non-member with probability `prob_change` when the latter ranks
/// strictly higher. Ranking uses the fuzzed scores.
#[derive(Debug, Clone, Copy, Default)]
pub struct DampenedUpdate;

impl UpdatePolicy for DampenedUpdate {
    fn decide(
        &self,
        members: &[usize],
        scores: &[f64],
        limits: &UpdateLimits,
        fuzzy_coeff: f64,
        rng: &mut StdRng,
    ) -> Vec<Move> {
        let clean = sanitize(scores);
        if has_no_preference(&clean) {
            return Vec::new();
        }

        let sd = standard_deviation(&clean);
        let noisy: Vec<f64> = clean
            .iter()
            .map(|&s| {
                let jitter: f64 = rng.gen_range(-1.0..=1.0);
                s + fuzzy_coeff * sd * jitter
            })
            .collect();
        let threshold = FILL_THRESHOLD * score_range(&clean);

        let mut current = members.to_vec();
        let mut moves = Vec::new();
        while moves.len() < limits.max_changes {
            let Some(candidate) = best_of(&noisy, (0..clean.len()).filter(|k| !current.contains(k))) else {
                break;
            };

            if current.len() < limits.cap {
                let best_member = best_of(&clean, current.iter().copied()).map_or(f64::NEG_INFINITY, |b| clean[b]);
                if clean[candidate] > SENTINEL_LOW_SCORE && clean[candidate] >= best_member - threshold {
                    current.push(candidate);
                    moves.push(Move::Add(candidate));
                    continue;
                }
                break;
            }

            let Some(worst) = worst_of(&noisy, current.iter().copied()) else {
                break;
            };
            if noisy[candidate] > noisy[worst] && rng.gen::<f64>() < limits.prob_change {
                if let Some(slot) = current.iter().position(|&k| k == worst) {
                    current[slot] = candidate;
                }
                moves.push(Move::Replace {
                    from: worst,
                    to: candidate,
                });
                continue;
            }
            break;
        }
        moves
    }
}

/// Clusters an item keeps after greedy post-adjustment
///
/// The best cluster always, then further clusters in score order while they
/// pass the fill threshold, up to `cap`. `None` for items without a preference.
pub fn greedy_selection(scores: &[f64], cap: usize) -> Option<Vec<usize>> {
    let clean = sanitize(scores);
    if has_no_preference(&clean) {
        return None;
    }

    let mut order: Vec<usize> = (0..clean.len()).collect();
    order.sort_by(|&a, &b| clean[b].total_cmp(&clean[a]).then(a.cmp(&b)));

    let best = clean[order[0]];
    let threshold = FILL_THRESHOLD * score_range(&clean);
    let mut chosen = vec![order[0]];
    for &k in order.iter().skip(1) {
        if chosen.len() >= cap {
            break;
        }
        if clean[k] > SENTINEL_LOW_SCORE && clean[k] >= best - threshold {
            chosen.push(k);
        }
    }
    Some(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn limits(cap: usize, max_changes: usize, prob_change: f64) -> UpdateLimits {
        UpdateLimits {
            cap,
            max_changes,
            prob_change,
        }
    }

    #[test]
    fn test_fuzzy_coefficient_decays() {
        let first = fuzzy_coefficient(1, 30);
        let last = fuzzy_coefficient(30, 30);
        assert!(first > last);
        assert!(last > 0.05);
        assert!((fuzzy_coefficient(0, 30) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_open_slot_is_filled_with_close_cluster() {
        let mut rng = StdRng::seed_from_u64(1);
        let moves = DampenedUpdate.decide(&[0], &[-1.0, -1.1, -9.0], &limits(2, 1, 0.0), 0.0, &mut rng);
        assert_eq!(moves, vec![Move::Add(1)]);
    }

    #[test]
    fn test_open_slot_is_not_filled_with_distant_cluster() {
        let mut rng = StdRng::seed_from_u64(1);
        let moves = DampenedUpdate.decide(&[0], &[-1.0, -5.0, -9.0], &limits(2, 1, 1.0), 0.0, &mut rng);
        assert!(moves.is_empty());
    }

    #[test]
    fn test_full_item_replaces_worst_member() {
        let mut rng = StdRng::seed_from_u64(1);
        let moves = DampenedUpdate.decide(&[1], &[-1.0, -5.0, -9.0], &limits(1, 1, 1.0), 0.0, &mut rng);
        assert_eq!(moves, vec![Move::Replace { from: 1, to: 0 }]);

        let never = DampenedUpdate.decide(&[1], &[-1.0, -5.0, -9.0], &limits(1, 1, 0.0), 0.0, &mut rng);
        assert!(never.is_empty());
    }

    #[test]
    fn test_non_finite_scores_are_worst_fit() {
        let mut rng = StdRng::seed_from_u64(1);
        let moves = DampenedUpdate.decide(&[2], &[f64::NAN, -3.0, -4.0], &limits(1, 3, 1.0), 0.0, &mut rng);
        assert_eq!(moves, vec![Move::Replace { from: 2, to: 1 }]);
    }

    #[test]
    fn test_no_preference_leaves_item_alone() {
        let mut rng = StdRng::seed_from_u64(1);
        let moves = DampenedUpdate.decide(&[0], &[0.0, 0.0, 0.0], &limits(3, 3, 1.0), 0.5, &mut rng);
        assert!(moves.is_empty());
        let moves = DampenedUpdate.decide(&[0], &[f64::NAN; 3], &limits(3, 3, 1.0), 0.5, &mut rng);
        assert!(moves.is_empty());
    }

    #[test]
    fn test_change_count_is_bounded() {
        let mut rng = StdRng::seed_from_u64(9);
        let scores = [-1.0, -1.0, -1.0, -1.0, -2.0];
        let moves = DampenedUpdate.decide(&[4], &scores, &limits(5, 2, 1.0), 0.0, &mut rng);
        assert_eq!(moves.len(), 2);
    }

    #[test]
    fn test_greedy_selection() {
        assert_eq!(greedy_selection(&[-5.0, -1.0, -1.2, -9.0], 2), Some(vec![1, 2]));
        assert_eq!(greedy_selection(&[-5.0, -1.0, -1.2, -9.0], 1), Some(vec![1]));
        assert_eq!(greedy_selection(&[0.0, 0.0], 2), None);
    }
}
