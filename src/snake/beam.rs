//! Bounded beam A* over configurations, the workhorse of every snake stage.
//!
//! The frontier lives in a [`MinMaxHeap`] capped at the iteration limit; once
//! the beam fills up, candidates worse than the current worst frontier entry
//! are dropped and the worst entry is evicted to make room. The combined
//! distance blends path length (weight 0.1) with the stage score (weight
//! 0.9). The search stops as soon as a configuration scores zero, or after
//! `limit` expansions, returning the path to the best configuration seen.

use std::{cmp::Ordering, collections::HashMap};

use crate::{
    configuration::Configuration,
    generators::NextGen,
    heap::MinMaxHeap,
    score::Score,
    search::{ConfigId, ConfigPool, DEFAULT_STEP, create_path},
};

const PATH_WEIGHT: f64 = 0.1;
const SCORE_WEIGHT: f64 = 1.0 - PATH_WEIGHT;

struct BeamEntry {
    dist: f64,
    seq: u64,
    handle: ConfigId,
}

impl PartialEq for BeamEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BeamEntry {}

impl PartialOrd for BeamEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BeamEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.total_cmp(&other.dist).then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Returns the path from `init` to either a zero-score configuration (second
/// element `true`) or, on exhaustion, to the best-scoring configuration seen
/// (second element `false`).
pub fn limited_astar(
    init: &Configuration,
    successors: &impl NextGen,
    score: &mut impl Score,
    limit: usize,
) -> (Vec<Configuration>, bool) {
    let start_score = score.score(init);
    if start_score == 0.0 {
        return (vec![init.clone()], true);
    }

    let mut pool = ConfigPool::new();
    let mut pred: HashMap<ConfigId, ConfigId> = HashMap::new();
    let mut init_dist: HashMap<ConfigId, f64> = HashMap::new();

    let start = pool.insert(init.clone());
    pred.insert(start, start);
    init_dist.insert(start, 0.0);

    let mut best_handle = start;
    let mut best_score = start_score;
    let mut worst_dist = start_score;

    let mut queue = MinMaxHeap::new(limit.max(1));
    let mut seq = 0u64;
    queue.push(BeamEntry { dist: start_score, seq, handle: start });

    let mut iterations = 0;
    while iterations < limit {
        let Some(entry) = queue.pop_min() else {
            break;
        };
        iterations += 1;
        let current = entry.handle;
        let current_dist = init_dist[&current];

        for next in successors.next(pool.get(current), DEFAULT_STEP) {
            let next_score = score.score(&next);
            let next_dist = PATH_WEIGHT * (current_dist + 1.0) + SCORE_WEIGHT * next_score;

            // Beam pruning: once the frontier plus the spent iterations fill
            // the budget, only candidates at least as good as the worst
            // frontier entry may enter, evicting that entry.
            if next_score != 0.0 && limit <= queue.len() + iterations {
                if next_dist > worst_dist {
                    continue;
                }
                if !queue.is_empty() {
                    queue.pop_max();
                    worst_dist = queue.peek_max().map_or(next_dist, |worst| worst.dist);
                }
            }
            if next_dist > worst_dist {
                worst_dist = next_dist;
            }

            let (handle, inserted) = match pool.find(&next) {
                Some(handle) => (handle, false),
                None => {
                    let handle = pool.insert(next);
                    init_dist.insert(handle, current_dist + 1.0);
                    (handle, true)
                }
            };

            if next_score < best_score {
                best_score = next_score;
                best_handle = handle;
            }

            if inserted || current_dist + 1.0 < init_dist[&handle] {
                init_dist.insert(handle, current_dist + 1.0);
                pred.insert(handle, current);
                seq += 1;
                queue.push(BeamEntry { dist: next_dist, seq, handle });
            }

            if next_score == 0.0 {
                return (create_path(&pred, &pool, handle), true);
            }
        }
    }

    (create_path(&pred, &pool, best_handle), false)
}
