//! Generic search over configuration space: BFS and A*.
//!
//! Explored configurations live in a pool that owns them for the life of the
//! search; frontier queues and predecessor maps refer to them by stable
//! integer handles. Lookup goes through the weak structural hash first and
//! falls back to full (approximate) equality.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, VecDeque},
};

use enum_iterator::all;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    configuration::Configuration,
    math,
    module::{Joint, Side},
};

/// Step size, in degrees, of the default successor neighborhood.
pub const DEFAULT_STEP: f64 = 90.0;

/// Stable handle of a pooled configuration.
pub type ConfigId = usize;

#[derive(Default)]
pub struct ConfigPool {
    configs: Vec<Box<Configuration>>,
    by_hash: HashMap<u64, Vec<ConfigId>>,
}

impl ConfigPool {
    pub fn new() -> ConfigPool {
        ConfigPool::default()
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn get(&self, id: ConfigId) -> &Configuration {
        &self.configs[id]
    }

    pub fn find(&self, config: &Configuration) -> Option<ConfigId> {
        self.by_hash
            .get(&config.structural_hash())?
            .iter()
            .copied()
            .find(|id| *self.configs[*id] == *config)
    }

    pub fn contains(&self, config: &Configuration) -> bool {
        self.find(config).is_some()
    }

    /// Inserts the configuration, or returns the handle of an equal one
    /// already pooled.
    pub fn insert(&mut self, config: Configuration) -> ConfigId {
        if let Some(existing) = self.find(&config) {
            return existing;
        }
        let id = self.configs.len();
        self.by_hash.entry(config.structural_hash()).or_default().push(id);
        self.configs.push(Box::new(config));
        id
    }
}

/// Walks the predecessor map back from `goal` and returns the configurations
/// along the way, start first.
pub fn create_path(
    pred: &HashMap<ConfigId, ConfigId>,
    pool: &ConfigPool,
    goal: ConfigId,
) -> Vec<Configuration> {
    let mut res = Vec::new();
    let mut current = goal;
    while pred[&current] != current {
        res.push(pool.get(current).clone());
        current = pred[&current];
    }
    res.push(pool.get(current).clone());
    res.reverse();
    res
}

/// Breadth-first search from `init` to `goal` over single-step actions.
/// Returns `None` when the reachable component does not contain the goal.
pub fn bfs(init: &Configuration, goal: &Configuration, step: f64) -> Option<Vec<Configuration>> {
    if init == goal {
        return Some(vec![init.clone()]);
    }
    let mut pool = ConfigPool::new();
    let mut pred: HashMap<ConfigId, ConfigId> = HashMap::new();

    let start = pool.insert(init.clone());
    pred.insert(start, start);

    let mut queue = VecDeque::from([start]);
    while let Some(current) = queue.pop_front() {
        let successors = pool.get(current).successors(step, 1);
        for next in successors {
            if pool.contains(&next) {
                continue;
            }
            let handle = pool.insert(next);
            pred.insert(handle, current);
            if pool.get(handle) == goal {
                return Some(create_path(&pred, &pool, handle));
            }
            queue.push_back(handle);
        }
    }
    None
}

/// Heuristics for [`astar`]. None of them is admissible; the search
/// guarantees reachability, not optimality.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Heuristic {
    /// Constant one; degenerates to a cheaper BFS ordering.
    Trivial,
    /// Sum of absolute per-joint angle differences.
    JointDiff,
    /// Sum of distances between corresponding shoe centers.
    #[default]
    CenterDiff,
    /// Sum of distances between corresponding shoe transforms.
    MatrixDiff,
}

impl Heuristic {
    /// Both configurations must be prepared when the heuristic reads shoe
    /// transforms.
    pub fn eval(&self, current: &Configuration, goal: &Configuration) -> f64 {
        match self {
            Heuristic::Trivial => 1.0,
            Heuristic::JointDiff => current
                .modules()
                .iter()
                .map(|(id, module)| {
                    let other = goal.module(*id);
                    all::<Joint>()
                        .map(|j| (module.joint(j) - other.joint(j)).abs())
                        .sum::<f64>()
                })
                .sum(),
            Heuristic::CenterDiff => current
                .modules()
                .keys()
                .map(|id| {
                    all::<Side>()
                        .map(|s| {
                            math::center_distance(current.matrix(*id, s), goal.matrix(*id, s))
                        })
                        .sum::<f64>()
                })
                .sum(),
            Heuristic::MatrixDiff => current
                .modules()
                .keys()
                .map(|id| {
                    all::<Side>()
                        .map(|s| {
                            math::matrix_distance(current.matrix(*id, s), goal.matrix(*id, s))
                        })
                        .sum::<f64>()
                })
                .sum(),
        }
    }
}

struct QueueEntry {
    value: f64,
    seq: u64,
    handle: ConfigId,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse into min ordering, breaking value
        // ties by insertion order.
        self.value
            .total_cmp(&other.value)
            .then_with(|| self.seq.cmp(&other.seq))
            .reverse()
    }
}

/// A* from `init` to `goal` with `f = g + h`.
pub fn astar(
    init: &Configuration,
    goal: &Configuration,
    step: f64,
    heuristic: Heuristic,
) -> Option<Vec<Configuration>> {
    if init == goal {
        return Some(vec![init.clone()]);
    }
    let mut pool = ConfigPool::new();
    let mut pred: HashMap<ConfigId, ConfigId> = HashMap::new();
    let mut cost: HashMap<ConfigId, f64> = HashMap::new();

    let start = pool.insert(init.clone());
    pred.insert(start, start);
    cost.insert(start, 0.0);

    let mut seq = 0u64;
    let mut queue = BinaryHeap::new();
    queue.push(QueueEntry { value: heuristic.eval(init, goal), seq, handle: start });

    while let Some(QueueEntry { handle: current, .. }) = queue.pop() {
        let current_cost = cost[&current];
        let successors = pool.get(current).successors(step, 1);
        debug!(target: "search", "expanding {current} ({} successors)", successors.len());
        for next in successors {
            if pool.contains(&next) {
                continue;
            }
            let value = current_cost + 1.0 + heuristic.eval(&next, goal);
            let handle = pool.insert(next);
            pred.insert(handle, current);
            cost.insert(handle, current_cost + 1.0);
            if pool.get(handle) == goal {
                return Some(create_path(&pred, &pool, handle));
            }
            seq += 1;
            queue.push(QueueEntry { value, seq, handle });
        }
    }
    None
}
