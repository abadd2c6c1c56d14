//! Seeded random configuration generation, mainly for tests and demos.
//!
//! All entry points take an explicit RNG so that sampling is reproducible
//! from a seed.

use std::collections::HashMap;

use enum_map::Enum;
use rand::{Rng, seq::SliceRandom};

use crate::{
    configuration::Configuration,
    edge::{DOCK_COUNT, Dock, Edge, Ori},
    module::{ModuleId, Side},
};

/// Joint angle step used when sampling; everything lands on the 90 degree
/// grid the planners operate on.
const ANGLE_STEP: f64 = 90.0;

const VALIDITY_ATTEMPTS: usize = 1000;

fn free_index(start: usize, free: &[bool; DOCK_COUNT]) -> Option<usize> {
    (0..DOCK_COUNT).map(|offset| (start + offset) % DOCK_COUNT).find(|i| free[*i])
}

/// Picks a random edge between two modules on docks still free in
/// `occupancy`, marking the chosen docks taken.
pub fn generate_edge(
    id1: ModuleId,
    id2: ModuleId,
    occupancy: &mut HashMap<ModuleId, [bool; DOCK_COUNT]>,
    rng: &mut impl Rng,
) -> Option<Edge> {
    let index1 = free_index(rng.gen_range(0..DOCK_COUNT), occupancy.get(&id1)?)?;
    let index2 = free_index(rng.gen_range(0..DOCK_COUNT), occupancy.get(&id2)?)?;
    occupancy.get_mut(&id1)?[index1] = false;
    occupancy.get_mut(&id2)?[index2] = false;

    let side1: Side = Enum::from_usize(index1 / 3);
    let dock1: Dock = Enum::from_usize(index1 % 3);
    let side2: Side = Enum::from_usize(index2 / 3);
    let dock2: Dock = Enum::from_usize(index2 % 3);
    let ori: Ori = Enum::from_usize(rng.gen_range(0..4));
    Some(Edge::new(id1, side1, dock1, ori, dock2, side2, id2))
}

/// Rejection-samples joint angles for a fixed edge skeleton until the
/// configuration validates; `None` after the attempt budget runs out.
pub fn generate_angles(
    ids: &[ModuleId],
    edges: &[Edge],
    rng: &mut impl Rng,
) -> Option<Configuration> {
    for _ in 0..VALIDITY_ATTEMPTS {
        let mut cfg = Configuration::new();
        for id in ids {
            let alpha = ANGLE_STEP * f64::from(rng.gen_range(-1..=1));
            let beta = ANGLE_STEP * f64::from(rng.gen_range(-1..=1));
            let gamma = ANGLE_STEP * f64::from(rng.gen_range(0..4));
            cfg.add_module(alpha, beta, gamma, *id);
        }
        for edge in edges {
            if !cfg.add_edge(*edge) {
                return None;
            }
        }
        if cfg.is_valid() {
            return Some(cfg);
        }
    }
    None
}

/// Samples a random connected, collision-free configuration over the given
/// module ids: a random spanning-edge skeleton plus rejection-sampled
/// angles.
pub fn sample_free(ids: &[ModuleId], rng: &mut impl Rng) -> Option<Configuration> {
    if ids.is_empty() {
        return None;
    }
    let mut shuffled = ids.to_vec();
    shuffled.shuffle(rng);

    let mut occupancy: HashMap<ModuleId, [bool; DOCK_COUNT]> =
        HashMap::from([(shuffled[0], [true; DOCK_COUNT])]);
    let mut edges = Vec::new();
    for i in 1..shuffled.len() {
        let id1 = shuffled[i];
        let id2 = shuffled[rng.gen_range(0..i)];
        occupancy.insert(id1, [true; DOCK_COUNT]);
        edges.push(generate_edge(id1, id2, &mut occupancy, rng)?);
    }
    generate_angles(ids, &edges, rng)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn sampling_is_deterministic_for_a_seed() {
        let ids = [0, 1, 2];
        let a = sample_free(&ids, &mut StdRng::seed_from_u64(7));
        let b = sample_free(&ids, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn sampled_configurations_validate() {
        let ids = [0, 1, 2, 3];
        for seed in 0..8 {
            if let Some(mut cfg) = sample_free(&ids, &mut StdRng::seed_from_u64(seed)) {
                assert!(cfg.is_valid());
                assert_eq!(cfg.ids(), ids.to_vec());
            }
        }
    }

    #[test]
    fn single_module_always_samples() {
        let cfg = sample_free(&[5], &mut StdRng::seed_from_u64(1)).expect("one module is valid");
        assert_eq!(cfg.ids(), vec![5]);
    }
}
