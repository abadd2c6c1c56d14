//! Heuristic scorers for the staged planner.
//!
//! A score is a non-negative figure of demerit over a prepared configuration;
//! beam search drives it toward zero. None of these are admissible in the
//! A* sense; they only steer exploration.

use std::collections::HashSet;

use crate::{
    configuration::Configuration,
    edge::Edge,
    grid::SpaceGrid,
    math::{self, Vector},
    module::ModuleId,
};

/// Division guard: a coincident pair still contributes a finite repulsion.
const MIN_DIST: f64 = 0.001;

pub trait Score {
    fn score(&mut self, config: &Configuration) -> f64;
}

/// Sum of inverse distances from the mass center; low when the assembly is
/// spread out.
pub struct MassRepulsion;

impl Score for MassRepulsion {
    fn score(&mut self, config: &Configuration) -> f64 {
        let mass = config.mass_center();
        let mut sum = 0.0;
        for id in config.matrices().keys() {
            let dist = math::distance(&mass, &config.module_mass(*id)).max(MIN_DIST);
            sum += 1.0 / dist;
        }
        sum
    }
}

/// Sum of inverse distances from the fixed module; pushes subtrees away from
/// the root.
pub struct RootRepulsion;

impl Score for RootRepulsion {
    fn score(&mut self, config: &Configuration) -> f64 {
        let root = config.module_mass(config.fixed_id());
        let mut sum = 0.0;
        for id in config.matrices().keys() {
            if *id == config.fixed_id() {
                continue;
            }
            let dist = math::distance(&root, &config.module_mass(*id)).max(MIN_DIST);
            sum += 1.0 / dist;
        }
        sum
    }
}

/// Repulsion of all modules outside two chosen subtrees from the midpoint
/// between them; carves working space for a new connection.
pub struct EdgeSpace {
    midpoint: Vector,
    subtrees: HashSet<ModuleId>,
}

impl EdgeSpace {
    pub fn new(midpoint: Vector, subtrees: HashSet<ModuleId>) -> EdgeSpace {
        EdgeSpace { midpoint, subtrees }
    }
}

impl Score for EdgeSpace {
    fn score(&mut self, config: &Configuration) -> f64 {
        let mut sum = 0.0;
        for (id, ms) in config.matrices() {
            if self.subtrees.contains(id) {
                continue;
            }
            for m in ms {
                let dist = math::dist_to_point(m, &self.midpoint).max(MIN_DIST);
                sum += 1.0 / dist;
            }
        }
        sum
    }
}

/// Inverse of the largest pairwise module distance; minimized by
/// straightening the assembly.
pub struct FurthestPoints;

impl Score for FurthestPoints {
    fn score(&mut self, config: &Configuration) -> f64 {
        let ids: Vec<ModuleId> = config.matrices().keys().copied().collect();
        if ids.len() < 2 {
            return 0.0;
        }
        let mut max = -1.0f64;
        for (i, id1) in ids.iter().enumerate() {
            for id2 in &ids[i + 1..] {
                let dist =
                    math::sq_distance(&config.module_mass(*id1), &config.module_mass(*id2));
                max = max.max(dist);
            }
        }
        1.0 / max
    }
}

/// Distance of a desired connection from closing, weighted by a congestion
/// penalty around the wanted endpoint pose. Exactly zero once the connector
/// faces meet.
pub struct ConnectorDistance {
    connection: Edge,
}

impl ConnectorDistance {
    pub fn new(connection: Edge) -> ConnectorDistance {
        ConnectorDistance { connection }
    }

    fn penalty(&self, config: &Configuration, wanted: &math::Matrix) -> f64 {
        let mut penalty = 0.0;
        for (id, ms) in config.matrices() {
            if *id == self.connection.id2 {
                continue;
            }
            for m in ms {
                let dist = math::center_sq_distance(m, wanted);
                if dist < 1.0 {
                    penalty += 10.0;
                } else if dist <= 3.0 {
                    penalty += 1.0;
                }
            }
        }
        penalty
    }
}

impl Score for ConnectorDistance {
    fn score(&mut self, config: &Configuration) -> f64 {
        if config.find_edge(&self.connection) {
            return 0.0;
        }
        let real =
            *config.matrix(self.connection.id2, self.connection.side2);
        let wanted = config.compute_connected_matrix(&self.connection);
        self.penalty(config, &wanted) * math::sq_matrix_distance(&real, &wanted)
    }
}

/// Occupancy-grid score: distance from the fully aerated state, where every
/// shoe-adjacent lattice cell is free.
pub struct SpaceGridScore {
    grid: SpaceGrid,
    module_count: i64,
}

impl SpaceGridScore {
    pub fn new(module_count: usize) -> SpaceGridScore {
        SpaceGridScore { grid: SpaceGrid::new(module_count), module_count: module_count as i64 }
    }

    pub fn freeness(&mut self, config: &Configuration) -> i64 {
        self.grid.freeness(config)
    }
}

impl Score for SpaceGridScore {
    fn score(&mut self, config: &Configuration) -> f64 {
        (self.module_count * 8 + 2 - self.grid.freeness(config)) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        edge::{Dock, Ori},
        module::Side,
    };

    fn straight_pair() -> Configuration {
        let mut cfg = Configuration::new();
        cfg.add_module(0.0, 0.0, 0.0, 0);
        cfg.add_module(0.0, 0.0, 0.0, 1);
        assert!(cfg.add_edge(Edge::new(
            0,
            Side::B,
            Dock::ZMinus,
            Ori::North,
            Dock::ZMinus,
            Side::A,
            1
        )));
        assert!(cfg.is_valid());
        cfg
    }

    #[test]
    fn space_grid_score_is_zero_when_straight() {
        let cfg = straight_pair();
        let mut score = SpaceGridScore::new(cfg.module_count());
        assert_eq!(score.score(&cfg), 0.0);
    }

    #[test]
    fn connector_distance_is_zero_for_present_edge() {
        let cfg = straight_pair();
        let edge = cfg.edges_of(0)[0];
        let mut score = ConnectorDistance::new(edge);
        assert_eq!(score.score(&cfg), 0.0);
    }

    #[test]
    fn repulsion_scores_are_finite_and_positive() {
        let cfg = straight_pair();
        assert!(MassRepulsion.score(&cfg) > 0.0);
        assert!(RootRepulsion.score(&cfg) > 0.0);
        assert!(FurthestPoints.score(&cfg) > 0.0);
        assert!(MassRepulsion.score(&cfg).is_finite());
    }
}
