//! Successor generators for the staged planner.
//!
//! The generic search uses [`Configuration::successors`] with the full action
//! set; the snake planner's beam stages move through rotation-only
//! neighborhoods instead. Three flavors exist: single rotations, rotation
//! pairs within one module, and the "paralyzed" variant that only moves a
//! chosen subset of modules.

use std::collections::HashSet;

use enum_iterator::all;
use itertools::Itertools;

use crate::{
    action::{Action, Rotate},
    configuration::Configuration,
    module::{Joint, ModuleId},
};

pub trait NextGen {
    fn next(&self, config: &Configuration, step: f64) -> Vec<Configuration>;
}

fn feasible_rotations(
    config: &Configuration,
    step: f64,
    allowed: Option<&HashSet<ModuleId>>,
) -> Vec<Rotate> {
    config
        .generate_rotations(step)
        .into_iter()
        .filter(|rot| allowed.is_none_or(|ids| ids.contains(&rot.id)))
        .collect()
}

fn apply_all(config: &Configuration, actions: &[Action]) -> Vec<Configuration> {
    actions.iter().filter_map(|action| config.execute_if_valid(action)).collect()
}

/// One ±step rotation per successor.
pub struct SingleRotationGen;

impl NextGen for SingleRotationGen {
    fn next(&self, config: &Configuration, step: f64) -> Vec<Configuration> {
        let actions: Vec<Action> = feasible_rotations(config, step, None)
            .into_iter()
            .map(Action::from)
            .collect();
        apply_all(config, &actions)
    }
}

/// Single rotations plus simultaneous rotations of two distinct joints of
/// one module; richer motions than [`SingleRotationGen`] while keeping the
/// branching factor linear in the module count.
pub struct PairRotationGen;

impl NextGen for PairRotationGen {
    fn next(&self, config: &Configuration, step: f64) -> Vec<Configuration> {
        let actions = pair_rotation_actions(config, step, None);
        apply_all(config, &actions)
    }
}

/// Like [`PairRotationGen`] but restricted to an allowed module set; every
/// other module stays frozen.
pub struct ParalyzedRotationGen {
    allowed: HashSet<ModuleId>,
}

impl ParalyzedRotationGen {
    pub fn new(allowed: HashSet<ModuleId>) -> ParalyzedRotationGen {
        ParalyzedRotationGen { allowed }
    }
}

impl NextGen for ParalyzedRotationGen {
    fn next(&self, config: &Configuration, step: f64) -> Vec<Configuration> {
        let actions = pair_rotation_actions(config, step, Some(&self.allowed));
        apply_all(config, &actions)
    }
}

fn pair_rotation_actions(
    config: &Configuration,
    step: f64,
    allowed: Option<&HashSet<ModuleId>>,
) -> Vec<Action> {
    let singles = feasible_rotations(config, step, allowed);
    let mut actions: Vec<Action> = singles.iter().copied().map(Action::from).collect();

    let ids: Vec<ModuleId> = config
        .modules()
        .keys()
        .filter(|id| allowed.is_none_or(|a| a.contains(*id)))
        .copied()
        .collect();
    for id in ids {
        for (j1, j2) in all::<Joint>().tuple_combinations() {
            for d1 in [-step, step] {
                for d2 in [-step, step] {
                    let first = Rotate::new(id, j1, d1);
                    let second = Rotate::new(id, j2, d2);
                    if singles.contains(&first) && singles.contains(&second) {
                        actions.push(Action::new(vec![first, second], vec![]));
                    }
                }
            }
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use assertables::{assert_all, assert_len_eq_x};

    use super::*;

    fn single_module() -> Configuration {
        let mut cfg = Configuration::new();
        cfg.add_module(0.0, 0.0, 0.0, 0);
        assert!(cfg.is_valid());
        cfg
    }

    #[test]
    fn single_gen_yields_one_rotation_per_joint_direction() {
        let cfg = single_module();
        let next = SingleRotationGen.next(&cfg, 90.0);
        assert_len_eq_x!(&next, 6);
        assert_all!(next.iter(), |n: &Configuration| *n != cfg);
    }

    #[test]
    fn pair_gen_extends_single_gen() {
        let cfg = single_module();
        let singles = SingleRotationGen.next(&cfg, 90.0);
        let pairs = PairRotationGen.next(&cfg, 90.0);
        // 6 singles plus 3 joint pairs with 4 sign choices each.
        assert_len_eq_x!(pairs, singles.len() + 12);
    }

    #[test]
    fn paralyzed_gen_freezes_other_modules() {
        let mut cfg = Configuration::new();
        cfg.add_module(0.0, 0.0, 0.0, 0);
        cfg.add_module(0.0, 0.0, 0.0, 1);
        assert!(cfg.add_edge(crate::edge::Edge::new(
            0,
            crate::module::Side::B,
            crate::edge::Dock::ZMinus,
            crate::edge::Ori::North,
            crate::edge::Dock::ZMinus,
            crate::module::Side::A,
            1,
        )));
        assert!(cfg.is_valid());

        let generator = ParalyzedRotationGen::new(HashSet::from([1]));
        let next = generator.next(&cfg, 90.0);
        assert!(!next.is_empty());
        assert_all!(next.iter(), |n: &Configuration| {
            let module = n.module(0);
            enum_iterator::all::<Joint>().all(|j| module.joint(j) == 0.0)
        });
    }
}
