//! Atomic reconfiguration steps.
//!
//! An [`Action`] bundles joint rotations and dock reconnections that happen
//! within one mechanical step. [`Action::divide`] scales the rotations for
//! temporal sub-stepping; reconnections are carried unchanged.

use std::collections::HashMap;

use enum_map::EnumMap;

use crate::{
    edge::Edge,
    math::ANGLE_EPS,
    module::{Joint, ModuleId},
};

#[derive(Copy, Clone, Debug)]
pub struct Rotate {
    pub id: ModuleId,
    pub joint: Joint,
    pub angle: f64,
}

impl Rotate {
    pub fn new(id: ModuleId, joint: Joint, angle: f64) -> Rotate {
        Rotate { id, joint, angle }
    }
}

impl PartialEq for Rotate {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.joint == other.joint
            && (self.angle - other.angle).abs() < ANGLE_EPS
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Reconnect {
    pub add: bool,
    pub edge: Edge,
}

impl Reconnect {
    pub fn join(edge: Edge) -> Reconnect {
        Reconnect { add: true, edge }
    }

    pub fn split(edge: Edge) -> Reconnect {
        Reconnect { add: false, edge }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Action {
    rotations: Vec<Rotate>,
    reconnections: Vec<Reconnect>,
}

impl Action {
    pub fn new(rotations: Vec<Rotate>, reconnections: Vec<Reconnect>) -> Action {
        Action { rotations, reconnections }
    }

    pub fn rotations(&self) -> &[Rotate] {
        &self.rotations
    }

    pub fn reconnections(&self) -> &[Reconnect] {
        &self.reconnections
    }

    pub fn is_empty(&self) -> bool {
        self.rotations.is_empty() && self.reconnections.is_empty()
    }

    /// Scales every rotation by `factor`, keeping reconnections as they are.
    pub fn divide(&self, factor: f64) -> Action {
        Action {
            rotations: self
                .rotations
                .iter()
                .map(|r| Rotate::new(r.id, r.joint, r.angle * factor))
                .collect(),
            reconnections: self.reconnections.clone(),
        }
    }
}

impl From<Rotate> for Action {
    fn from(rot: Rotate) -> Action {
        Action::new(vec![rot], vec![])
    }
}

impl From<Reconnect> for Action {
    fn from(rec: Reconnect) -> Action {
        Action::new(vec![], vec![rec])
    }
}

/// True when no `(id, joint)` pair appears twice in the rotation set.
pub fn unique(rotations: &[Rotate]) -> bool {
    let mut moved: HashMap<ModuleId, EnumMap<Joint, bool>> = HashMap::new();
    for rot in rotations {
        let joints = moved.entry(rot.id).or_default();
        if joints[rot.joint] {
            return false;
        }
        joints[rot.joint] = true;
    }
    true
}

/// All subsets of `set` with at most `count` elements, in the order induced
/// by take/skip recursion over the input (the empty subset included).
pub fn all_subsets<T: Clone>(set: &[T], count: usize) -> Vec<Vec<T>> {
    let mut res = Vec::new();
    subsets_rec(set, &mut res, Vec::new(), 0, count);
    res
}

fn subsets_rec<T: Clone>(
    set: &[T],
    res: &mut Vec<Vec<T>>,
    accum: Vec<T>,
    index: usize,
    count: usize,
) {
    if accum.len() == count || index >= set.len() {
        res.push(accum);
        return;
    }
    let mut taken = accum.clone();
    taken.push(set[index].clone());
    subsets_rec(set, res, taken, index + 1, count);
    subsets_rec(set, res, accum, index + 1, count);
}

/// Like [`all_subsets`] over rotations, but prunes any branch that would
/// touch the same `(id, joint)` twice.
pub fn all_unique_rotations(set: &[Rotate], count: usize) -> Vec<Vec<Rotate>> {
    let mut res = Vec::new();
    unique_rotations_rec(set, &mut res, Vec::new(), 0, count);
    res
}

fn unique_rotations_rec(
    set: &[Rotate],
    res: &mut Vec<Vec<Rotate>>,
    accum: Vec<Rotate>,
    index: usize,
    count: usize,
) {
    if accum.len() == count || index >= set.len() {
        res.push(accum);
        return;
    }
    let candidate = set[index];
    let clashes = accum.iter().any(|r| r.id == candidate.id && r.joint == candidate.joint);
    if !clashes {
        let mut taken = accum.clone();
        taken.push(candidate);
        unique_rotations_rec(set, res, taken, index + 1, count);
    }
    unique_rotations_rec(set, res, accum, index + 1, count);
}

#[cfg(test)]
mod tests {
    use assertables::assert_len_eq_x;

    use super::*;

    #[test]
    fn divide_scales_rotations_only() {
        let edge = Edge::all_between(0, 1).next().unwrap();
        let act = Action::new(
            vec![Rotate::new(0, Joint::Alpha, 90.0)],
            vec![Reconnect::join(edge)],
        );
        let tenth = act.divide(0.1);
        assert_eq!(tenth.rotations()[0].angle, 9.0);
        assert_eq!(tenth.reconnections(), act.reconnections());
    }

    #[test]
    fn uniqueness_rejects_repeated_joint() {
        let a = Rotate::new(0, Joint::Alpha, 90.0);
        let b = Rotate::new(0, Joint::Alpha, -90.0);
        let c = Rotate::new(0, Joint::Beta, 90.0);
        assert!(unique(&[a, c]));
        assert!(!unique(&[a, b]));
        assert!(unique(&[]));
    }

    #[test]
    fn subset_counts() {
        let vals = [1, 2, 3, 4];
        assert_len_eq_x!(all_subsets(&vals, 0), 1);
        assert_len_eq_x!(all_subsets(&vals, 1), 5);
        assert_len_eq_x!(all_subsets(&vals, 2), 11);
    }

    #[test]
    fn unique_rotation_subsets_prune_clashes() {
        let rots = [
            Rotate::new(0, Joint::Alpha, 90.0),
            Rotate::new(0, Joint::Alpha, -90.0),
            Rotate::new(0, Joint::Beta, 90.0),
            Rotate::new(1, Joint::Beta, 90.0),
        ];
        let maximal = all_unique_rotations(&rots, 3);
        // Of all take/skip outcomes only clash-free sets survive; the two
        // maximal ones pick one of the conflicting alpha rotations each.
        let full: Vec<_> = maximal.iter().filter(|s| s.len() == 3).collect();
        assert_len_eq_x!(full, 2);
    }
}
