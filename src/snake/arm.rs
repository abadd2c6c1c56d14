//! Arm connection: bringing two subtree tips together and closing an edge.
//!
//! The routine first carves working space around the midpoint of the two
//! subtrees, then runs a paralyzed beam search that may only move modules of
//! those subtrees until the desired connector faces meet, and finally closes
//! the edge. Its counterpart cuts a branching edge afterwards so that module
//! degrees return to a chain.

use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::{
    action::Reconnect,
    configuration::{Configuration, EdgeSlots},
    edge::{Dock, Edge, dock_index},
    generators::{PairRotationGen, ParalyzedRotationGen},
    math::Vector,
    module::{ModuleId, Side},
    score::{ConnectorDistance, EdgeSpace},
    snake::beam::limited_astar,
};

/// Collects `subroot` and all its spanning descendants into `out`.
pub fn add_subtree(
    subroot: ModuleId,
    out: &mut HashSet<ModuleId>,
    spanning_succ: &BTreeMap<ModuleId, EdgeSlots>,
) {
    let mut bag = VecDeque::from([subroot]);
    while let Some(curr) = bag.pop_front() {
        out.insert(curr);
        for edge in spanning_succ[&curr].iter().flatten() {
            bag.push_back(edge.id2);
        }
    }
}

pub fn subtree_modules(
    config: &Configuration,
    subroot1: ModuleId,
    subroot2: ModuleId,
) -> HashSet<ModuleId> {
    let mut out = HashSet::new();
    add_subtree(subroot1, &mut out, config.spanning_succ());
    add_subtree(subroot2, &mut out, config.spanning_succ());
    out
}

pub fn subtree_mass_center(config: &Configuration, subroot: ModuleId) -> Vector {
    let mut subtree = HashSet::new();
    add_subtree(subroot, &mut subtree, config.spanning_succ());
    let mut mass = Vector::zeros();
    for id in &subtree {
        let ms = &config.matrices()[id];
        mass += crate::math::center(&ms[0]);
        mass += crate::math::center(&ms[1]);
    }
    mass /= (subtree.len() * 2) as f64;
    mass[3] = 1.0;
    mass
}

/// Beam stage that pushes everything outside the two subtrees away from
/// their midpoint.
pub fn make_edge_space(
    init: &Configuration,
    subroot1: ModuleId,
    subroot2: ModuleId,
) -> Vec<Configuration> {
    let mass1 = subtree_mass_center(init, subroot1);
    let mass2 = subtree_mass_center(init, subroot2);
    let midpoint = (mass1 + mass2) / 2.0;
    let subtrees = subtree_modules(init, subroot1, subroot2);

    let mut score = EdgeSpace::new(midpoint, subtrees);
    let limit = 2 * init.module_count();
    limited_astar(init, &PairRotationGen, &mut score, limit).0
}

/// Carves space, steers the two subtree tips together and closes
/// `connection`. On success the returned path ends one step after the join.
pub fn connect_arm(
    init: &Configuration,
    connection: Edge,
    subroot1: ModuleId,
    subroot2: ModuleId,
) -> (Vec<Configuration>, bool) {
    let mut path = make_edge_space(init, subroot1, subroot2);
    let allowed = subtree_modules(init, subroot1, subroot2);

    let steer = ParalyzedRotationGen::new(allowed);
    let mut score = ConnectorDistance::new(connection);
    let limit = init.module_count();

    let (steer_path, found) = limited_astar(path.last().unwrap(), &steer, &mut score, limit);
    extend_dedup(&mut path, steer_path);
    if !found {
        return (path, false);
    }

    let joined = path
        .last()
        .unwrap()
        .execute_if_valid(&Reconnect::join(connection).into())
        .expect("a zero-distance connection must be joinable");
    path.push(joined);
    (path, true)
}

/// Appends a path fragment, dropping elements equal to the current tail.
pub fn extend_dedup(path: &mut Vec<Configuration>, fragment: Vec<Configuration>) {
    for config in fragment {
        if path.last() != Some(&config) {
            path.push(config);
        }
    }
}

/// After a join created a cycle, walks from the joined edge towards the root
/// and cuts the first edge entering a module of degree greater than two (or
/// the walk's last edge), restoring a chain-like degree profile.
pub fn disjoin_arm(init: &Configuration, added: &Edge) -> Configuration {
    let root = init.fixed_id();
    let mut curr = added.id2;
    let mut prev = added.id1;
    if curr == root {
        std::mem::swap(&mut curr, &mut prev);
    }

    let mut to_remove: Option<Edge> = None;
    while to_remove.is_none() && curr != root {
        let edges = init.edges_of(curr);
        if edges.len() > 2 {
            to_remove = edges.into_iter().find(|e| e.id2 == prev);
            break;
        }
        let onward = edges
            .into_iter()
            .find(|e| e.id2 != prev)
            .expect("arm walk must continue until a branching module or the root");
        prev = curr;
        curr = onward.id2;
    }
    let to_remove = to_remove
        .or_else(|| init.edges_of(curr).into_iter().find(|e| e.id2 == prev))
        .expect("arm walk must find an edge to cut");

    init.execute_if_valid(&Reconnect::split(to_remove).into())
        .expect("cutting a branching edge must keep the configuration valid")
}

/// Follows the snake from the freshly added edge and returns the first edge
/// that repeats a side (a parity break), along with the walk length.
pub fn strict_disjoin_edge(config: &Configuration, added: &Edge) -> (Edge, usize) {
    let module_count = config.matrices().len();
    let mut curr = added.id2;
    let mut curr_side = added.side2;
    let mut prev = added.id1;
    for len in 0..=module_count {
        let next = config
            .edges_of(curr)
            .into_iter()
            .find(|e| e.id2 != prev)
            .expect("parity walk ran off the snake");
        if next.side1 == curr_side {
            return (next, len);
        }
        prev = curr;
        curr = next.id2;
        curr_side = next.side2;
    }
    panic!("no parity break within the snake; was the parity already fixed?");
}

/// First free dock on the given shoe, preferring Z-, then X+, then X-.
pub fn empty_conn(config: &Configuration, id: ModuleId, side: Side) -> Dock {
    if config.edge_slots(id)[dock_index(side, Dock::ZMinus)].is_none() {
        Dock::ZMinus
    } else if config.edge_slots(id)[dock_index(side, Dock::XPlus)].is_none() {
        Dock::XPlus
    } else {
        Dock::XMinus
    }
}

#[cfg(test)]
mod tests {
    use assertables::assert_set_eq;

    use super::*;
    use crate::edge::Ori;

    fn star() -> Configuration {
        // Module 0 in the middle, 1..=3 hanging off distinct docks.
        let mut cfg = Configuration::new();
        for id in 0..4 {
            cfg.add_module(0.0, 0.0, 0.0, id);
        }
        assert!(cfg.add_edge(Edge::new(
            0,
            Side::A,
            Dock::ZMinus,
            Ori::North,
            Dock::ZMinus,
            Side::A,
            1
        )));
        assert!(cfg.add_edge(Edge::new(
            0,
            Side::B,
            Dock::ZMinus,
            Ori::North,
            Dock::ZMinus,
            Side::A,
            2
        )));
        assert!(cfg.add_edge(Edge::new(
            0,
            Side::A,
            Dock::XPlus,
            Ori::North,
            Dock::ZMinus,
            Side::A,
            3
        )));
        assert!(cfg.is_valid());
        cfg
    }

    #[test]
    fn subtrees_cover_their_descendants() {
        let cfg = star();
        let mut seen = HashSet::new();
        add_subtree(0, &mut seen, cfg.spanning_succ());
        assert_set_eq!(seen, HashSet::<ModuleId>::from([0, 1, 2, 3]));

        let leaves = subtree_modules(&cfg, 1, 2);
        assert_set_eq!(leaves, HashSet::<ModuleId>::from([1, 2]));
    }

    #[test]
    fn subtree_mass_of_a_leaf_is_its_module_mass() {
        let cfg = star();
        let mass = subtree_mass_center(&cfg, 3);
        assert_eq!(mass, cfg.module_mass(3));
    }

    #[test]
    fn empty_conn_prefers_z_minus() {
        let cfg = star();
        // Module 0 side A has Z- and X+ taken, side B only Z-.
        assert_eq!(empty_conn(&cfg, 0, Side::A), Dock::XMinus);
        assert_eq!(empty_conn(&cfg, 0, Side::B), Dock::XPlus);
        assert_eq!(empty_conn(&cfg, 1, Side::B), Dock::ZMinus);
    }
}
