//! Edges: rigid connections between two docking faces.
//!
//! An edge names both connector endpoints `(id, side, dock)` plus the
//! orientation of the mating faces. Edges are symmetric under [`Edge::reversed`]
//! and enumerable in a fixed lexicographic order (see [`Edge::next`]), which
//! makes successor generation deterministic.

use enum_iterator::Sequence;
use enum_map::{Enum, EnumMap};

use crate::{
    math::{self, Matrix},
    module::{ModuleId, Side},
};

/// A docking face of one shoe.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[derive(Sequence, Enum)]
pub enum Dock {
    XPlus,
    XMinus,
    ZMinus,
}

/// Relative orientation of two mated faces, in quarter turns.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[derive(Sequence, Enum)]
pub enum Ori {
    North,
    East,
    South,
    West,
}

/// Slot of a connector within a module's six-entry edge table.
pub fn dock_index(side: Side, dock: Dock) -> usize {
    side.index() * 3 + dock as usize
}

pub const DOCK_COUNT: usize = 6;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Edge {
    pub id1: ModuleId,
    pub side1: Side,
    pub dock1: Dock,
    pub ori: Ori,
    pub dock2: Dock,
    pub side2: Side,
    pub id2: ModuleId,
}

impl Edge {
    pub fn new(
        id1: ModuleId,
        side1: Side,
        dock1: Dock,
        ori: Ori,
        dock2: Dock,
        side2: Side,
        id2: ModuleId,
    ) -> Edge {
        Edge { id1, side1, dock1, ori, dock2, side2, id2 }
    }

    /// The same connection seen from the other endpoint.
    pub fn reversed(&self) -> Edge {
        Edge {
            id1: self.id2,
            side1: self.side2,
            dock1: self.dock2,
            ori: self.ori,
            dock2: self.dock1,
            side2: self.side1,
            id2: self.id1,
        }
    }

    /// Table slot of endpoint 1.
    pub fn index1(&self) -> usize {
        dock_index(self.side1, self.dock1)
    }

    /// Table slot of endpoint 2.
    pub fn index2(&self) -> usize {
        dock_index(self.side2, self.dock2)
    }

    /// The successor in lexicographic order over `(side1, dock1, ori, dock2,
    /// side2)` with bases `(2, 3, 4, 3, 2)`, incrementing the lowest digit
    /// first. Returns `None` once the enumeration would wrap back to the
    /// all-zero tuple.
    pub fn next(&self) -> Option<Edge> {
        const BASES: [u8; 5] = [2, 3, 4, 3, 2];
        let mut digits = [
            self.side1 as u8,
            self.dock1 as u8,
            self.ori as u8,
            self.dock2 as u8,
            self.side2 as u8,
        ];
        for (digit, base) in digits.iter_mut().zip(BASES) {
            if *digit + 1 < base {
                *digit += 1;
                break;
            }
            *digit = 0;
        }
        if digits == [0; 5] {
            return None;
        }
        Some(Edge {
            id1: self.id1,
            side1: Enum::from_usize(digits[0] as usize),
            dock1: Enum::from_usize(digits[1] as usize),
            ori: Enum::from_usize(digits[2] as usize),
            dock2: Enum::from_usize(digits[3] as usize),
            side2: Enum::from_usize(digits[4] as usize),
            id2: self.id2,
        })
    }

    /// Enumerates all 144 candidate edges between two modules, starting at
    /// the all-zero tuple.
    pub fn all_between(id1: ModuleId, id2: ModuleId) -> impl Iterator<Item = Edge> {
        let first = Edge::new(id1, Side::A, Dock::XPlus, Ori::North, Dock::XPlus, Side::A, id2);
        std::iter::successors(Some(first), Edge::next)
    }
}

/// Relative pose across an edge: maps the frame of side 1 to the frame of
/// side 2 of the connected shoe.
pub fn transform_connection(dock1: Dock, ori: Ori, dock2: Dock) -> Matrix {
    use std::f64::consts::{FRAC_PI_2, PI};

    let dock_face_up: EnumMap<Dock, Matrix> = EnumMap::from_fn(|d| match d {
        Dock::XPlus => math::rotate_z(PI) * math::rotate_y(-FRAC_PI_2),
        Dock::XMinus => math::rotate_z(PI) * math::rotate_y(FRAC_PI_2),
        Dock::ZMinus => math::identity(),
    });
    let face_to_dock: EnumMap<Dock, Matrix> = EnumMap::from_fn(|d| match d {
        Dock::XPlus => math::rotate_z(PI) * math::rotate_y(FRAC_PI_2),
        Dock::XMinus => math::rotate_z(PI) * math::rotate_y(-FRAC_PI_2),
        Dock::ZMinus => math::identity(),
    });

    face_to_dock[dock1]
        * math::rotate_z(ori as usize as f64 * FRAC_PI_2)
        * math::translate_z(-1.0)
        * dock_face_up[dock2]
        * math::rotate_x(PI)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use assertables::assert_len_eq_x;

    use super::*;

    #[test]
    fn reversal_is_involutive() {
        let e = Edge::new(0, Side::A, Dock::XPlus, Ori::East, Dock::ZMinus, Side::B, 1);
        assert_eq!(e.reversed().reversed(), e);
        assert_eq!(e.reversed().index1(), e.index2());
    }

    #[test]
    fn dock_indices_cover_the_table() {
        let mut seen = HashSet::new();
        for side in enum_iterator::all::<Side>() {
            for dock in enum_iterator::all::<Dock>() {
                seen.insert(dock_index(side, dock));
            }
        }
        assert_eq!(seen, (0..DOCK_COUNT).collect::<HashSet<_>>());
    }

    #[test]
    fn enumeration_visits_all_144_edges() {
        let edges: Vec<Edge> = Edge::all_between(0, 1).collect();
        assert_len_eq_x!(&edges, 2 * 3 * 4 * 3 * 2);
        let distinct: HashSet<Edge> = edges.iter().copied().collect();
        assert_len_eq_x!(distinct, edges.len());
        // Lowest digit first: the second tuple differs in side1 only.
        assert_eq!(
            edges[1],
            Edge::new(0, Side::B, Dock::XPlus, Ori::North, Dock::XPlus, Side::A, 1)
        );
    }

    #[test]
    fn connection_transform_is_unit_length() {
        for e in Edge::all_between(0, 1) {
            let m = transform_connection(e.dock1, e.ori, e.dock2);
            let c = math::center(&m);
            assert_eq!(math::distance(&c, &math::center(&math::identity())), 1.0);
        }
    }
}
