//! Dense 3-D occupancy grid over the lattice of shoe centers.
//!
//! The grid has side `4n + 1` cells at unit resolution, centered on the world
//! origin; it accepts coordinates in `[-2n + 1, 2n - 1]`, which covers any
//! assembly of `n` modules anchored at the origin. Cells hold either nothing,
//! a one-shot "counted" marker used while scoring freeness, or the id of the
//! occupying module.

use crate::{
    configuration::Configuration,
    math::{self, Matrix},
    module::ModuleId,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Cell {
    Empty,
    Counted,
    Occupied(ModuleId),
}

/// Shoe center snapped to the unit lattice.
pub fn lattice_center(m: &Matrix) -> (i64, i64, i64) {
    let c = math::center(m);
    (c[0].round() as i64, c[1].round() as i64, c[2].round() as i64)
}

pub struct SpaceGrid {
    module_count: i64,
    side: usize,
    cells: Vec<Cell>,
}

impl SpaceGrid {
    pub fn new(module_count: usize) -> SpaceGrid {
        let side = 4 * module_count + 1;
        SpaceGrid {
            module_count: module_count as i64,
            side,
            cells: vec![Cell::Empty; side * side * side],
        }
    }

    pub fn in_grid(&self, x: i64, y: i64, z: i64) -> bool {
        self.in_range(x) && self.in_range(y) && self.in_range(z)
    }

    fn in_range(&self, c: i64) -> bool {
        c < 2 * self.module_count && c > -2 * self.module_count
    }

    pub fn cell(&self, x: i64, y: i64, z: i64) -> Cell {
        self.cells[self.index(x, y, z)]
    }

    pub fn set_cell(&mut self, x: i64, y: i64, z: i64, cell: Cell) {
        let i = self.index(x, y, z);
        self.cells[i] = cell;
    }

    fn index(&self, x: i64, y: i64, z: i64) -> usize {
        assert!(self.in_grid(x, y, z), "coordinates ({x}, {y}, {z}) out of grid");
        let x = (x + 2 * self.module_count) as usize;
        let y = (y + 2 * self.module_count) as usize;
        let z = (z + 2 * self.module_count) as usize;
        x * self.side * self.side + y * self.side + z
    }

    /// Number of empty (or out-of-grid) cells face-adjacent to the assembly.
    ///
    /// Fills occupied cells from the configuration's matrices, visits the six
    /// face neighbors of every occupied cell counting each free neighbor once
    /// (marking it [`Cell::Counted`]), then cleans the markers back up.
    pub fn freeness(&mut self, config: &Configuration) -> i64 {
        self.fill(config);
        let mut freeness = 0;
        for (x, y, z) in shoe_cells(config) {
            for (dx, dy, dz) in FACE_NEIGHBORS {
                freeness += self.count_free(x + dx, y + dy, z + dz);
            }
        }
        self.clean(config);
        freeness
    }

    fn fill(&mut self, config: &Configuration) {
        for (id, ms) in config.matrices() {
            for m in ms {
                let (x, y, z) = lattice_center(m);
                self.set_cell(x, y, z, Cell::Occupied(*id));
            }
        }
    }

    fn clean(&mut self, config: &Configuration) {
        for (x, y, z) in shoe_cells(config) {
            self.clean_cell(x, y, z);
            for (dx, dy, dz) in FACE_NEIGHBORS {
                self.clean_cell(x + dx, y + dy, z + dz);
            }
        }
    }

    fn clean_cell(&mut self, x: i64, y: i64, z: i64) {
        if self.in_grid(x, y, z) {
            self.set_cell(x, y, z, Cell::Empty);
        }
    }

    fn count_free(&mut self, x: i64, y: i64, z: i64) -> i64 {
        if !self.in_grid(x, y, z) {
            return 1;
        }
        if self.cell(x, y, z) == Cell::Empty {
            self.set_cell(x, y, z, Cell::Counted);
            return 1;
        }
        0
    }
}

const FACE_NEIGHBORS: [(i64, i64, i64); 6] = [
    (-1, 0, 0),
    (1, 0, 0),
    (0, -1, 0),
    (0, 1, 0),
    (0, 0, -1),
    (0, 0, 1),
];

fn shoe_cells(config: &Configuration) -> impl Iterator<Item = (i64, i64, i64)> + '_ {
    config.matrices().values().flat_map(|ms| ms.iter().map(lattice_center))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        edge::{Dock, Edge, Ori},
        module::Side,
    };

    fn chain(n: u32) -> Configuration {
        let mut cfg = Configuration::new();
        for id in 0..n {
            cfg.add_module(0.0, 0.0, 0.0, id);
        }
        for id in 0..n.saturating_sub(1) {
            assert!(cfg.add_edge(Edge::new(
                id,
                Side::B,
                Dock::ZMinus,
                Ori::North,
                Dock::ZMinus,
                Side::A,
                id + 1
            )));
        }
        assert!(cfg.is_valid());
        cfg
    }

    #[test]
    fn straight_chain_has_maximal_freeness() {
        // 2n collinear shoes expose 4 side neighbors each plus the two ends.
        for n in [1usize, 2, 3, 5] {
            let cfg = chain(n as u32);
            let mut grid = SpaceGrid::new(n);
            assert_eq!(grid.freeness(&cfg), 8 * n as i64 + 2);
        }
    }

    #[test]
    fn freeness_leaves_grid_clean() {
        let cfg = chain(3);
        let mut grid = SpaceGrid::new(3);
        let first = grid.freeness(&cfg);
        let second = grid.freeness(&cfg);
        assert_eq!(first, second);
        assert!(grid.cells.iter().all(|c| *c == Cell::Empty));
    }

    #[test]
    fn grid_bounds() {
        let grid = SpaceGrid::new(2);
        assert!(grid.in_grid(3, -3, 0));
        assert!(!grid.in_grid(4, 0, 0));
        assert!(!grid.in_grid(0, 0, -4));
    }
}
