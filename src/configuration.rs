//! The configuration: modules, edges, the world anchor and derived caches.
//!
//! A configuration owns its module and edge tables plus lazily maintained
//! caches: connectivity, a spanning tree rooted at the fixed module, world
//! transforms for every shoe, and the consistency verdict over cross edges.
//! Each cache is a tri-state ([`CacheState`]); mutators downgrade at most to
//! `Unknown`, only successful validation raises a cache to `True`.
//!
//! Module and edge maps are ordered by id so that successor generation and
//! every other observable iteration is deterministic.

use std::collections::{BTreeMap, HashSet, VecDeque};

use derive_more::IsVariant;
use enum_iterator::all;
use log::debug;

use crate::{
    action::{self, Action, Reconnect, Rotate},
    edge::{DOCK_COUNT, Edge},
    math::{self, ANGLE_EPS, Matrix, Vector},
    module::{Joint, Module, ModuleId, Side, normalize_gamma},
};

/// Number of discrete sub-steps a rotation is divided into when validating
/// an action's sweep.
const ROTATION_SUBSTEPS: usize = 10;

pub type EdgeSlots = [Option<Edge>; DOCK_COUNT];

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[derive(IsVariant)]
pub enum CacheState {
    True,
    False,
    Unknown,
}

#[derive(Clone, Debug)]
pub struct Configuration {
    modules: BTreeMap<ModuleId, Module>,
    edges: BTreeMap<ModuleId, EdgeSlots>,
    matrices: BTreeMap<ModuleId, [Matrix; 2]>,

    // World anchor: every other shoe pose derives from this one.
    fixed_id: ModuleId,
    fixed_side: Side,
    fixed_matrix: Matrix,

    connected_state: CacheState,
    matrices_state: CacheState,

    spanning_tree_computed: bool,
    spanning_succ: BTreeMap<ModuleId, EdgeSlots>,
    spanning_pred: BTreeMap<ModuleId, Option<(ModuleId, Side)>>,
    spanning_succ_count: BTreeMap<ModuleId, usize>,
    spanning_cross: BTreeMap<ModuleId, EdgeSlots>,

    // Incremental transform cache: which shoes hold a known world pose, and
    // which were rewritten by the most recent compute_matrices pass.
    matrix_computed: BTreeMap<ModuleId, [bool; 2]>,
    matrix_updated: BTreeMap<ModuleId, [bool; 2]>,
    consistency_checked: BTreeMap<ModuleId, bool>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            modules: BTreeMap::new(),
            edges: BTreeMap::new(),
            matrices: BTreeMap::new(),
            fixed_id: 0,
            fixed_side: Side::A,
            fixed_matrix: math::identity(),
            connected_state: CacheState::Unknown,
            matrices_state: CacheState::Unknown,
            spanning_tree_computed: false,
            spanning_succ: BTreeMap::new(),
            spanning_pred: BTreeMap::new(),
            spanning_succ_count: BTreeMap::new(),
            spanning_cross: BTreeMap::new(),
            matrix_computed: BTreeMap::new(),
            matrix_updated: BTreeMap::new(),
            consistency_checked: BTreeMap::new(),
        }
    }
}

impl Configuration {
    pub fn new() -> Configuration {
        Configuration::default()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn modules(&self) -> &BTreeMap<ModuleId, Module> {
        &self.modules
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        self.modules.get(&id).unwrap_or_else(|| panic!("no module with id {id}"))
    }

    pub fn ids(&self) -> Vec<ModuleId> {
        self.modules.keys().copied().collect()
    }

    pub fn edges(&self) -> &BTreeMap<ModuleId, EdgeSlots> {
        &self.edges
    }

    pub fn edge_slots(&self, id: ModuleId) -> &EdgeSlots {
        self.edges.get(&id).unwrap_or_else(|| panic!("no module with id {id}"))
    }

    pub fn edges_of(&self, id: ModuleId) -> Vec<Edge> {
        self.edge_slots(id).iter().flatten().copied().collect()
    }

    pub fn edges_of_excluding(&self, id: ModuleId, exclude: &HashSet<ModuleId>) -> Vec<Edge> {
        self.edge_slots(id)
            .iter()
            .flatten()
            .filter(|e| !exclude.contains(&e.id2))
            .copied()
            .collect()
    }

    pub fn matrices(&self) -> &BTreeMap<ModuleId, [Matrix; 2]> {
        &self.matrices
    }

    pub fn matrix(&self, id: ModuleId, side: Side) -> &Matrix {
        &self.matrices.get(&id).unwrap_or_else(|| panic!("no matrices for module {id}"))
            [side.index()]
    }

    pub fn fixed_id(&self) -> ModuleId {
        self.fixed_id
    }

    pub fn fixed_side(&self) -> Side {
        self.fixed_side
    }

    pub fn has_spanning_tree(&self) -> bool {
        self.spanning_tree_computed
    }

    pub fn spanning_succ(&self) -> &BTreeMap<ModuleId, EdgeSlots> {
        &self.spanning_succ
    }

    pub fn spanning_pred(&self) -> &BTreeMap<ModuleId, Option<(ModuleId, Side)>> {
        &self.spanning_pred
    }

    pub fn spanning_succ_count(&self) -> &BTreeMap<ModuleId, usize> {
        &self.spanning_succ_count
    }

    pub fn spanning_cross(&self) -> &BTreeMap<ModuleId, EdgeSlots> {
        &self.spanning_cross
    }

    /// Inserts a module with empty edge slots. The fixed anchor follows the
    /// minimum id unless it was set explicitly afterwards.
    pub fn add_module(&mut self, alpha: f64, beta: f64, gamma: f64, id: ModuleId) {
        self.modules.insert(id, Module::universal(alpha, beta, gamma, id));
        self.edges.insert(id, [None; DOCK_COUNT]);
        if self.modules.len() == 1 || id < self.fixed_id {
            self.fixed_id = id;
            self.matrices_state = CacheState::False;
        } else {
            self.matrices_state = CacheState::Unknown;
        }
        if self.modules.len() > 1 {
            self.connected_state = CacheState::False;
        }
        self.spanning_tree_computed = false;
        self.spanning_succ.insert(id, [None; DOCK_COUNT]);
        self.spanning_succ_count.insert(id, 0);
        self.spanning_pred.insert(id, None);
        self.spanning_cross.insert(id, [None; DOCK_COUNT]);
        self.matrix_computed.insert(id, [false; 2]);
        self.matrix_updated.insert(id, [false; 2]);
        self.consistency_checked.insert(id, false);
    }

    /// Writes both half-edges if both dock slots are free.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        let index1 = edge.index1();
        let index2 = edge.index2();
        if self.edge_slots(edge.id1)[index1].is_some()
            || self.edge_slots(edge.id2)[index2].is_some()
        {
            return false;
        }
        let reversed = edge.reversed();
        self.edges.get_mut(&edge.id1).unwrap()[index1] = Some(edge);
        self.edges.get_mut(&edge.id2).unwrap()[index2] = Some(reversed);
        if self.connected_state.is_false() {
            self.connected_state = CacheState::Unknown;
        }
        if self.spanning_tree_computed {
            // The tree still spans; the new edge can only be a cross edge.
            self.spanning_cross.get_mut(&edge.id1).unwrap()[index1] = Some(edge);
            self.spanning_cross.get_mut(&edge.id2).unwrap()[index2] = Some(reversed);
        }
        true
    }

    /// Clears both half-edges; fails when either slot is empty or holds a
    /// different edge.
    pub fn remove_edge(&mut self, edge: Edge) -> bool {
        let index1 = edge.index1();
        let index2 = edge.index2();
        let reversed = edge.reversed();
        match (self.edge_slots(edge.id1)[index1], self.edge_slots(edge.id2)[index2]) {
            (Some(e1), Some(e2)) if e1 == edge && e2 == reversed => {}
            _ => return false,
        }
        self.edges.get_mut(&edge.id1).unwrap()[index1] = None;
        self.edges.get_mut(&edge.id2).unwrap()[index2] = None;

        if !self.spanning_tree_computed {
            if self.connected_state.is_true() {
                self.connected_state = CacheState::Unknown;
            }
            return true;
        }

        let pred1 = self.spanning_pred[&edge.id1];
        let pred2 = self.spanning_pred[&edge.id2];
        if pred1.is_some_and(|(p, _)| p == edge.id2) {
            self.remove_spanning_edge(&reversed);
        } else if pred2.is_some_and(|(p, _)| p == edge.id1) {
            self.remove_spanning_edge(&edge);
        } else {
            self.spanning_cross.get_mut(&edge.id1).unwrap()[index1] = None;
            self.spanning_cross.get_mut(&edge.id2).unwrap()[index2] = None;
        }
        true
    }

    fn remove_spanning_edge(&mut self, edge: &Edge) {
        self.spanning_succ.get_mut(&edge.id1).unwrap()[edge.index1()] = None;
        *self.spanning_succ_count.get_mut(&edge.id1).unwrap() -= 1;
        self.spanning_pred.insert(edge.id2, None);
        self.connected_state = CacheState::Unknown;
        self.spanning_tree_computed = false;
    }

    /// True when the dock slot of endpoint 1 is occupied by any edge.
    pub fn find_edge(&self, edge: &Edge) -> bool {
        self.edge_slots(edge.id1)[edge.index1()].is_some()
    }

    /// True when the dock slot of endpoint 1 holds exactly this edge.
    pub fn find_connection(&self, edge: &Edge) -> bool {
        self.edge_slots(edge.id1)[edge.index1()].as_ref() == Some(edge)
    }

    pub fn set_fixed(&mut self, id: ModuleId, side: Side, matrix: Matrix) {
        self.fixed_id = id;
        self.fixed_side = side;
        self.fixed_matrix = matrix;
        self.spanning_tree_computed = false;
        self.matrices_state = CacheState::False;
    }

    /// Drops every edge, keeping the modules.
    pub fn clear_edges(&mut self) {
        for slots in self.edges.values_mut() {
            *slots = [None; DOCK_COUNT];
        }
        self.spanning_tree_computed = false;
        if self.modules.len() > 1 {
            self.connected_state = CacheState::False;
            self.matrices_state = CacheState::False;
        }
    }

    /// Connected, geometrically consistent and free of self-collision.
    pub fn is_valid(&mut self) -> bool {
        if self.connected_state.is_unknown() {
            let connected = self.ensure_connected();
            self.connected_state =
                if connected { CacheState::True } else { CacheState::False };
        }
        self.connected_state.is_true() && self.compute_matrices() && self.collision_free()
    }

    /// Solves transforms and validates in one call.
    pub fn prepare(&mut self) -> bool {
        self.is_valid()
    }

    /// Connectivity via the cached verdict or a read-only DFS.
    pub fn connected(&self) -> bool {
        if self.modules.is_empty() {
            return true;
        }
        if self.spanning_tree_computed || self.connected_state.is_true() {
            return true;
        }
        if self.connected_state.is_false() {
            return false;
        }
        let mut seen = HashSet::from([self.fixed_id]);
        let mut stack = vec![self.fixed_id];
        while let Some(curr) = stack.pop() {
            for edge in self.edge_slots(curr).iter().flatten() {
                if seen.insert(edge.id2) {
                    stack.push(edge.id2);
                }
            }
        }
        seen.len() == self.modules.len()
    }

    /// Connectivity check that leaves the spanning tree cached on success.
    fn ensure_connected(&mut self) -> bool {
        if self.spanning_tree_computed || self.connected_state.is_true() {
            return true;
        }
        if self.connected_state.is_false() {
            return false;
        }
        self.compute_spanning_tree()
    }

    fn spanning_clear_id(&mut self, id: ModuleId) {
        self.spanning_pred.insert(id, None);
        self.spanning_succ.insert(id, [None; DOCK_COUNT]);
        self.spanning_succ_count.insert(id, 0);
        self.spanning_cross.insert(id, [None; DOCK_COUNT]);
    }

    /// BFS from the fixed module. Discovery edges become successors, edges to
    /// already-seen peers become cross edges at the side they were met from.
    fn compute_spanning_tree(&mut self) -> bool {
        if self.modules.is_empty() {
            self.spanning_tree_computed = true;
            self.connected_state = CacheState::True;
            return true;
        }
        if self.connected_state.is_false() {
            self.spanning_tree_computed = false;
            return false;
        }
        let mut seen = HashSet::from([self.fixed_id]);
        let mut bag = VecDeque::from([self.fixed_id]);
        self.spanning_clear_id(self.fixed_id);

        while let Some(curr) = bag.pop_front() {
            let slots = *self.edge_slots(curr);
            for edge in slots.into_iter().flatten() {
                let next = edge.id2;
                if seen.contains(&next) {
                    let back_to_pred =
                        self.spanning_pred[&curr].is_some_and(|(p, _)| p == next);
                    if !back_to_pred {
                        self.spanning_cross.get_mut(&curr).unwrap()[edge.index1()] = Some(edge);
                    }
                    continue;
                }
                bag.push_back(next);
                seen.insert(next);
                self.spanning_clear_id(next);
                self.spanning_pred.insert(next, Some((curr, edge.side2)));
                self.spanning_succ.get_mut(&curr).unwrap()[edge.index1()] = Some(edge);
                *self.spanning_succ_count.get_mut(&curr).unwrap() += 1;
            }
        }

        self.spanning_tree_computed = seen.len() == self.modules.len();
        self.connected_state =
            if self.spanning_tree_computed { CacheState::True } else { CacheState::False };
        self.spanning_tree_computed
    }

    /// Derives world transforms along the spanning tree, recomputing only the
    /// shoes transitively affected since the last pass, then verifies every
    /// cross edge.
    pub fn compute_matrices(&mut self) -> bool {
        if self.modules.is_empty() {
            return true;
        }
        if self.matrices_state.is_true() {
            return true;
        }
        if !self.spanning_tree_computed && !self.compute_spanning_tree() {
            return false;
        }

        let fixed_side = self.fixed_side.index();
        let mut recompute_all = false;
        if self.matrices_state.is_false() || !self.matrix_computed[&self.fixed_id][fixed_side] {
            self.matrices.entry(self.fixed_id).or_insert([self.fixed_matrix; 2])[fixed_side] =
                self.fixed_matrix;
            recompute_all = true;
            self.matrix_computed.get_mut(&self.fixed_id).unwrap()[fixed_side] = true;
            self.matrix_updated.get_mut(&self.fixed_id).unwrap()[fixed_side] = true;
        } else {
            self.matrix_updated.get_mut(&self.fixed_id).unwrap()[fixed_side] = false;
        }

        let mut bag = VecDeque::from([(self.fixed_id, self.fixed_side, recompute_all)]);
        self.consistency_checked.insert(self.fixed_id, false);

        while let Some((curr_id, curr_side, recompute)) = bag.pop_front() {
            let mut recompute_shoe = [false; 2];
            recompute_shoe[curr_side.index()] = recompute;

            let other = curr_side.other();
            if recompute || !self.matrix_computed[&curr_id][other.index()] {
                let derived = self.compute_other_side_matrix(curr_id, curr_side);
                self.matrices.get_mut(&curr_id).unwrap()[other.index()] = derived;
                self.matrix_computed.get_mut(&curr_id).unwrap()[other.index()] = true;
                self.matrix_updated.get_mut(&curr_id).unwrap()[other.index()] = true;
                recompute_shoe[other.index()] = true;
            } else {
                self.matrix_updated.get_mut(&curr_id).unwrap()[other.index()] = false;
            }

            let succ = self.spanning_succ[&curr_id];
            for edge in succ.into_iter().flatten() {
                let next_id = edge.id2;
                let next_side = edge.side2.index();
                let next_recompute = recompute_shoe[edge.side1.index()]
                    || !self.matrix_computed[&next_id][next_side];
                if next_recompute {
                    let derived = self.compute_connected_matrix(&edge);
                    self.matrices.entry(next_id).or_insert([derived; 2])[next_side] = derived;
                    self.matrix_computed.get_mut(&next_id).unwrap()[next_side] = true;
                    self.matrix_updated.get_mut(&next_id).unwrap()[next_side] = true;
                } else {
                    self.matrix_updated.get_mut(&next_id).unwrap()[next_side] = false;
                }
                bag.push_back((next_id, edge.side2, next_recompute));
                self.consistency_checked.insert(next_id, false);
            }
        }

        self.check_consistency()
    }

    /// Walks cross edges of freshly updated shoes and compares both
    /// independently derived endpoint transforms.
    fn check_consistency(&mut self) -> bool {
        let updated: Vec<(ModuleId, [bool; 2])> =
            self.matrix_updated.iter().map(|(id, upd)| (*id, *upd)).collect();
        for (id, upd) in updated {
            for side in all::<Side>() {
                if !upd[side.index()] {
                    continue;
                }
                let cross = self.spanning_cross[&id];
                for edge in cross.into_iter().flatten() {
                    if edge.side1 != side {
                        continue;
                    }
                    if self.consistency_checked[&edge.id2] {
                        continue;
                    }
                    if !self.matrix_updated[&edge.id2][edge.side2.index()] {
                        // An updated shoe facing a stale peer across a loop
                        // cannot be trusted; force a full recompute.
                        self.matrices_state = CacheState::False;
                        return false;
                    }
                    let expected = self.compute_connected_matrix(&edge);
                    let actual = &self.matrices[&edge.id2][edge.side2.index()];
                    if !math::approx_eq(&expected, actual) {
                        debug!(target: "configuration", "cross edge mismatch at {id}");
                        self.matrices_state = CacheState::False;
                        return false;
                    }
                }
                self.consistency_checked.insert(id, true);
            }
        }
        self.matrices_state = CacheState::True;
        true
    }

    fn compute_other_side_matrix(&self, id: ModuleId, side: Side) -> Matrix {
        let module = self.module(id);
        let matrix = &self.matrices[&id][side.index()];
        // The joint transform takes the anchored side's bend first.
        let anchored = module.joint(module.side_joint(side)).to_radians();
        let far = module.joint(module.side_joint(side.other())).to_radians();
        let gamma = module.joint(Joint::Gamma).to_radians();
        matrix * math::transform_joint(anchored, far, gamma)
    }

    /// World pose of the far endpoint of an edge, derived from endpoint 1.
    pub fn compute_connected_matrix(&self, edge: &Edge) -> Matrix {
        let matrix = &self.matrices[&edge.id1][edge.side1.index()];
        matrix * crate::edge::transform_connection(edge.dock1, edge.ori, edge.dock2)
    }

    /// Pairwise unit-sphere check over all shoe centers; computes matrices
    /// first when they are stale.
    pub fn collision_free(&mut self) -> bool {
        if !self.matrices_state.is_true() && !self.compute_matrices() {
            return false;
        }
        self.shoes_clear()
    }

    /// Read-only variant: fails when matrices are not known valid.
    pub fn collision_free_cached(&self) -> bool {
        self.matrices_state.is_true() && self.shoes_clear()
    }

    fn shoes_clear(&self) -> bool {
        let entries: Vec<&[Matrix; 2]> = self.matrices.values().collect();
        for (i, ms1) in entries.iter().enumerate() {
            if math::center_sq_distance(&ms1[0], &ms1[1]) < 1.0 {
                return false;
            }
            for ms2 in &entries[i + 1..] {
                if math::center_sq_distance(&ms1[0], &ms2[0]) < 1.0
                    || math::center_sq_distance(&ms1[0], &ms2[1]) < 1.0
                    || math::center_sq_distance(&ms1[1], &ms2[0]) < 1.0
                    || math::center_sq_distance(&ms1[1], &ms2[1]) < 1.0
                {
                    return false;
                }
            }
        }
        true
    }

    /// Mean of all shoe centers in world coordinates.
    pub fn mass_center(&self) -> Vector {
        let mut mass = Vector::zeros();
        for ms in self.matrices.values() {
            mass += math::center(&ms[0]);
            mass += math::center(&ms[1]);
        }
        mass /= (self.modules.len() * 2) as f64;
        mass[3] = 1.0;
        mass
    }

    /// Midpoint of the two shoe centers of one module.
    pub fn module_mass(&self, id: ModuleId) -> Vector {
        let ms = &self.matrices[&id];
        let mut mass = (math::center(&ms[0]) + math::center(&ms[1])) / 2.0;
        mass[3] = 1.0;
        mass
    }

    /// Applies rotations, then reconnections, in place. Returns the logical
    /// AND of the step successes; failed steps leave their part untouched.
    pub fn execute(&mut self, action: &Action) -> bool {
        let mut ok = true;
        for rot in action.rotations() {
            ok &= self.execute_rotation(rot);
        }
        for rec in action.reconnections() {
            ok &= self.execute_reconnect(rec);
        }
        ok
    }

    fn execute_rotation(&mut self, rot: &Rotate) -> bool {
        if !self.spanning_tree_computed && !self.compute_spanning_tree() {
            return false;
        }
        let Some(module) = self.modules.get_mut(&rot.id) else {
            return false;
        };
        let ok = module.rotate_joint(rot.joint, rot.angle);
        if ok {
            self.matrices_state = CacheState::Unknown;
            // Only the shoe on the far side of the anchoring edge moves.
            let far_side = match self.spanning_pred[&rot.id] {
                None => self.fixed_side.other(),
                Some((_, anchor_side)) => anchor_side.other(),
            };
            self.matrix_computed.get_mut(&rot.id).unwrap()[far_side.index()] = false;
        }
        ok
    }

    fn execute_reconnect(&mut self, rec: &Reconnect) -> bool {
        if rec.add { self.add_edge(rec.edge) } else { self.remove_edge(rec.edge) }
    }

    /// Applies an action on a clone with sub-stepped rotations: disconnects
    /// first, then a connectivity check, then connects, then the rotations in
    /// ten validated sub-steps. Returns the new configuration only when every
    /// intermediate state is valid.
    pub fn execute_if_valid(&self, action: &Action) -> Option<Configuration> {
        let mut next = self.clone();

        let (connects, disconnects): (Vec<Reconnect>, Vec<Reconnect>) =
            action.reconnections().iter().copied().partition(|r| r.add);

        if !next.execute(&Action::new(vec![], disconnects)) {
            return None;
        }
        if !next.ensure_connected() {
            return None;
        }
        if !next.execute(&Action::new(vec![], connects)) {
            return None;
        }

        let divided = Action::new(action.rotations().to_vec(), vec![])
            .divide(1.0 / ROTATION_SUBSTEPS as f64);
        for _ in 0..ROTATION_SUBSTEPS {
            if !next.is_valid() {
                return None;
            }
            if !next.execute(&divided) {
                return None;
            }
        }
        if next.is_valid() { Some(next) } else { None }
    }

    /// Candidate single-joint rotations of ±step that stay in range and move
    /// the joint.
    pub fn generate_rotations(&self, step: f64) -> Vec<Rotate> {
        let mut res = Vec::new();
        for (id, module) in &self.modules {
            for delta in [-step, step] {
                for joint in all::<Joint>() {
                    let mut copy = module.clone();
                    if copy.rotate_joint(joint, delta)
                        && (copy.joint(joint) - module.joint(joint)).abs() > ANGLE_EPS
                    {
                        res.push(Rotate::new(*id, joint, delta));
                    }
                }
            }
        }
        res
    }

    /// Candidate new edges: for every module pair and every enumerable edge,
    /// keep those whose endpoints sit at unit distance with matching
    /// transforms and whose dock slots are free. Requires computed matrices.
    pub fn generate_connections(&self) -> Vec<Reconnect> {
        let mut res = Vec::new();
        for (id1, ms1) in &self.matrices {
            for (id2, ms2) in self.matrices.range((*id1 + 1)..) {
                for edge in Edge::all_between(*id1, *id2) {
                    let center1 = math::center(&ms1[edge.side1.index()]);
                    let center2 = math::center(&ms2[edge.side2.index()]);
                    if math::distance(&center1, &center2) != 1.0 {
                        continue;
                    }
                    let matrix = &ms2[edge.side2.index()];
                    if math::approx_eq(matrix, &self.compute_connected_matrix(&edge))
                        && !self.find_edge(&edge)
                        && !self.find_edge(&edge.reversed())
                    {
                        res.push(Reconnect::join(edge));
                    }
                }
            }
        }
        res
    }

    /// Every existing edge in canonical direction, as a disconnect.
    pub fn generate_disconnections(&self) -> Vec<Reconnect> {
        let mut res = Vec::new();
        for slots in self.edges.values() {
            for edge in slots.iter().flatten() {
                if edge.id1 < edge.id2 {
                    res.push(Reconnect::split(*edge));
                }
            }
        }
        res
    }

    pub fn generate_reconnections(&self) -> Vec<Reconnect> {
        let mut res = self.generate_connections();
        res.extend(self.generate_disconnections());
        res
    }

    /// All actions of at most `bound` atomic steps drawn from the rotation
    /// and reconnection candidates, rotation-unique per `(id, joint)`. The
    /// empty action is included.
    pub fn generate_actions(&self, step: f64, bound: usize) -> Vec<Action> {
        let rotations = self.generate_rotations(step);
        let reconnections = self.generate_reconnections();

        let rotation_sets = action::all_unique_rotations(&rotations, bound);
        let reconnection_sets = action::all_subsets(&reconnections, bound);

        let mut res = Vec::new();
        for rotation in &rotation_sets {
            for reconnection in &reconnection_sets {
                if rotation.len() + reconnection.len() <= bound {
                    res.push(Action::new(rotation.clone(), reconnection.clone()));
                }
            }
        }
        res
    }

    /// Valid neighbor configurations one action away.
    pub fn successors(&self, step: f64, bound: usize) -> Vec<Configuration> {
        self.generate_actions(step, bound)
            .iter()
            .filter_map(|action| self.execute_if_valid(action))
            .collect()
    }

    /// The action transforming `self` into `other`: one rotation per
    /// differing joint (gamma wrapped), and canonical-direction reconnects
    /// for differing dock slots.
    pub fn diff(&self, other: &Configuration) -> Action {
        let mut rotations = Vec::new();
        let mut reconnections = Vec::new();
        for (id, other_module) in &other.modules {
            if !self.modules.contains_key(id) {
                continue;
            }
            self.joint_diff(&mut rotations, *id, other_module);
            self.edge_diff(&mut reconnections, *id, other);
        }
        Action::new(rotations, reconnections)
    }

    fn joint_diff(&self, rotations: &mut Vec<Rotate>, id: ModuleId, other_module: &Module) {
        let module = &self.modules[&id];
        for joint in all::<Joint>() {
            let mut val = other_module.joint(joint) - module.joint(joint);
            if joint == Joint::Gamma {
                val = normalize_gamma(val);
            }
            if val.abs() >= ANGLE_EPS {
                rotations.push(Rotate::new(id, joint, val));
            }
        }
    }

    fn edge_diff(&self, reconnections: &mut Vec<Reconnect>, id: ModuleId, other: &Configuration) {
        let slots = self.edge_slots(id);
        let other_slots = other.edge_slots(id);
        for i in 0..DOCK_COUNT {
            match (&slots[i], &other_slots[i]) {
                (a, b) if a == b => {}
                (None, Some(wanted)) => {
                    if wanted.id1 < wanted.id2 {
                        reconnections.push(Reconnect::join(*wanted));
                    }
                }
                (Some(present), None) => {
                    if present.id1 < present.id2 {
                        reconnections.push(Reconnect::split(*present));
                    }
                }
                (Some(present), Some(wanted)) => {
                    if wanted.id1 < wanted.id2 {
                        reconnections.push(Reconnect::join(*wanted));
                        reconnections.push(Reconnect::split(*present));
                    }
                }
                (None, None) => {}
            }
        }
    }

    /// Deliberately weak structural hash over module joint states; collisions
    /// are resolved by full equality.
    pub fn structural_hash(&self) -> u64 {
        let mut res: u64 = 0;
        for (id, module) in &self.modules {
            let key = 13.0 * (module.joint(Joint::Alpha) + 90.0)
                + 17.0 * (module.joint(Joint::Beta) + 90.0)
                + 19.0 * module.joint(Joint::Gamma);
            res = res.wrapping_add((*id as f64 * key) as i64 as u64);
        }
        res
    }
}

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.modules == other.modules && self.edges == other.edges
    }
}

impl Eq for Configuration {}

#[cfg(test)]
mod tests {
    use assertables::assert_len_eq_x;

    use super::*;
    use crate::edge::{Dock, Ori};

    fn two_linked(edge: Edge) -> Configuration {
        let mut cfg = Configuration::new();
        cfg.add_module(0.0, 0.0, 0.0, 0);
        cfg.add_module(0.0, 0.0, 0.0, 1);
        assert!(cfg.add_edge(edge));
        cfg
    }

    #[test]
    fn single_module_is_valid_and_yields_seven_actions() {
        let mut cfg = Configuration::new();
        cfg.add_module(0.0, 0.0, 0.0, 0);
        assert!(cfg.is_valid());
        // Six rotations of ±90° across three joints plus the empty action.
        let actions = cfg.generate_actions(90.0, 1);
        assert_len_eq_x!(&actions, 7);
        assert_len_eq_x!(actions.iter().filter(|a| a.is_empty()).collect::<Vec<_>>(), 1);
        let actions = cfg.generate_actions(90.0, 2);
        assert_len_eq_x!(actions, 19);
    }

    #[test]
    fn edge_removal_disconnects_and_readding_restores() {
        let edge = Edge::new(0, Side::A, Dock::XPlus, Ori::North, Dock::ZMinus, Side::B, 1);
        let mut cfg = two_linked(edge);
        assert!(cfg.is_valid());

        assert!(cfg.remove_edge(edge));
        assert!(!cfg.connected());
        assert!(!cfg.is_valid());

        assert!(cfg.add_edge(edge));
        assert!(cfg.is_valid());
    }

    #[test]
    fn every_single_edge_closes_consistently() {
        // One constraint only, so matrices always close; all 144 candidate
        // edges between two zero-joint modules must validate.
        for edge in Edge::all_between(0, 1) {
            let mut cfg = two_linked(edge);
            assert!(cfg.is_valid(), "edge {edge:?} should be valid");
        }
    }

    #[test]
    fn add_then_remove_restores_edge_table() {
        let edge = Edge::new(0, Side::B, Dock::ZMinus, Ori::South, Dock::XMinus, Side::A, 1);
        let mut cfg = two_linked(edge);
        let pristine = {
            let mut c = Configuration::new();
            c.add_module(0.0, 0.0, 0.0, 0);
            c.add_module(0.0, 0.0, 0.0, 1);
            c
        };
        assert!(cfg.remove_edge(edge));
        assert_eq!(cfg.edges(), pristine.edges());
        // Removing again, or removing a mismatched edge, fails.
        assert!(!cfg.remove_edge(edge));
    }

    #[test]
    fn half_edges_are_stored_reversed_on_the_peer() {
        for edge in Edge::all_between(0, 1) {
            let cfg = two_linked(edge);
            assert_eq!(cfg.edge_slots(0)[edge.index1()], Some(edge));
            assert_eq!(cfg.edge_slots(1)[edge.index2()], Some(edge.reversed()));
        }
    }

    #[test]
    fn occupied_slots_reject_new_edges() {
        let edge = Edge::new(0, Side::A, Dock::XPlus, Ori::North, Dock::XPlus, Side::A, 1);
        let mut cfg = two_linked(edge);
        cfg.add_module(0.0, 0.0, 0.0, 2);
        let clashing = Edge::new(0, Side::A, Dock::XPlus, Ori::North, Dock::XPlus, Side::A, 2);
        assert!(!cfg.add_edge(clashing));
    }

    #[test]
    fn inconsistent_loop_is_rejected() {
        let mut cfg = two_linked(Edge::new(
            0,
            Side::A,
            Dock::ZMinus,
            Ori::North,
            Dock::ZMinus,
            Side::A,
            1,
        ));
        // A second rigid link between the same modules over-constrains the
        // loop; the cross-edge check must refuse it.
        assert!(cfg.add_edge(Edge::new(
            0,
            Side::B,
            Dock::ZMinus,
            Ori::North,
            Dock::ZMinus,
            Side::B,
            1
        )));
        assert!(!cfg.is_valid());
    }

    #[test]
    fn connect_candidates_are_addable() {
        let edge = Edge::new(0, Side::A, Dock::XPlus, Ori::North, Dock::XPlus, Side::A, 1);
        let mut cfg = two_linked(edge);
        assert!(cfg.is_valid());

        let disconnects = cfg.generate_disconnections();
        assert_len_eq_x!(disconnects, 1);

        for candidate in cfg.generate_connections() {
            let mut with = cfg.clone();
            assert!(with.add_edge(candidate.edge));
            assert!(with.is_valid(), "candidate {:?} should stay valid", candidate.edge);
        }
    }

    #[test]
    fn rotation_action_roundtrips_through_diff() {
        let edge = Edge::new(0, Side::A, Dock::XPlus, Ori::North, Dock::ZMinus, Side::B, 1);
        let mut cfg = two_linked(edge);
        assert!(cfg.is_valid());

        let action = Action::new(vec![Rotate::new(1, Joint::Gamma, 90.0)], vec![]);
        let next = cfg.execute_if_valid(&action).expect("rotation should be feasible");
        let diff = cfg.diff(&next);
        assert_eq!(diff.rotations(), action.rotations());
        assert!(diff.reconnections().is_empty());
    }

    #[test]
    fn reconnect_roundtrips_through_diff() {
        let edge = Edge::new(0, Side::A, Dock::XPlus, Ori::North, Dock::ZMinus, Side::B, 1);
        let cfg = two_linked(edge);
        let mut without = Configuration::new();
        without.add_module(0.0, 0.0, 0.0, 0);
        without.add_module(0.0, 0.0, 0.0, 1);

        let diff = without.diff(&cfg);
        assert!(diff.rotations().is_empty());
        assert_eq!(diff.reconnections(), &[Reconnect::join(edge)]);
        let back = cfg.diff(&without);
        assert_eq!(back.reconnections(), &[Reconnect::split(edge)]);
    }

    #[test]
    fn equality_and_hash_are_structural() {
        let edge = Edge::new(0, Side::A, Dock::XPlus, Ori::North, Dock::ZMinus, Side::B, 1);
        let a = two_linked(edge);
        let b = two_linked(edge);
        assert_eq!(a, b);
        assert_eq!(a.structural_hash(), b.structural_hash());

        let c = two_linked(edge);
        let turned = c.execute_if_valid(&Rotate::new(0, Joint::Alpha, 90.0).into());
        let turned = turned.expect("alpha turn should be feasible");
        assert_ne!(a, turned);
        assert_ne!(a.structural_hash(), turned.structural_hash());
    }

    #[test]
    fn incremental_matrices_match_full_recompute() {
        let edge = Edge::new(0, Side::B, Dock::ZMinus, Ori::North, Dock::ZMinus, Side::A, 1);
        let mut cfg = two_linked(edge);
        assert!(cfg.is_valid());

        // Rotate a joint, revalidate incrementally, then compare against a
        // from-scratch clone of the same state.
        assert!(cfg.execute(&Action::new(vec![Rotate::new(1, Joint::Beta, 45.0)], vec![])));
        assert!(cfg.is_valid());

        let mut fresh = Configuration::new();
        fresh.add_module(0.0, 0.0, 0.0, 0);
        fresh.add_module(0.0, 45.0, 0.0, 1);
        assert!(fresh.add_edge(edge));
        assert!(fresh.is_valid());

        for id in fresh.ids() {
            for side in all::<Side>() {
                assert!(math::approx_eq(cfg.matrix(id, side), fresh.matrix(id, side)));
            }
        }
    }

    #[test]
    fn spanning_tree_shape_of_a_chain() {
        let mut cfg = Configuration::new();
        for id in 0..3 {
            cfg.add_module(0.0, 0.0, 0.0, id);
        }
        for id in 0..2 {
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
        assert_eq!(cfg.spanning_succ_count()[&0], 1);
        assert_eq!(cfg.spanning_succ_count()[&1], 1);
        assert_eq!(cfg.spanning_succ_count()[&2], 0);
        assert_eq!(cfg.spanning_pred()[&1], Some((0, Side::A)));
        assert!(cfg.collision_free_cached());
    }
}
