//! CompositeGrid: one level of a rank's extended local view.
//!
//! Nodes live in an arena addressed by stable [`NodeId`] handles. The sorted
//! view the solver sees is the `order` table (position → handle):
//! owned nodes first, in row order, followed by the non-owned nodes in
//! strictly ascending global order. A merge only rewrites that table, so
//! handles recorded in send and receive maps stay valid across merges.
//!
//! # Invariants
//!
//! - `order` and `position` are inverse permutations of the arena.
//! - Position `i < num_owned` holds global index `first_owned + i`.
//! - The non-owned block is strictly ascending and disjoint from the owned range.
//! - Every node has a P row iff the grid has a coarser level.

use crate::amgdd_error::AmgDdError;
use crate::composite::row::CompositeMatrixRow;
use crate::debug_invariants::DebugInvariants;
use crate::hierarchy::{CfMarker, ParLevel};
use itertools::Itertools;
use std::ops::Range;

/// Stable handle to a composite-grid node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Per-node data of a composite grid.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositeNode {
    pub global_index: usize,
    pub residual: f64,
    pub a_row: CompositeMatrixRow,
    /// Absent on the coarsest level.
    pub p_row: Option<CompositeMatrixRow>,
    /// Halo-only node kept for stencil closure. Always `false` on the coarsest level.
    pub ghost: bool,
    pub coarse_global_index: Option<usize>,
    /// Position of the coarse counterpart in the next coarser grid.
    pub coarse_local_index: Option<usize>,
}

/// Solve-ready CSR view of the A or P rows of a composite grid.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompositeCsr {
    pub row_ptr: Vec<usize>,
    /// Local column positions; `None` where the column is not in the grid.
    pub col_ind: Vec<Option<usize>>,
    pub global_col: Vec<usize>,
    pub values: Vec<f64>,
}

/// Resolves global indices against the sorted view of a grid.
#[derive(Copy, Clone)]
pub(super) struct Lookup<'a> {
    globals: &'a [usize],
    first_owned: usize,
    num_owned: usize,
}

impl Lookup<'_> {
    pub(super) fn local_index(&self, global: usize) -> Option<usize> {
        if global >= self.first_owned && global - self.first_owned < self.num_owned {
            return Some(global - self.first_owned);
        }
        self.globals[self.num_owned..]
            .binary_search(&global)
            .ok()
            .map(|i| i + self.num_owned)
    }
}

#[derive(Clone, Debug)]
pub struct CompositeGrid {
    pub(super) level: usize,
    pub(super) first_owned: usize,
    pub(super) num_owned: usize,
    pub(super) has_coarse: bool,
    pub(super) nodes: Vec<CompositeNode>,
    pub(super) order: Vec<NodeId>,
    pub(super) position: Vec<usize>,
    pub(super) globals: Vec<usize>,
    pub(super) mem_capacity: usize,
}

impl CompositeGrid {
    /// Populate the owned block from this rank's rows of one level.
    ///
    /// Owned C-points receive consecutive coarse global indices starting at
    /// `coarse_first_index`, the first owned row of the next coarser level.
    pub fn initialize(
        level: usize,
        rows: &ParLevel,
        coarse_first_index: usize,
    ) -> Result<Self, AmgDdError> {
        let n = rows.num_owned();
        if rows.residual.len() != n || rows.cf_marker.len() != n {
            return Err(AmgDdError::InvalidHierarchy {
                level,
                reason: format!(
                    "{n} rows but {} residual entries and {} C/F markers",
                    rows.residual.len(),
                    rows.cf_marker.len()
                ),
            });
        }
        let has_coarse = rows.p.is_some();
        let mut nodes = Vec::with_capacity(n);
        let mut next_coarse = coarse_first_index;
        for i in 0..n {
            let (cols, vals) = rows.a.row(i);
            let p_row = rows
                .p
                .as_ref()
                .map(|p| {
                    let (pc, pv) = p.row(i);
                    CompositeMatrixRow::from_slices(pv, pc)
                });
            let (coarse_global_index, coarse_local_index) =
                if has_coarse && rows.cf_marker[i] == CfMarker::Coarse {
                    let g = next_coarse;
                    next_coarse += 1;
                    (Some(g), Some(g - coarse_first_index))
                } else {
                    (None, None)
                };
            nodes.push(CompositeNode {
                global_index: rows.first_row + i,
                residual: rows.residual[i],
                a_row: CompositeMatrixRow::from_slices(vals, cols),
                p_row,
                ghost: false,
                coarse_global_index,
                coarse_local_index,
            });
        }
        let grid = Self {
            level,
            first_owned: rows.first_row,
            num_owned: n,
            has_coarse,
            order: (0..n).map(NodeId).collect(),
            position: (0..n).collect(),
            globals: nodes.iter().map(|nd| nd.global_index).collect(),
            nodes,
            mem_capacity: n,
        };
        crate::debug_invariants!(grid.validate_invariants(), "CompositeGrid::initialize");
        Ok(grid)
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn num_nodes(&self) -> usize {
        self.order.len()
    }

    pub fn num_owned(&self) -> usize {
        self.num_owned
    }

    pub fn num_nonowned(&self) -> usize {
        self.num_nodes() - self.num_owned
    }

    pub fn has_coarse(&self) -> bool {
        self.has_coarse
    }

    pub fn first_owned(&self) -> usize {
        self.first_owned
    }

    pub fn owned_range(&self) -> Range<usize> {
        self.first_owned..self.first_owned + self.num_owned
    }

    pub fn is_owned_global(&self, global: usize) -> bool {
        self.owned_range().contains(&global)
    }

    pub fn mem_capacity(&self) -> usize {
        self.mem_capacity
    }

    /// Grow storage to at least `new_capacity` slots, keeping all contents.
    pub fn resize(&mut self, new_capacity: usize) {
        if new_capacity <= self.mem_capacity {
            return;
        }
        let extra = new_capacity - self.nodes.len();
        self.nodes.reserve_exact(extra);
        self.position.reserve_exact(extra);
        self.order.reserve_exact(new_capacity - self.order.len());
        self.globals.reserve_exact(new_capacity - self.globals.len());
        log::trace!(
            "level {}: composite grid capacity {} -> {}",
            self.level,
            self.mem_capacity,
            new_capacity
        );
        self.mem_capacity = new_capacity;
    }

    /// Make room for `additional` nodes, doubling when growth is needed.
    pub fn reserve_nodes(&mut self, additional: usize) {
        let need = self.num_nodes() + additional;
        if need > self.mem_capacity {
            self.resize(need.max(2 * self.mem_capacity));
        }
    }

    /// Global indices in position order.
    pub fn global_indices(&self) -> &[usize] {
        &self.globals
    }

    pub fn global_index(&self, pos: usize) -> usize {
        self.globals[pos]
    }

    pub fn id_at(&self, pos: usize) -> NodeId {
        self.order[pos]
    }

    pub fn position_of(&self, id: NodeId) -> usize {
        self.position[id.0]
    }

    /// The handle of an owned node at local row `row`.
    pub fn owned_id(&self, row: usize) -> NodeId {
        NodeId(row)
    }

    pub fn node(&self, pos: usize) -> &CompositeNode {
        &self.nodes[self.order[pos].0]
    }

    pub fn node_mut(&mut self, pos: usize) -> &mut CompositeNode {
        &mut self.nodes[self.order[pos].0]
    }

    pub fn node_by_id(&self, id: NodeId) -> &CompositeNode {
        &self.nodes[id.0]
    }

    /// Nodes in position order.
    pub fn nodes(&self) -> impl Iterator<Item = &CompositeNode> + '_ {
        self.order.iter().map(move |id| &self.nodes[id.0])
    }

    pub(super) fn lookup(&self) -> Lookup<'_> {
        Lookup {
            globals: &self.globals,
            first_owned: self.first_owned,
            num_owned: self.num_owned,
        }
    }

    /// Binary search of the sorted non-owned block.
    ///
    /// `Ok(pos)` if `global` is stored there, otherwise `Err(pos)` with the
    /// position that keeps the block sorted.
    pub fn search_nonowned(&self, global: usize) -> Result<usize, usize> {
        self.globals[self.num_owned..]
            .binary_search(&global)
            .map(|i| i + self.num_owned)
            .map_err(|i| i + self.num_owned)
    }

    /// Position of `global` in the non-owned block, or its insertion point
    /// when `insertion_point` is set. `None` if absent and no insertion point
    /// was asked for.
    pub fn local_index_binary_search(&self, global: usize, insertion_point: bool) -> Option<usize> {
        match self.search_nonowned(global) {
            Ok(pos) => Some(pos),
            Err(pos) if insertion_point => Some(pos),
            Err(_) => None,
        }
    }

    /// Position of `global` anywhere in the grid.
    pub fn local_index(&self, global: usize) -> Option<usize> {
        self.lookup().local_index(global)
    }

    /// Position among the non-owned nodes where the owned block would sit in
    /// a single globally sorted list.
    pub fn owned_insertion_position(&self) -> usize {
        if self.num_owned == 0 {
            return 0;
        }
        match self.search_nonowned(self.first_owned) {
            Ok(pos) | Err(pos) => pos,
        }
    }

    /// All positions, visited in ascending global order.
    pub fn positions_by_global(&self) -> impl Iterator<Item = usize> + '_ {
        let ins = self.owned_insertion_position();
        (self.num_owned..ins)
            .chain(0..self.num_owned)
            .chain(ins..self.num_nodes())
    }

    /// The sorted-view lookup together with mutable access to the arena.
    pub(super) fn lookup_and_nodes(&mut self) -> (Lookup<'_>, &mut [CompositeNode]) {
        let lookup = Lookup {
            globals: &self.globals,
            first_owned: self.first_owned,
            num_owned: self.num_owned,
        };
        (lookup, &mut self.nodes)
    }

    /// Append a node to the arena without placing it in the sorted view.
    pub(super) fn push_node(&mut self, node: CompositeNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        self.position.push(usize::MAX);
        id
    }

    /// Replace the non-owned block of the sorted view.
    pub(super) fn set_nonowned_order(&mut self, nonowned: Vec<NodeId>) {
        self.order.truncate(self.num_owned);
        self.order.extend(nonowned);
        self.globals.truncate(self.num_owned);
        for pos in self.num_owned..self.order.len() {
            let id = self.order[pos];
            self.position[id.0] = pos;
            self.globals.push(self.nodes[id.0].global_index);
        }
    }

    pub fn a_csr(&self) -> CompositeCsr {
        csr_of(self.nodes().map(|n| &n.a_row))
    }

    /// `None` on the coarsest level.
    pub fn p_csr(&self) -> Option<CompositeCsr> {
        if !self.has_coarse {
            return None;
        }
        let empty = CompositeMatrixRow::default();
        Some(csr_of(self.nodes().map(|n| n.p_row.as_ref().unwrap_or(&empty))))
    }
}

fn csr_of<'a>(rows: impl Iterator<Item = &'a CompositeMatrixRow>) -> CompositeCsr {
    let mut csr = CompositeCsr {
        row_ptr: vec![0],
        ..Default::default()
    };
    for row in rows {
        csr.col_ind.extend_from_slice(&row.local_cols);
        csr.global_col.extend_from_slice(&row.global_cols);
        csr.values.extend_from_slice(&row.values);
        csr.row_ptr.push(csr.values.len());
    }
    csr
}

impl DebugInvariants for CompositeGrid {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "CompositeGrid invalid");
    }

    fn validate_invariants(&self) -> Result<(), AmgDdError> {
        let level = self.level;
        let n = self.num_nodes();
        let broken = |reason: String| AmgDdError::SelfCheckFailed { level, reason };
        if n != self.nodes.len() || self.position.len() != n || self.globals.len() != n {
            return Err(broken(format!(
                "sorted view has {n} entries for {} arena nodes",
                self.nodes.len()
            )));
        }
        for (pos, id) in self.order.iter().enumerate() {
            if self.position[id.0] != pos {
                return Err(broken(format!("handle {} maps back to the wrong position", id.0)));
            }
            let node = &self.nodes[id.0];
            if self.globals[pos] != node.global_index {
                return Err(broken(format!("stale global index at position {pos}")));
            }
            if node.p_row.is_some() != self.has_coarse {
                return Err(broken(format!("P row presence wrong at position {pos}")));
            }
            if !self.has_coarse && node.ghost {
                return Err(broken(format!("ghost node on the coarsest level at {pos}")));
            }
            for &local in node.a_row.local_cols.iter().flatten() {
                if local >= n {
                    return Err(AmgDdError::UnresolvedIndex {
                        level,
                        index: local,
                        num_nodes: n,
                    });
                }
            }
        }
        for (i, &g) in self.globals[..self.num_owned].iter().enumerate() {
            if g != self.first_owned + i {
                return Err(broken(format!("owned position {i} holds global {g}")));
            }
        }
        let nonowned = &self.globals[self.num_owned..];
        if let Some((i, _)) = nonowned
            .iter()
            .tuple_windows()
            .find_position(|(a, b)| a >= b)
        {
            return Err(AmgDdError::UnsortedNonOwned {
                level,
                position: self.num_owned + i + 1,
            });
        }
        if let Some(&g) = nonowned.iter().find(|&&g| self.is_owned_global(g)) {
            return Err(AmgDdError::DuplicateNode { level, global: g });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{OneHopPattern, ParCsr};

    /// Rows 4..8 of a 1D Laplacian on 12 nodes, every other row coarse.
    fn chain_rows() -> ParLevel {
        let n = 12;
        let first = 4;
        let a = ParCsr::from_rows((first..first + 4).map(|i| {
            let mut r = Vec::new();
            if i > 0 {
                r.push((i - 1, -1.0));
            }
            r.push((i, 2.0));
            if i + 1 < n {
                r.push((i + 1, -1.0));
            }
            r
        }));
        let p = ParCsr::from_rows((first..first + 4).map(|i| vec![(i / 2, 1.0)]));
        ParLevel {
            first_row: first,
            num_global_rows: n,
            a,
            p: Some(p),
            residual: vec![0.5, 1.5, 2.5, 3.5],
            cf_marker: vec![CfMarker::Coarse, CfMarker::Fine, CfMarker::Coarse, CfMarker::Fine],
            comm_pattern: OneHopPattern::default(),
        }
    }

    #[test]
    fn initialize_fills_owned_block() {
        let grid = CompositeGrid::initialize(0, &chain_rows(), 2).unwrap();
        assert_eq!(grid.num_nodes(), 4);
        assert_eq!(grid.num_owned(), 4);
        assert_eq!(grid.global_indices(), &[4, 5, 6, 7]);
        assert_eq!(grid.node(0).coarse_global_index, Some(2));
        assert_eq!(grid.node(0).coarse_local_index, Some(0));
        assert_eq!(grid.node(1).coarse_global_index, None);
        assert_eq!(grid.node(2).coarse_global_index, Some(3));
        assert_eq!(grid.node(2).coarse_local_index, Some(1));
        assert!(grid.nodes().all(|n| !n.ghost && n.p_row.is_some()));
        grid.validate_invariants().unwrap();
    }

    #[test]
    fn owned_lookup_is_direct() {
        let grid = CompositeGrid::initialize(0, &chain_rows(), 2).unwrap();
        assert_eq!(grid.local_index(6), Some(2));
        assert_eq!(grid.local_index(3), None);
        assert_eq!(grid.local_index_binary_search(3, false), None);
        assert_eq!(grid.local_index_binary_search(3, true), Some(4));
        assert_eq!(grid.owned_insertion_position(), 4);
    }

    #[test]
    fn resize_keeps_contents() {
        let mut grid = CompositeGrid::initialize(0, &chain_rows(), 2).unwrap();
        grid.resize(32);
        assert_eq!(grid.mem_capacity(), 32);
        assert_eq!(grid.global_indices(), &[4, 5, 6, 7]);
        grid.reserve_nodes(40);
        assert_eq!(grid.mem_capacity(), 64);
    }

    #[test]
    fn csr_view_follows_positions() {
        let grid = CompositeGrid::initialize(0, &chain_rows(), 2).unwrap();
        let a = grid.a_csr();
        assert_eq!(a.row_ptr, vec![0, 3, 6, 9, 12]);
        assert_eq!(&a.global_col[..3], &[3, 4, 5]);
        let p = grid.p_csr().unwrap();
        assert_eq!(p.global_col, vec![2, 2, 3, 3]);
    }
}
