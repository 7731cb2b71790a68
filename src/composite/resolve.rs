//! Local-index resolution of composite-grid rows.

use crate::composite::grid::CompositeGrid;

impl CompositeGrid {
    /// Point every A column at its position in this grid, or `None`.
    pub fn resolve_a_rows(&mut self) {
        let (lookup, nodes) = self.lookup_and_nodes();
        for node in nodes {
            node.a_row.resolve_with(|g| lookup.local_index(g));
        }
    }

    /// Point every P column and coarse link at its position in `coarse`.
    pub fn resolve_coarse(&mut self, coarse: &CompositeGrid) {
        let lookup = coarse.lookup();
        for node in &mut self.nodes {
            if let Some(p) = node.p_row.as_mut() {
                p.resolve_with(|g| lookup.local_index(g));
            }
            node.coarse_local_index = node.coarse_global_index.and_then(|g| lookup.local_index(g));
        }
    }

    /// Count of A columns that did not resolve.
    pub fn num_unresolved_a_cols(&self) -> usize {
        self.nodes()
            .map(|n| n.a_row.local_cols.iter().filter(|c| c.is_none()).count())
            .sum()
    }
}

/// Resolve A rows of every level against their own grid, and P rows and
/// coarse links against the next coarser grid.
///
/// Idempotent: with no merge in between, a second call changes nothing.
pub fn resolve_local_indices(grids: &mut [CompositeGrid]) {
    for level in 0..grids.len() {
        let (fine, coarser) = grids.split_at_mut(level + 1);
        let grid = &mut fine[level];
        grid.resolve_a_rows();
        if let Some(coarse) = coarser.first() {
            grid.resolve_coarse(coarse);
        }
    }
}
