//! Bounded-distance traversals over the resolved A rows of a composite grid.
//!
//! All searches are explicit worklists. A node reached with `m` hops of
//! budget left is flagged `Visited(m)` unless it already carries at least
//! that much; it then passes `m - 1` to its own neighbors. The result is the
//! max-remaining-budget labelling, independent of visiting order.

use crate::composite::{AddFlag, CompositeGrid};

/// Expand from `start` with `budget` hops.
///
/// `on_unresolved(global, m)` is called for every column that is not in the
/// grid, with the budget the missing node would have received.
pub fn expand<F>(
    grid: &CompositeGrid,
    flags: &mut [AddFlag],
    start: usize,
    budget: usize,
    mut on_unresolved: F,
) where
    F: FnMut(usize, usize),
{
    if budget == 0 {
        return;
    }
    let mut stack = vec![(start, budget)];
    while let Some((pos, m)) = stack.pop() {
        for (_, global, local) in grid.node(pos).a_row.entries() {
            match local {
                Some(idx) => {
                    if flags[idx].raise(m) && m > 1 {
                        stack.push((idx, m - 1));
                    }
                }
                None => on_unresolved(global, m),
            }
        }
    }
}

/// Outcome of extending one level of a Psi composite.
#[derive(Debug, Default)]
pub struct PsiPass {
    /// Columns met during the traversal that are not in the grid.
    pub unresolved: usize,
    /// Whether any node of the next coarser level was seeded.
    pub seeded_coarse: bool,
}

/// Grow the region marked by `Seed` flags on one level.
///
/// 1. Expand every seed by `padding` hops.
/// 2. Seed the coarse counterpart of every node reached so far in `coarse`.
/// 3. Relabel: interior nodes `Visited(G + 2)`, the padding boundary `Visited(G + 1)`.
/// 4. Expand the boundary by `G = num_ghost_layers` hops.
///
/// Afterwards a flagged node is real iff its weight is above `G`, see [`is_ghost`].
pub fn build_psi_level(
    grid: &CompositeGrid,
    flags: &mut [AddFlag],
    coarse: Option<&mut [AddFlag]>,
    padding: usize,
    num_ghost_layers: usize,
) -> PsiPass {
    let mut pass = PsiPass::default();
    let mut count = |_g: usize, _m: usize| pass.unresolved += 1;

    let seeds: Vec<usize> = (0..flags.len()).filter(|&i| flags[i] == AddFlag::Seed).collect();
    for s in seeds {
        expand(grid, flags, s, padding, &mut count);
    }

    if let Some(coarse) = coarse {
        for (pos, f) in flags.iter().enumerate() {
            if !f.is_set() {
                continue;
            }
            if let Some(c) = grid.node(pos).coarse_local_index {
                coarse[c] = AddFlag::Seed;
                pass.seeded_coarse = true;
            }
        }
    }

    let g = num_ghost_layers;
    for f in flags.iter_mut() {
        *f = match *f {
            AddFlag::Seed => AddFlag::Visited(g + 2),
            AddFlag::Visited(d) if d > 1 => AddFlag::Visited(g + 2),
            AddFlag::Visited(1) => AddFlag::Visited(g + 1),
            other => other,
        };
    }

    let boundary: Vec<usize> = (0..flags.len())
        .filter(|&i| flags[i] == AddFlag::Visited(g + 1))
        .collect();
    for b in boundary {
        expand(grid, flags, b, g, &mut count);
    }
    pass
}

/// Ghost classification of a flagged node after [`build_psi_level`].
pub fn is_ghost(flag: AddFlag, num_ghost_layers: usize) -> bool {
    flag.weight() < num_ghost_layers + 1
}
