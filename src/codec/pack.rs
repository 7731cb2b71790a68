//! Packing the composite sub-grid one destination needs.

use crate::algs::wire::{WireWord, WireWriter};
use crate::composite::add_flag::flags;
use crate::composite::{AddFlag, CompositeGrid, CompositeMatrixRow, LevelCommPackage, NodeId};
use crate::neighbors::traversal::{build_psi_level, is_ghost};
use crate::params::CompGridParams;

/// A packed buffer for one destination.
#[derive(Clone, Debug)]
pub struct PackedSend {
    pub peer: usize,
    pub words: Vec<WireWord>,
    pub num_psi_levels: usize,
    /// Nodes sent, indexed by absolute level; empty outside the Psi levels.
    pub send_flag: Vec<Vec<NodeId>>,
}

/// Select the nodes for the `dest`-th send proc of `level` and encode them.
///
/// Level `level` sends exactly the discovered rows. Every real row with a
/// coarse counterpart seeds the next level, which is grown by `padding`
/// real and `num_ghost_layers` ghost hops; this repeats down the hierarchy
/// while a level seeds the next.
pub fn pack_send_buffer(
    grids: &[CompositeGrid],
    pkg: &LevelCommPackage,
    dest: usize,
    level: usize,
    params: &CompGridParams,
) -> PackedSend {
    let num_levels = grids.len();
    let mut send_flag: Vec<Vec<NodeId>> = vec![Vec::new(); num_levels];
    let mut ghost: Vec<Vec<bool>> = vec![Vec::new(); num_levels];

    let grid = &grids[level];
    let (rows, markers) = pkg.send_slice(dest);
    let mut next = (level + 1 < num_levels).then(|| flags(grids[level + 1].num_nodes()));
    let mut nodes_to_add = false;
    for (&row, &g) in rows.iter().zip(markers) {
        send_flag[level].push(grid.owned_id(row));
        ghost[level].push(g);
        if g {
            continue;
        }
        if let (Some(coarse), Some(c)) = (next.as_mut(), grid.node(row).coarse_local_index) {
            coarse[c] = AddFlag::Seed;
            nodes_to_add = true;
        }
    }

    let mut l = level + 1;
    while nodes_to_add && l < num_levels {
        let mut cur = next.take().unwrap_or_default();
        next = (l + 1 < num_levels).then(|| flags(grids[l + 1].num_nodes()));
        let pass = build_psi_level(
            &grids[l],
            &mut cur,
            next.as_deref_mut(),
            params.padding,
            params.num_ghost_layers,
        );
        if pass.unresolved > 0 {
            log::warn!(
                "level {l}: {} columns unresolved while building the Psi composite for rank {}",
                pass.unresolved,
                pkg.send_procs[dest]
            );
        }
        for pos in grids[l].positions_by_global() {
            if cur[pos].is_set() {
                send_flag[l].push(grids[l].id_at(pos));
                ghost[l].push(is_ghost(cur[pos], params.num_ghost_layers));
            }
        }
        nodes_to_add = pass.seeded_coarse;
        l += 1;
    }
    let num_psi_levels = l - level;

    let mut w = WireWriter::new();
    w.push_count(num_psi_levels);
    for lvl in level..level + num_psi_levels {
        encode_level(&mut w, &grids[lvl], &send_flag[lvl], &ghost[lvl]);
    }

    PackedSend {
        peer: pkg.send_procs[dest],
        words: w.finish(),
        num_psi_levels,
        send_flag,
    }
}

fn encode_level(w: &mut WireWriter, grid: &CompositeGrid, ids: &[NodeId], ghost: &[bool]) {
    let nodes: Vec<_> = ids.iter().map(|&id| grid.node_by_id(id)).collect();
    w.push_count(nodes.len());
    for n in &nodes {
        w.push_index(n.global_index);
    }
    for n in &nodes {
        w.push_value(n.residual);
    }
    if grid.has_coarse() {
        for &g in ghost {
            w.push_flag(g);
        }
        for n in &nodes {
            w.push_opt_index(n.coarse_global_index);
        }
    }
    let empty = CompositeMatrixRow::default();
    for n in &nodes {
        encode_row(w, &n.a_row);
        if grid.has_coarse() {
            encode_row(w, n.p_row.as_ref().unwrap_or(&empty));
        }
    }
}

pub(crate) fn encode_row(w: &mut WireWriter, row: &CompositeMatrixRow) {
    w.push_count(row.len());
    for &v in &row.values {
        w.push_value(v);
    }
    for &c in &row.global_cols {
        w.push_index(c);
    }
}

/// Pack every destination of `level`.
#[cfg(feature = "rayon")]
pub fn pack_all(
    grids: &[CompositeGrid],
    pkg: &LevelCommPackage,
    level: usize,
    params: &CompGridParams,
) -> Vec<PackedSend> {
    use rayon::prelude::*;
    (0..pkg.num_sends())
        .into_par_iter()
        .map(|dest| pack_send_buffer(grids, pkg, dest, level, params))
        .collect()
}

/// Pack every destination of `level`.
#[cfg(not(feature = "rayon"))]
pub fn pack_all(
    grids: &[CompositeGrid],
    pkg: &LevelCommPackage,
    level: usize,
    params: &CompGridParams,
) -> Vec<PackedSend> {
    (0..pkg.num_sends())
        .map(|dest| pack_send_buffer(grids, pkg, dest, level, params))
        .collect()
}
