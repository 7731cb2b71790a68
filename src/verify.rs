//! Finalize self-checks for a finished composite hierarchy.
//!
//! [`check_shape`], [`check_coarse_links`] and [`check_restriction`] are local. [`check_data`] and [`check_symmetry`] are
//! collective: every rank must call them, and each completes its all-gather
//! before looking at the result, so a failure on one rank never strands the
//! others inside an exchange.

use crate::algs::communicator::Communicator;
use crate::algs::exchange::all_gather_words;
use crate::algs::wire::{WireReader, WireWord, WireWriter};
use crate::amgdd_error::AmgDdError;
use crate::codec::pack::encode_row;
use crate::codec::unpack::decode_row;
use crate::composite::add_flag::flags;
use crate::composite::{AddFlag, CompGridCommPkg, CompositeGrid, CompositeMatrixRow};
use crate::debug_invariants::DebugInvariants;
use crate::hierarchy::AmgHierarchy;
use crate::neighbors::traversal::{build_psi_level, is_ghost};
use crate::params::CompGridParams;

/// Rebuild the expected composite grids serially from the owned nodes and
/// compare them against `grids`.
///
/// Owned finest-level nodes seed the reconstruction; each level is grown by
/// `padding` real and `num_ghost_layers` ghost hops and seeds the next level
/// through its coarse links. Fails if a node the reconstruction needs is
/// missing, if a stored node is never reached, or if a ghost marker
/// disagrees on a level that has a coarser level.
pub fn check_shape(grids: &[CompositeGrid], params: &CompGridParams) -> Result<(), AmgDdError> {
    let num_levels = grids.len();
    let Some(finest) = grids.first() else {
        return Ok(());
    };
    let mut cur = flags(finest.num_nodes());
    for f in &mut cur[..finest.num_owned()] {
        *f = AddFlag::Seed;
    }

    for (level, grid) in grids.iter().enumerate() {
        let mut next = (level + 1 < num_levels).then(|| flags(grids[level + 1].num_nodes()));
        let pass = build_psi_level(
            grid,
            &mut cur,
            next.as_deref_mut(),
            params.padding,
            params.num_ghost_layers,
        );
        let fail = |reason: String| AmgDdError::SelfCheckFailed { level, reason };
        if pass.unresolved > 0 {
            return Err(fail(format!(
                "{} nodes needed by the composite grid are missing",
                pass.unresolved
            )));
        }
        if let Some(pos) = cur.iter().position(|f| !f.is_set()) {
            return Err(fail(format!("extra node with global index {}", grid.global_index(pos))));
        }
        if grid.has_coarse() {
            for (pos, f) in cur.iter().enumerate() {
                let want = is_ghost(*f, params.num_ghost_layers);
                if grid.node(pos).ghost != want {
                    return Err(fail(format!(
                        "global index {} marked {} but should be {}",
                        grid.global_index(pos),
                        if want { "real" } else { "ghost" },
                        if want { "ghost" } else { "real" }
                    )));
                }
            }
        }
        match next {
            Some(n) if pass.seeded_coarse => cur = n,
            _ => break,
        }
    }
    Ok(())
}

/// Every coarse link must name a row of the next level.
pub fn check_coarse_links(
    grids: &[CompositeGrid],
    hierarchy: &AmgHierarchy,
) -> Result<(), AmgDdError> {
    for (level, grid) in grids.iter().enumerate() {
        let rows = hierarchy.levels.get(level + 1).map_or(0, |l| l.num_global_rows);
        for node in grid.nodes() {
            match node.coarse_global_index {
                Some(c) if c >= rows => {
                    return Err(AmgDdError::SelfCheckFailed {
                        level,
                        reason: format!(
                            "global index {} links to coarse row {c} of {rows}",
                            node.global_index
                        ),
                    });
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Check that restriction can run on every level.
///
/// A node whose A row touches a real node has its residual changed by
/// relaxation, so every coarse node in its P row must be present in the
/// coarse composite grid to receive the restricted residual.
pub fn check_restriction(grids: &[CompositeGrid]) -> Result<(), AmgDdError> {
    for (level, pair) in grids.windows(2).enumerate() {
        let (grid, coarse) = (&pair[0], &pair[1]);
        for node in grid.nodes() {
            let touches_real = node
                .a_row
                .local_cols
                .iter()
                .flatten()
                .any(|&idx| !grid.node(idx).ghost);
            if !touches_real {
                continue;
            }
            let Some(p) = &node.p_row else { continue };
            let missing = p.entries().find_map(|(_, g, local)| local.is_none().then_some(g));
            if let Some(missing) = missing {
                return Err(AmgDdError::SelfCheckFailed {
                    level: coarse.level(),
                    reason: format!(
                        "global index {missing} is in the restriction range of {} but missing",
                        node.global_index
                    ),
                });
            }
        }
    }
    Ok(())
}

fn encode_grids(grids: &[CompositeGrid]) -> Vec<WireWord> {
    let mut w = WireWriter::new();
    w.push_count(grids.len());
    for grid in grids {
        w.push_count(grid.num_nodes());
        for node in grid.nodes() {
            w.push_index(node.global_index);
            w.push_value(node.residual);
            w.push_opt_index(node.coarse_global_index);
            encode_row(&mut w, &node.a_row);
            if let Some(p) = &node.p_row {
                encode_row(&mut w, p);
            }
        }
    }
    w.finish()
}

fn same_row(row: &CompositeMatrixRow, cols: &[usize], vals: &[f64]) -> bool {
    row.global_cols == cols
        && row.values.len() == vals.len()
        && row.values.iter().zip(vals).all(|(a, b)| a.to_bits() == b.to_bits())
}

/// All-gather every composite grid and compare the copies of owned nodes
/// bit-for-bit against this rank's hierarchy rows.
pub fn check_data<C>(
    grids: &[CompositeGrid],
    hierarchy: &AmgHierarchy,
    params: &CompGridParams,
    comm: &C,
) -> Result<(), AmgDdError>
where
    C: Communicator,
{
    let tags = params.tags();
    let gathered = all_gather_words(
        encode_grids(grids),
        comm,
        tags.gather_sizes,
        tags.gather_data,
    )?;

    for (holder, words) in gathered.iter().enumerate() {
        let mut r = WireReader::new(words);
        let num_levels = r.count()?;
        if num_levels != grids.len() {
            return Err(AmgDdError::MalformedBuffer(format!(
                "rank {holder} reports {num_levels} levels, expected {}",
                grids.len()
            )));
        }
        for (level, mine) in grids.iter().enumerate() {
            let rows = &hierarchy.levels[level];
            let n = r.count()?;
            for _ in 0..n {
                let global = r.index()?;
                let residual = r.value()?;
                let coarse = r.opt_index()?;
                let a_row = decode_row(&mut r)?;
                let p_row = if mine.has_coarse() { Some(decode_row(&mut r)?) } else { None };
                if !mine.is_owned_global(global) {
                    continue;
                }
                let row = global - mine.first_owned();
                let stale = |what| AmgDdError::DataMismatch {
                    level,
                    holder,
                    global,
                    what,
                };
                if residual.to_bits() != rows.residual[row].to_bits() {
                    return Err(stale("residual"));
                }
                if coarse != mine.node(row).coarse_global_index {
                    return Err(stale("coarse global index"));
                }
                let (cols, vals) = rows.a.row(row);
                if !same_row(&a_row, cols, vals) {
                    return Err(stale("A row"));
                }
                if let (Some(p), Some(want)) = (&p_row, &rows.p) {
                    let (cols, vals) = want.row(row);
                    if !same_row(p, cols, vals) {
                        return Err(stale("P row"));
                    }
                }
            }
        }
        r.finish()?;
    }
    Ok(())
}

/// All-gather the per-level send proc lists and check that every
/// destination sends back to this rank.
pub fn check_symmetry<C, T>(
    pkg: &CompGridCommPkg<T>,
    params: &CompGridParams,
    comm: &C,
) -> Result<(), AmgDdError>
where
    C: Communicator,
{
    let tags = params.tags();
    let mut w = WireWriter::new();
    w.push_count(pkg.num_levels);
    for level in 0..pkg.num_levels {
        let procs = pkg.send_procs(level);
        w.push_count(procs.len());
        for &p in procs {
            w.push_index(p);
        }
    }
    let gathered = all_gather_words(w.finish(), comm, tags.gather_sizes, tags.gather_data)?;

    let mut send_procs: Vec<Vec<Vec<usize>>> = Vec::with_capacity(gathered.len());
    for words in &gathered {
        let mut r = WireReader::new(words);
        let num_levels = r.count()?;
        let mut levels = Vec::with_capacity(num_levels);
        for _ in 0..num_levels {
            let n = r.count()?;
            levels.push((0..n).map(|_| r.index()).collect::<Result<Vec<_>, _>>()?);
        }
        r.finish()?;
        send_procs.push(levels);
    }

    let me = comm.rank();
    for level in 0..pkg.num_levels {
        for &peer in pkg.send_procs(level) {
            let back = send_procs
                .get(peer)
                .and_then(|levels| levels.get(level))
                .is_some_and(|procs| procs.contains(&me));
            if !back {
                return Err(AmgDdError::AsymmetricSendRecv {
                    level,
                    rank: me,
                    peer,
                });
            }
        }
    }
    Ok(())
}

/// Run every self-check. Collective.
pub fn self_check<C, T>(
    grids: &[CompositeGrid],
    pkg: &CompGridCommPkg<T>,
    hierarchy: &AmgHierarchy,
    params: &CompGridParams,
    comm: &C,
) -> Result<(), AmgDdError>
where
    C: Communicator,
{
    let data = check_data(grids, hierarchy, params, comm);
    let symmetry = check_symmetry(pkg, params, comm);
    for g in grids {
        g.validate_invariants()?;
    }
    pkg.validate_invariants()?;
    check_shape(grids, params)?;
    check_coarse_links(grids, hierarchy)?;
    check_restriction(grids)?;
    data?;
    symmetry?;
    log::debug!("rank {}: composite grid self-check passed", comm.rank());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::composite::{IncomingNode, LevelCommPackage, resolve_local_indices};
    use crate::hierarchy::distribute::distribute;
    use crate::hierarchy::serial::{build_hierarchy, laplacian_1d};

    fn lone_rank() -> (AmgHierarchy, Vec<CompositeGrid>) {
        let serial = build_hierarchy(laplacian_1d(8), vec![0.25; 8], 2, 1);
        let h = distribute(&serial, &[0, 8], 0).unwrap();
        let mut grids: Vec<CompositeGrid> = (0..h.num_levels())
            .map(|l| CompositeGrid::initialize(l, &h.levels[l], h.coarse_first_index(l)).unwrap())
            .collect();
        resolve_local_indices(&mut grids);
        (h, grids)
    }

    #[test]
    fn owned_only_grids_pass() {
        let (h, grids) = lone_rank();
        let params = CompGridParams::default();
        let pkg = CompGridCommPkg::<usize>::new(vec![LevelCommPackage::empty(); grids.len()]);
        self_check(&grids, &pkg, &h, &params, &NoComm).unwrap();
    }

    #[test]
    fn extra_node_is_reported() {
        let (_, mut grids) = lone_rank();
        let coarsest = grids.len() - 1;
        let stray = IncomingNode {
            global_index: 100,
            residual: 0.0,
            ghost: false,
            coarse_global_index: None,
            a_row: CompositeMatrixRow::new(vec![1.0], vec![100]),
            p_row: None,
        };
        grids[coarsest].merge_incoming(vec![stray], 1).unwrap();
        resolve_local_indices(&mut grids);
        let err = check_shape(&grids, &CompGridParams::default()).unwrap_err();
        assert!(matches!(err, AmgDdError::SelfCheckFailed { level, .. } if level == coarsest));
    }

    #[test]
    fn coarse_link_past_the_next_level_is_reported() {
        let (h, mut grids) = lone_rank();
        check_coarse_links(&grids, &h).unwrap();
        let rows = h.levels[1].num_global_rows;
        grids[0].node_mut(0).coarse_global_index = Some(rows);
        let err = check_coarse_links(&grids, &h).unwrap_err();
        assert!(matches!(err, AmgDdError::SelfCheckFailed { level: 0, .. }));
    }

    #[test]
    fn missing_restriction_target_is_reported() {
        let (_, mut grids) = lone_rank();
        check_restriction(&grids).unwrap();
        grids[0].node_mut(1).p_row = Some(CompositeMatrixRow::new(vec![1.0], vec![100]));
        let err = check_restriction(&grids).unwrap_err();
        assert!(matches!(err, AmgDdError::SelfCheckFailed { level: 1, .. }));
    }

    #[test]
    fn ghost_only_neighborhood_needs_no_restriction() {
        let (_, mut grids) = lone_rank();
        let n = grids[0].num_nodes();
        for pos in 0..n {
            grids[0].node_mut(pos).ghost = true;
        }
        grids[0].node_mut(1).p_row = Some(CompositeMatrixRow::new(vec![1.0], vec![100]));
        check_restriction(&grids).unwrap();
    }

    #[test]
    fn tampered_residual_is_a_data_mismatch() {
        let (h, mut grids) = lone_rank();
        grids[0].node_mut(3).residual = 9.0;
        let err = check_data(&grids, &h, &CompGridParams::default(), &NoComm).unwrap_err();
        assert!(matches!(
            err,
            AmgDdError::DataMismatch {
                level: 0,
                holder: 0,
                global: 3,
                what: "residual"
            }
        ));
    }
}
