//! Row-block distribution of a serial hierarchy.
//!
//! Rank `r` owns rows `starts[r]..starts[r + 1]` of the finest level. On each
//! coarser level it owns the coarse rows of its own C-points, which are
//! contiguous because coarse indices follow fine row order.

use crate::amgdd_error::AmgDdError;
use crate::hierarchy::serial::{CsrMatrix, SerialHierarchy};
use crate::hierarchy::{AmgHierarchy, CfMarker, OneHopPattern, ParCsr, ParLevel};
use std::ops::Range;

/// Row starts of every level, derived from the finest-level `starts`.
pub fn level_row_starts(h: &SerialHierarchy, starts: &[usize]) -> Vec<Vec<usize>> {
    let mut all = vec![starts.to_vec()];
    for level in h.levels.iter().take(h.levels.len().saturating_sub(1)) {
        let fine = all.last().map(Vec::as_slice).unwrap_or_default();
        let mut before = Vec::with_capacity(level.cf_marker.len() + 1);
        before.push(0);
        for m in &level.cf_marker {
            let last = before.last().copied().unwrap_or(0);
            before.push(last + usize::from(*m == CfMarker::Coarse));
        }
        let coarse = fine.iter().map(|&s| before[s]).collect();
        all.push(coarse);
    }
    all
}

fn owner_of(starts: &[usize], row: usize) -> usize {
    starts.partition_point(|&s| s <= row) - 1
}

/// One-hop pattern of the rows `owned` of `a` under the row distribution `starts`.
///
/// A neighbor needs every owned row that has a column in the neighbor's range.
pub fn one_hop_pattern(a: &CsrMatrix, starts: &[usize], owned: Range<usize>) -> OneHopPattern {
    let mut pat = OneHopPattern {
        send_map_starts: vec![0],
        ..Default::default()
    };
    if owned.is_empty() {
        return pat;
    }
    let me = owner_of(starts, owned.start);
    let num_ranks = starts.len() - 1;
    let mut rows_for: Vec<Vec<usize>> = vec![Vec::new(); num_ranks];
    for (local, row) in owned.clone().enumerate() {
        let (cols, _) = a.row(row);
        let mut peers: Vec<usize> = cols
            .iter()
            .filter(|&&c| !owned.contains(&c))
            .map(|&c| owner_of(starts, c))
            .collect();
        peers.sort_unstable();
        peers.dedup();
        for q in peers {
            rows_for[q].push(local);
        }
    }
    for (q, rows) in rows_for.into_iter().enumerate() {
        if q == me || rows.is_empty() {
            continue;
        }
        pat.send_procs.push(q);
        pat.send_map_elmts.extend(rows);
        pat.send_map_starts.push(pat.send_map_elmts.len());
    }
    pat.recv_procs = pat.send_procs.clone();
    pat
}

fn rows_of(m: &CsrMatrix, rows: Range<usize>) -> ParCsr {
    ParCsr::from_rows(rows.map(|i| {
        let (c, v) = m.row(i);
        c.iter().copied().zip(v.iter().copied()).collect::<Vec<_>>()
    }))
}

/// This rank's share of every level.
pub fn distribute(
    h: &SerialHierarchy,
    starts: &[usize],
    rank: usize,
) -> Result<AmgHierarchy, AmgDdError> {
    let num_ranks = starts.len().saturating_sub(1);
    if rank >= num_ranks {
        return Err(AmgDdError::InvalidHierarchy {
            level: 0,
            reason: format!("rank {rank} outside {num_ranks} row blocks"),
        });
    }
    if h.levels.first().map(|l| l.a.num_rows) != starts.last().copied() {
        return Err(AmgDdError::InvalidHierarchy {
            level: 0,
            reason: "row starts do not cover the finest level".into(),
        });
    }
    let all_starts = level_row_starts(h, starts);
    let levels = h
        .levels
        .iter()
        .zip(&all_starts)
        .map(|(l, s)| {
            let owned = s[rank]..s[rank + 1];
            ParLevel {
                first_row: owned.start,
                num_global_rows: l.a.num_rows,
                a: rows_of(&l.a, owned.clone()),
                p: l.p.as_ref().map(|p| rows_of(p, owned.clone())),
                residual: l.residual[owned.clone()].to_vec(),
                cf_marker: l.cf_marker[owned.clone()].to_vec(),
                comm_pattern: one_hop_pattern(&l.a, s, owned),
            }
        })
        .collect();
    let out = AmgHierarchy::new(levels);
    out.validate()?;
    Ok(out)
}
