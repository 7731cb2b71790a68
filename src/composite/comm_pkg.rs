//! Per-level communication plans of the composite grids.
//!
//! [`LevelCommPackage`] is what neighbor discovery produces for one level:
//! the ranks exchanged with and the owned rows each of them needs.
//! [`CompGridCommPkg`] collects those plans together with the send and
//! receive maps fixed by map negotiation. During setup the maps hold
//! [`NodeId`](crate::composite::NodeId) handles; [`CompGridCommPkg::to_positions`]
//! rewrites them as grid positions once every merge is done.

use crate::amgdd_error::AmgDdError;
use crate::composite::grid::{CompositeGrid, NodeId};
use crate::debug_invariants::DebugInvariants;
use std::collections::BTreeSet;

/// Discovery result for one level.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelCommPackage {
    pub send_procs: Vec<usize>,
    /// Always the same ranks as `send_procs`.
    pub recv_procs: Vec<usize>,
    pub send_map_starts: Vec<usize>,
    /// Owned local rows, grouped by destination.
    pub send_map_elmts: Vec<usize>,
    /// Parallel to `send_map_elmts`: sent as a ghost.
    pub ghost_marker: Vec<bool>,
}

impl LevelCommPackage {
    pub fn empty() -> Self {
        Self {
            send_map_starts: vec![0],
            ..Default::default()
        }
    }

    pub fn num_sends(&self) -> usize {
        self.send_procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.send_procs.is_empty()
    }

    /// `(rows, ghost markers)` destined for the `i`-th send proc.
    pub fn send_slice(&self, i: usize) -> (&[usize], &[bool]) {
        let r = self.send_map_starts[i]..self.send_map_starts[i + 1];
        (&self.send_map_elmts[r.clone()], &self.ghost_marker[r])
    }

    /// Append the rows for one more destination.
    pub fn push_dest(&mut self, proc: usize, rows: impl IntoIterator<Item = (usize, bool)>) {
        if self.send_map_starts.is_empty() {
            self.send_map_starts.push(0);
        }
        for (row, ghost) in rows {
            self.send_map_elmts.push(row);
            self.ghost_marker.push(ghost);
        }
        self.send_procs.push(proc);
        self.send_map_starts.push(self.send_map_elmts.len());
    }
}

/// Validation context: the level this package belongs to.
pub struct LevelCommPackageCheck<'a> {
    pub level: usize,
    pub pkg: &'a LevelCommPackage,
}

impl DebugInvariants for LevelCommPackageCheck<'_> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "LevelCommPackage invalid");
    }

    fn validate_invariants(&self) -> Result<(), AmgDdError> {
        let (level, pkg) = (self.level, self.pkg);
        let sends: BTreeSet<usize> = pkg.send_procs.iter().copied().collect();
        let recvs: BTreeSet<usize> = pkg.recv_procs.iter().copied().collect();
        if let Some(&peer) = sends.symmetric_difference(&recvs).next() {
            return Err(AmgDdError::AsymmetricCommPattern { level, peer });
        }
        let broken = |reason: &str| AmgDdError::SelfCheckFailed {
            level,
            reason: reason.to_string(),
        };
        if pkg.send_map_starts.len() != pkg.send_procs.len() + 1
            || pkg.send_map_starts.first() != Some(&0)
            || pkg.send_map_starts.last() != Some(&pkg.send_map_elmts.len())
            || pkg.send_map_starts.windows(2).any(|w| w[0] > w[1])
        {
            return Err(broken("send_map_starts is not a prefix sum of the send map"));
        }
        if pkg.ghost_marker.len() != pkg.send_map_elmts.len() {
            return Err(broken("ghost markers do not match the send map"));
        }
        Ok(())
    }
}

/// Per-peer map over every level from the owning level down.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerMap<T> {
    pub peer: usize,
    /// Words in one solve-phase message: one count per level plus one entry per node.
    pub buffer_size: usize,
    /// Indexed by absolute level; levels finer than the owner are empty.
    pub levels: Vec<Vec<T>>,
}

impl<T> PeerMap<T> {
    pub fn num_entries(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }
}

/// Communication plans and negotiated maps for every level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompGridCommPkg<T = usize> {
    pub num_levels: usize,
    pub levels: Vec<LevelCommPackage>,
    /// `send_flag[level][i]` lists what the `i`-th send proc of `level` keeps.
    pub send_flag: Vec<Vec<PeerMap<T>>>,
    /// `recv_map[level][i]` lists where data from the `i`-th recv proc lands.
    pub recv_map: Vec<Vec<PeerMap<T>>>,
}

impl<T> CompGridCommPkg<T> {
    pub fn new(levels: Vec<LevelCommPackage>) -> Self {
        let num_levels = levels.len();
        Self {
            num_levels,
            levels,
            send_flag: (0..num_levels).map(|_| Vec::new()).collect(),
            recv_map: (0..num_levels).map(|_| Vec::new()).collect(),
        }
    }

    pub fn send_procs(&self, level: usize) -> &[usize] {
        &self.levels[level].send_procs
    }

    pub fn recv_procs(&self, level: usize) -> &[usize] {
        &self.levels[level].recv_procs
    }

    pub fn send_buffer_sizes(&self, level: usize) -> impl Iterator<Item = usize> + '_ {
        self.send_flag[level].iter().map(|m| m.buffer_size)
    }

    pub fn recv_buffer_sizes(&self, level: usize) -> impl Iterator<Item = usize> + '_ {
        self.recv_map[level].iter().map(|m| m.buffer_size)
    }
}

impl CompGridCommPkg<NodeId> {
    /// Translate every handle into its current grid position.
    pub fn to_positions(&self, grids: &[CompositeGrid]) -> CompGridCommPkg<usize> {
        let convert = |maps: &[Vec<PeerMap<NodeId>>]| -> Vec<Vec<PeerMap<usize>>> {
            maps.iter()
                .map(|peers| {
                    peers
                        .iter()
                        .map(|m| PeerMap {
                            peer: m.peer,
                            buffer_size: m.buffer_size,
                            levels: m
                                .levels
                                .iter()
                                .enumerate()
                                .map(|(l, ids)| {
                                    ids.iter().map(|&id| grids[l].position_of(id)).collect()
                                })
                                .collect(),
                        })
                        .collect()
                })
                .collect()
        };
        CompGridCommPkg {
            num_levels: self.num_levels,
            levels: self.levels.clone(),
            send_flag: convert(&self.send_flag),
            recv_map: convert(&self.recv_map),
        }
    }
}

impl<T> DebugInvariants for CompGridCommPkg<T> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "CompGridCommPkg invalid");
    }

    fn validate_invariants(&self) -> Result<(), AmgDdError> {
        for (level, pkg) in self.levels.iter().enumerate() {
            LevelCommPackageCheck { level, pkg }.validate_invariants()?;
            let maps_ok = |maps: &[PeerMap<T>], procs: &[usize]| {
                maps.is_empty()
                    || (maps.len() == procs.len()
                        && maps.iter().zip(procs).all(|(m, &p)| {
                            m.peer == p
                                && m.levels.len() == self.num_levels
                                && m.buffer_size == (self.num_levels - level) + m.num_entries()
                        }))
            };
            if !maps_ok(&self.send_flag[level], &pkg.send_procs)
                || !maps_ok(&self.recv_map[level], &pkg.recv_procs)
            {
                return Err(AmgDdError::SelfCheckFailed {
                    level,
                    reason: "negotiated maps do not match the communication package".into(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_dest_builds_prefix_sums() {
        let mut pkg = LevelCommPackage::empty();
        pkg.push_dest(3, [(0, false), (2, true)]);
        pkg.push_dest(5, [(1, false)]);
        pkg.recv_procs = pkg.send_procs.clone();
        assert_eq!(pkg.send_map_starts, vec![0, 2, 3]);
        assert_eq!(pkg.send_slice(0), (&[0usize, 2][..], &[false, true][..]));
        LevelCommPackageCheck { level: 0, pkg: &pkg }
            .validate_invariants()
            .unwrap();
    }

    #[test]
    fn asymmetric_package_is_reported() {
        let mut pkg = LevelCommPackage::empty();
        pkg.push_dest(3, [(0, false)]);
        pkg.recv_procs = vec![4];
        let err = LevelCommPackageCheck { level: 2, pkg: &pkg }
            .validate_invariants()
            .unwrap_err();
        assert!(matches!(err, AmgDdError::AsymmetricCommPattern { level: 2, peer: 3 }));
    }

    #[test]
    fn buffer_size_counts_levels_and_entries() {
        let mut pkg = LevelCommPackage::empty();
        pkg.push_dest(1, [(0, false)]);
        pkg.recv_procs = vec![1];
        let mut all: CompGridCommPkg<usize> =
            CompGridCommPkg::new(vec![pkg, LevelCommPackage::empty()]);
        all.send_flag[0].push(PeerMap {
            peer: 1,
            buffer_size: 2 + 3,
            levels: vec![vec![0, 1], vec![4]],
        });
        all.validate_invariants().unwrap();
        all.send_flag[0][0].buffer_size = 4;
        assert!(all.validate_invariants().is_err());
    }
}
