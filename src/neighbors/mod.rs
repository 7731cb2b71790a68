//! Neighbor discovery: find every rank that needs a piece of this rank's
//! owned rows within `padding + num_ghost_layers` hops.
//!
//! Discovery starts from the one-hop pattern of `A`. For every destination
//! rank a [`Tracker`] records how far each owned row reaches toward it. Each
//! round expands the trackers that changed, turns columns owned elsewhere
//! into requests, and sends all requests to every one-hop neighbor; a
//! neighbor that owns a requested row raises its own tracker for the
//! requesting destination, registering that destination if it is new.
//! After `padding + num_ghost_layers - 1` rounds every row reachable within
//! the halo radius has been claimed by its owner.

pub mod traversal;

use crate::algs::communicator::Communicator;
use crate::algs::exchange::exchange_variable;
use crate::algs::wire::{WireReader, WireWord, WireWriter};
use crate::amgdd_error::AmgDdError;
use crate::composite::add_flag::flags;
use crate::composite::comm_pkg::LevelCommPackageCheck;
use crate::composite::{AddFlag, CompositeGrid, LevelCommPackage};
use crate::debug_invariants::DebugInvariants;
use crate::hierarchy::{AmgHierarchy, OneHopPattern};
use crate::params::CompGridParams;
use hashbrown::HashMap;
use log::{debug, trace};
use traversal::expand;

/// Per-destination discovery state.
#[derive(Debug)]
struct Tracker {
    proc: usize,
    flags: Vec<AddFlag>,
    starting: Vec<usize>,
    searching: bool,
    /// Global index → largest budget requested this round.
    requests: HashMap<usize, usize>,
}

impl Tracker {
    fn new(proc: usize, n: usize) -> Self {
        Self {
            proc,
            flags: flags(n),
            starting: Vec::new(),
            searching: true,
            requests: HashMap::new(),
        }
    }

    /// Expand every starting node by one less than its own flag.
    fn search(&mut self, grid: &CompositeGrid) {
        self.requests.clear();
        let requests = &mut self.requests;
        for s in self.starting.drain(..) {
            let budget = self.flags[s].weight().saturating_sub(1);
            expand(grid, &mut self.flags, s, budget, |g, m| {
                let e = requests.entry(g).or_insert(0);
                *e = (*e).max(m);
            });
        }
    }

    /// Raise the flag of owned row `row` to `m`; a raised row becomes a
    /// starting node for the next round.
    fn offer(&mut self, row: usize, m: usize) {
        if self.flags[row].raise(m) {
            self.starting.push(row);
            self.searching = true;
        }
    }
}

/// Discovery state of one level on one rank.
struct Discovery<'a> {
    grid: &'a CompositeGrid,
    trackers: Vec<Tracker>,
    by_proc: HashMap<usize, usize>,
}

impl<'a> Discovery<'a> {
    fn seed(grid: &'a CompositeGrid, pattern: &OneHopPattern, reach: usize) -> Self {
        let n = grid.num_nodes();
        let mut trackers = Vec::with_capacity(2 * pattern.num_sends());
        let mut by_proc = HashMap::with_capacity(2 * pattern.num_sends());
        for (i, &proc) in pattern.send_procs.iter().enumerate() {
            let mut t = Tracker::new(proc, n);
            for &row in pattern.send_elements(i) {
                t.flags[row] = AddFlag::Visited(reach);
                t.starting.push(row);
            }
            by_proc.insert(proc, trackers.len());
            trackers.push(t);
        }
        Self {
            grid,
            trackers,
            by_proc,
        }
    }

    /// `[num_procs, (proc, n, (global, budget) * n) *]` for every searching
    /// tracker that produced requests.
    fn request_buffer(&self) -> Vec<WireWord> {
        let mut w = WireWriter::new();
        w.push_count(0);
        let mut num = 0;
        for t in self.trackers.iter().filter(|t| t.searching && !t.requests.is_empty()) {
            num += 1;
            w.push_index(t.proc);
            w.push_count(t.requests.len());
            let mut reqs: Vec<(usize, usize)> = t.requests.iter().map(|(&g, &m)| (g, m)).collect();
            reqs.sort_unstable();
            for (g, m) in reqs {
                w.push_index(g);
                w.push_index(m);
            }
        }
        w.patch_count(0, num);
        w.finish()
    }

    fn apply_requests(&mut self, buf: &[WireWord], me: usize) -> Result<(), AmgDdError> {
        let grid = self.grid;
        let mut r = WireReader::new(buf);
        let num_procs = r.count()?;
        for _ in 0..num_procs {
            let proc = r.index()?;
            let n = r.count()?;
            let mut reqs = Vec::with_capacity(n);
            for _ in 0..n {
                reqs.push((r.index()?, r.index()?));
            }
            if proc == me {
                continue;
            }
            let t = match self.by_proc.get(&proc) {
                Some(&t) => t,
                None => {
                    if !reqs.iter().any(|&(g, _)| grid.is_owned_global(g)) {
                        continue;
                    }
                    trace!("level {}: rank {me} registers new destination {proc}", grid.level());
                    let t = self.trackers.len();
                    self.trackers.push(Tracker::new(proc, grid.num_nodes()));
                    self.by_proc.insert(proc, t);
                    t
                }
            };
            for (g, m) in reqs {
                if grid.is_owned_global(g) {
                    self.trackers[t].offer(g - grid.first_owned(), m);
                }
            }
        }
        r.finish()
    }

    fn into_package(self, num_ghost_layers: usize) -> LevelCommPackage {
        let num_owned = self.grid.num_owned();
        let mut pkg = LevelCommPackage::empty();
        for t in self.trackers {
            pkg.push_dest(
                t.proc,
                t.flags[..num_owned]
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| f.is_set())
                    .map(|(row, f)| (row, f.weight() <= num_ghost_layers)),
            );
        }
        pkg.recv_procs = pkg.send_procs.clone();
        pkg
    }
}

/// Build the communication package of one level.
///
/// `grid` must still hold only the owned rows, with A rows resolved.
pub fn discover_level<C>(
    grid: &CompositeGrid,
    pattern: &OneHopPattern,
    params: &CompGridParams,
    comm: &C,
) -> Result<LevelCommPackage, AmgDdError>
where
    C: Communicator,
{
    let level = grid.level();
    if pattern.num_sends() == 0 {
        debug!("level {level}: no one-hop neighbors, nothing to discover");
        return Ok(LevelCommPackage::empty());
    }

    let tags = params.tags();
    let neighbors = &pattern.send_procs;
    let mut disc = Discovery::seed(grid, pattern, params.reach());
    for round in 0..params.reach() - 1 {
        for t in disc.trackers.iter_mut().filter(|t| t.searching) {
            t.search(grid);
        }
        let buf = disc.request_buffer();
        let sends: Vec<(usize, Vec<WireWord>)> =
            neighbors.iter().map(|&p| (p, buf.clone())).collect();
        let received = exchange_variable(
            &sends,
            neighbors,
            comm,
            tags.discovery_sizes,
            tags.discovery_data,
        )?;
        for t in disc.trackers.iter_mut() {
            t.searching = false;
        }
        for recv in &received {
            disc.apply_requests(recv, comm.rank())?;
        }
        trace!(
            "level {level} round {round}: {} destinations, {} searching",
            disc.trackers.len(),
            disc.trackers.iter().filter(|t| t.searching).count()
        );
    }

    let pkg = disc.into_package(params.num_ghost_layers);
    debug!(
        "level {level}: rank {} sends to {:?} ({} rows)",
        comm.rank(),
        pkg.send_procs,
        pkg.send_map_elmts.len()
    );
    crate::debug_invariants!(
        LevelCommPackageCheck { level, pkg: &pkg }.validate_invariants(),
        "discover_level"
    );
    Ok(pkg)
}

/// Discover every level. `grids` must be freshly initialized and resolved.
pub fn discover_all<C>(
    grids: &[CompositeGrid],
    hierarchy: &AmgHierarchy,
    params: &CompGridParams,
    comm: &C,
) -> Result<Vec<LevelCommPackage>, AmgDdError>
where
    C: Communicator,
{
    grids
        .iter()
        .zip(&hierarchy.levels)
        .map(|(grid, l)| discover_level(grid, &l.comm_pattern, params, comm))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::composite::resolve_local_indices;
    use crate::hierarchy::{CfMarker, ParCsr, ParLevel};

    fn lone_level() -> ParLevel {
        ParLevel {
            first_row: 0,
            num_global_rows: 3,
            a: ParCsr::from_rows((0..3).map(|i| vec![(i, 1.0)])),
            p: None,
            residual: vec![0.0; 3],
            cf_marker: vec![CfMarker::Fine; 3],
            comm_pattern: OneHopPattern::default(),
        }
    }

    #[test]
    fn isolated_level_has_empty_package() {
        let mut grids = vec![CompositeGrid::initialize(0, &lone_level(), 0).unwrap()];
        resolve_local_indices(&mut grids);
        let params = CompGridParams::default();
        let pkg = discover_level(&grids[0], &OneHopPattern::default(), &params, &NoComm).unwrap();
        assert!(pkg.is_empty());
        assert_eq!(pkg.send_map_starts, vec![0]);
    }

    #[test]
    fn requests_for_self_and_unknown_foreign_rows_are_ignored() {
        let mut grids = vec![CompositeGrid::initialize(0, &lone_level(), 0).unwrap()];
        resolve_local_indices(&mut grids);
        let mut disc = Discovery::seed(&grids[0], &OneHopPattern::default(), 3);
        let mut w = WireWriter::new();
        w.push_count(2);
        w.push_index(0); // addressed to this rank
        w.push_count(1);
        w.push_index(1);
        w.push_index(2);
        w.push_index(7); // rank 7 wants rows this rank does not own
        w.push_count(1);
        w.push_index(10);
        w.push_index(2);
        disc.apply_requests(&w.finish(), 0).unwrap();
        assert!(disc.trackers.is_empty());
    }

    #[test]
    fn new_destination_is_registered_and_flag_takes_max() {
        let mut grids = vec![CompositeGrid::initialize(0, &lone_level(), 0).unwrap()];
        resolve_local_indices(&mut grids);
        let mut disc = Discovery::seed(&grids[0], &OneHopPattern::default(), 3);
        let msg = |m: usize| {
            let mut w = WireWriter::new();
            w.push_count(1);
            w.push_index(5);
            w.push_count(2);
            w.push_index(2);
            w.push_index(m);
            w.push_index(40);
            w.push_index(m);
            w.finish()
        };
        disc.apply_requests(&msg(2), 0).unwrap();
        disc.apply_requests(&msg(1), 0).unwrap();
        assert_eq!(disc.trackers.len(), 1);
        let t = &disc.trackers[0];
        assert_eq!(t.proc, 5);
        assert_eq!(t.flags[2], AddFlag::Visited(2));
        assert_eq!(t.starting, vec![2]);
        let pkg = disc.into_package(1);
        assert_eq!(pkg.send_procs, vec![5]);
        assert_eq!(pkg.send_slice(0), (&[2usize][..], &[false][..]));
    }
}
