//! CompositeGridAssembler: builds every composite grid of one rank.
//!
//! Levels are processed coarsest first, so that by the time a level packs its
//! Psi composites the coarser grids already hold everything received from
//! the neighbors. Each active level runs six phases:
//!
//! 1. pack one buffer per destination,
//! 2. exchange buffer sizes,
//! 3. exchange buffers,
//! 4. decode and merge (in receive order),
//! 5. re-resolve local indices on every level,
//! 6. negotiate which received nodes were kept.
//!
//! With [`CompGridParams::use_barriers`] every phase ends in a barrier; an
//! inactive level issues the same six barriers back to back so that all
//! ranks stay in step.

use crate::algs::communicator::Communicator;
use crate::algs::exchange::{exchange_sizes, exchange_words};
use crate::algs::wire::WireWord;
use crate::amgdd_error::AmgDdError;
use crate::codec::{
    negotiation_len, pack_all, pack_recv_map_send, recv_map_from, unpack_recv_buffer,
    unpack_send_flag_buffer,
};
use crate::composite::{
    CompGridCommPkg, CompositeGrid, LevelCommPackage, NodeId, PeerMap, resolve_local_indices,
};
use crate::debug_invariants::DebugInvariants;
use crate::hierarchy::AmgHierarchy;
use crate::neighbors::discover_all;
use crate::params::CompGridParams;
use crate::verify;
use log::debug;
use std::time::{Duration, Instant};

const PHASE_BARRIERS: usize = 6;

/// Wall-clock time spent in each setup phase, summed over levels.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SetupTimings {
    pub discovery: Duration,
    pub pack: Duration,
    pub size_exchange: Duration,
    pub data_exchange: Duration,
    pub unpack: Duration,
    pub resolve: Duration,
    pub map_negotiation: Duration,
}

impl SetupTimings {
    pub fn total(&self) -> Duration {
        self.discovery
            + self.pack
            + self.size_exchange
            + self.data_exchange
            + self.unpack
            + self.resolve
            + self.map_negotiation
    }
}

/// Result of composite-grid setup on one rank.
#[derive(Clone, Debug)]
pub struct CompositeHierarchy {
    /// One composite grid per level, finest first.
    pub grids: Vec<CompositeGrid>,
    /// Communication plans and negotiated maps, as local positions.
    pub comm_pkg: CompGridCommPkg<usize>,
    pub timings: SetupTimings,
}

impl CompositeHierarchy {
    pub fn num_levels(&self) -> usize {
        self.grids.len()
    }

    /// Node count per level.
    pub fn sizes(&self) -> Vec<usize> {
        self.grids.iter().map(CompositeGrid::num_nodes).collect()
    }
}

fn sync<C: Communicator>(params: &CompGridParams, comm: &C) {
    if params.use_barriers {
        comm.barrier();
    }
}

fn timed<T>(slot: &mut Duration, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    *slot += start.elapsed();
    out
}

/// Build the composite grids of this rank for every level of `hierarchy`.
///
/// Collective: every rank of `comm` must call this with its own share of the
/// same hierarchy and identical `params`.
pub fn setup_composite_grids<C>(
    hierarchy: &AmgHierarchy,
    params: &CompGridParams,
    comm: &C,
) -> Result<CompositeHierarchy, AmgDdError>
where
    C: Communicator,
{
    params.validate()?;
    hierarchy.validate()?;
    let num_levels = hierarchy.num_levels();
    let mut timings = SetupTimings::default();

    let mut grids = (0..num_levels)
        .map(|l| {
            CompositeGrid::initialize(l, &hierarchy.levels[l], hierarchy.coarse_first_index(l))
        })
        .collect::<Result<Vec<_>, _>>()?;
    timed(&mut timings.resolve, || resolve_local_indices(&mut grids));

    let packages = timed(&mut timings.discovery, || {
        discover_all(&grids, hierarchy, params, comm)
    })?;
    sync(params, comm);

    let mut pkg = CompGridCommPkg::<NodeId>::new(packages);
    for level in (0..num_levels).rev() {
        let active = grids[level].num_owned() > 0 && !pkg.levels[level].is_empty();
        if !active {
            debug!("level {level}: rank {} has nothing to send", comm.rank());
            for _ in 0..PHASE_BARRIERS {
                sync(params, comm);
            }
            continue;
        }
        let (send_flag, recv_map) =
            setup_level(&mut grids, &pkg.levels[level], level, params, comm, &mut timings)?;
        pkg.send_flag[level] = send_flag;
        pkg.recv_map[level] = recv_map;
    }

    timed(&mut timings.resolve, || resolve_local_indices(&mut grids));
    let comm_pkg = pkg.to_positions(&grids);
    for g in &grids {
        crate::debug_invariants!(g.validate_invariants(), "setup_composite_grids");
    }
    crate::debug_invariants!(comm_pkg.validate_invariants(), "setup_composite_grids");

    if params.self_check {
        verify::self_check(&grids, &comm_pkg, hierarchy, params, comm)?;
    }

    debug!(
        "rank {}: composite grid sizes {:?}, setup took {:?} ({:?})",
        comm.rank(),
        grids.iter().map(CompositeGrid::num_nodes).collect::<Vec<_>>(),
        timings.total(),
        timings
    );
    Ok(CompositeHierarchy {
        grids,
        comm_pkg,
        timings,
    })
}

type LevelMaps = (Vec<PeerMap<NodeId>>, Vec<PeerMap<NodeId>>);

/// Run the six phases of one active level. Returns the negotiated send and
/// receive maps, in `send_procs` and `recv_procs` order.
fn setup_level<C>(
    grids: &mut [CompositeGrid],
    level_pkg: &LevelCommPackage,
    level: usize,
    params: &CompGridParams,
    comm: &C,
    timings: &mut SetupTimings,
) -> Result<LevelMaps, AmgDdError>
where
    C: Communicator,
{
    let tags = params.tags();
    let num_levels = grids.len();
    let recv_procs = &level_pkg.recv_procs;

    let packed = timed(&mut timings.pack, || pack_all(grids, level_pkg, level, params));
    let (sends, send_flags): (Vec<(usize, Vec<WireWord>)>, Vec<(usize, Vec<Vec<NodeId>>)>) = packed
        .into_iter()
        .map(|p| ((p.peer, p.words), (p.peer, p.send_flag)))
        .unzip();
    sync(params, comm);

    let announced: Vec<(usize, usize)> = sends.iter().map(|(p, w)| (*p, w.len())).collect();
    let sizes = timed(&mut timings.size_exchange, || {
        exchange_sizes(&announced, recv_procs, comm, tags.sizes)
    })?;
    sync(params, comm);

    let recvs: Vec<(usize, usize)> = recv_procs.iter().copied().zip(sizes).collect();
    let received = timed(&mut timings.data_exchange, || {
        exchange_words(&sends, &recvs, comm, tags.data)
    })?;
    sync(params, comm);

    let recv_map_sends = timed(&mut timings.unpack, || {
        recv_procs
            .iter()
            .zip(&received)
            .map(|(&source, words)| unpack_recv_buffer(words, grids, level, source))
            .collect::<Result<Vec<_>, _>>()
    })?;
    sync(params, comm);

    timed(&mut timings.resolve, || resolve_local_indices(grids));
    sync(params, comm);

    let (send_maps, recv_maps) = timed(&mut timings.map_negotiation, || {
        let acks: Vec<(usize, Vec<WireWord>)> = recv_procs
            .iter()
            .zip(&recv_map_sends)
            .map(|(&src, m)| (src, pack_recv_map_send(m, level)))
            .collect();
        let expected: Vec<(usize, usize)> = send_flags
            .iter()
            .map(|(peer, flag)| {
                let kept = flag.iter().map(Vec::len).sum();
                (*peer, negotiation_len(level, num_levels, kept))
            })
            .collect();
        let replies = exchange_words(&acks, &expected, comm, tags.maps)?;
        let send_maps = send_flags
            .into_iter()
            .zip(&replies)
            .map(|((peer, flag), words)| unpack_send_flag_buffer(words, flag, level, peer))
            .collect::<Result<Vec<_>, _>>()?;
        let recv_maps: Vec<PeerMap<NodeId>> = recv_procs
            .iter()
            .zip(&recv_map_sends)
            .map(|(&src, m)| recv_map_from(m, level, src))
            .collect();
        Ok::<_, AmgDdError>((send_maps, recv_maps))
    })?;
    sync(params, comm);

    debug!(
        "level {level}: rank {} sent to {:?}, received from {:?}; grid sizes now {:?}",
        comm.rank(),
        level_pkg.send_procs,
        recv_procs,
        grids.iter().map(CompositeGrid::num_nodes).collect::<Vec<_>>()
    );
    Ok((send_maps, recv_maps))
}
