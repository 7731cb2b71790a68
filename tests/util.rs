#![allow(dead_code)]
use amgdd::hierarchy::distribute::distribute;
use amgdd::hierarchy::serial::{CsrMatrix, SerialHierarchy};
use amgdd::prelude::*;
use std::collections::{BTreeMap, VecDeque};

/// Run `f` once per rank of a threaded `LocalComm` group; results by rank.
pub fn run_ranks<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(LocalComm) -> T + Sync,
{
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = LocalComm::group(n)
            .into_iter()
            .map(|c| s.spawn(move || f(c)))
            .collect();
        handles.into_iter().map(|h| h.join().expect("rank panicked")).collect()
    })
}

/// Distribute `serial` by `starts` and run composite-grid setup on every rank.
pub fn setup_all(
    serial: &SerialHierarchy,
    starts: &[usize],
    params: &CompGridParams,
) -> Vec<CompositeHierarchy> {
    run_ranks(starts.len() - 1, |c| {
        let mine = distribute(serial, starts, c.rank()).expect("distribute");
        setup_composite_grids(&mine, params, &c).expect("setup")
    })
}

/// Graph distance from the row block `owned` to every row within `radius` hops.
pub fn bfs_ball(
    a: &CsrMatrix,
    owned: std::ops::Range<usize>,
    radius: usize,
) -> BTreeMap<usize, usize> {
    let mut dist = BTreeMap::new();
    let mut queue = VecDeque::new();
    for i in owned {
        dist.insert(i, 0);
        queue.push_back(i);
    }
    while let Some(i) = queue.pop_front() {
        let d = dist[&i];
        if d == radius {
            continue;
        }
        for &j in a.row(i).0 {
            if !dist.contains_key(&j) {
                dist.insert(j, d + 1);
                queue.push_back(j);
            }
        }
    }
    dist
}

/// Level-0 composite grid of `rank` must be exactly the BFS ball of radius
/// `padding + num_ghost_layers`, ghost iff farther than `padding`.
pub fn assert_finest_level_is_ball(
    out: &CompositeHierarchy,
    a: &CsrMatrix,
    starts: &[usize],
    rank: usize,
    params: &CompGridParams,
) {
    let grid = &out.grids[0];
    let owned = starts[rank]..starts[rank + 1];
    let ball = bfs_ball(a, owned.clone(), params.reach());
    let want: Vec<usize> = ball.keys().copied().filter(|g| !owned.contains(g)).collect();
    let nonowned = &grid.global_indices()[grid.num_owned()..];
    assert_eq!(nonowned, &want[..], "rank {rank} non-owned set");
    let has_coarse = out.num_levels() > 1;
    for pos in grid.num_owned()..grid.num_nodes() {
        let g = grid.global_index(pos);
        let ghost = has_coarse && ball[&g] > params.padding;
        assert_eq!(grid.node(pos).ghost, ghost, "rank {rank} ghost marker of {g}");
    }
}

/// Every node on every rank carries exactly the serial hierarchy's data.
pub fn assert_data_matches(outs: &[CompositeHierarchy], serial: &SerialHierarchy) {
    for (rank, out) in outs.iter().enumerate() {
        for (level, grid) in out.grids.iter().enumerate() {
            let l = &serial.levels[level];
            for node in grid.nodes() {
                let g = node.global_index;
                assert_eq!(
                    node.residual.to_bits(),
                    l.residual[g].to_bits(),
                    "rank {rank} level {level} residual {g}"
                );
                let (cols, vals) = l.a.row(g);
                assert_eq!(node.a_row.global_cols, cols);
                assert_eq!(node.a_row.values, vals);
                match (&node.p_row, &l.p) {
                    (Some(p), Some(want)) => {
                        let (cols, vals) = want.row(g);
                        assert_eq!(p.global_cols, cols);
                        assert_eq!(p.values, vals);
                    }
                    (None, None) => {}
                    _ => panic!("rank {rank} level {level}: P row presence of {g}"),
                }
            }
        }
    }
}

/// Send/receive sets and negotiated map sizes agree between every pair of ranks.
pub fn assert_maps_reciprocal(outs: &[CompositeHierarchy]) {
    for (q, out) in outs.iter().enumerate() {
        let pkg = &out.comm_pkg;
        for level in 0..pkg.num_levels {
            for (i, &r) in pkg.send_procs(level).iter().enumerate() {
                let other = &outs[r].comm_pkg;
                assert!(
                    other.send_procs(level).contains(&q),
                    "level {level}: {q} -> {r} not reciprocated"
                );
                let Some(j) = other.recv_procs(level).iter().position(|&p| p == q) else {
                    panic!("level {level}: {r} does not receive from {q}");
                };
                let sent_map = pkg.send_flag[level].get(i);
                let kept_map = other.recv_map[level].get(j);
                if let (Some(s), Some(rm)) = (sent_map, kept_map) {
                    let what = format!("level {level}: {q} -> {r} buffer size");
                    assert_eq!(s.buffer_size, rm.buffer_size, "{what}");
                    for l in level..pkg.num_levels {
                        assert_eq!(s.levels[l].len(), rm.levels[l].len());
                        let sent: Vec<usize> =
                            s.levels[l].iter().map(|&p| out.grids[l].global_index(p)).collect();
                        let kept: Vec<usize> = rm.levels[l]
                            .iter()
                            .map(|&p| outs[r].grids[l].global_index(p))
                            .collect();
                        assert_eq!(sent, kept, "level {l}: {q} -> {r} map contents");
                    }
                }
            }
        }
    }
}
