mod util;
use util::*;

use amgdd::hierarchy::serial::{build_hierarchy, laplacian_2d_blocked};
use amgdd::prelude::*;
use serial_test::serial;

fn residual(n: usize) -> Vec<f64> {
    (0..n).map(|i| 1.0 + (i as f64) * 0.125).collect()
}

#[test]
#[serial]
fn four_ranks_on_an_8x8_grid() {
    let (a, starts) = laplacian_2d_blocked(8, 8, 2, 2);
    let serial = build_hierarchy(a.clone(), residual(64), 4, 2);
    assert!(serial.levels.len() >= 3);
    let params = CompGridParams::new(2, 1).with_self_check(true);

    let outs = setup_all(&serial, &starts, &params);

    for (rank, out) in outs.iter().enumerate() {
        assert_eq!(out.num_levels(), serial.levels.len());
        assert_finest_level_is_ball(out, &a, &starts, rank, &params);
        for g in &out.grids {
            g.validate_invariants().unwrap();
        }
        // every rank of a 2x2 block layout touches every other within 3 hops
        let mut peers = out.comm_pkg.send_procs(0).to_vec();
        peers.sort_unstable();
        let want: Vec<usize> = (0..4).filter(|&r| r != rank).collect();
        assert_eq!(peers, want);
    }
    assert_data_matches(&outs, &serial);
    assert_maps_reciprocal(&outs);
}

#[test]
#[serial]
fn barrier_mode_gives_the_same_grids() {
    let (a, starts) = laplacian_2d_blocked(8, 8, 2, 2);
    let serial = build_hierarchy(a, residual(64), 3, 2);
    let plain = setup_all(&serial, &starts, &CompGridParams::new(1, 1));
    let synced = setup_all(&serial, &starts, &CompGridParams::new(1, 1).with_barriers(true));
    for (p, s) in plain.iter().zip(&synced) {
        assert_eq!(p.sizes(), s.sizes());
        for (gp, gs) in p.grids.iter().zip(&s.grids) {
            assert_eq!(gp.global_indices(), gs.global_indices());
            assert_eq!(gp.a_csr(), gs.a_csr());
        }
        assert_eq!(p.comm_pkg, s.comm_pkg);
    }
}

#[test]
#[serial]
fn csr_view_is_fully_resolved_inside_the_real_region() {
    let (a, starts) = laplacian_2d_blocked(8, 8, 2, 2);
    let serial = build_hierarchy(a, residual(64), 2, 2);
    let outs = setup_all(&serial, &starts, &CompGridParams::new(2, 1));
    for out in &outs {
        let grid = &out.grids[0];
        let csr = grid.a_csr();
        assert_eq!(csr.row_ptr.len(), grid.num_nodes() + 1);
        for pos in 0..grid.num_nodes() {
            if grid.node(pos).ghost {
                continue;
            }
            let row = csr.row_ptr[pos]..csr.row_ptr[pos + 1];
            for k in row {
                let local = csr.col_ind[k].expect("real rows see their whole stencil");
                assert_eq!(grid.global_index(local), csr.global_col[k]);
            }
        }
    }
}

#[test]
#[serial]
fn timings_are_recorded() {
    let (a, starts) = laplacian_2d_blocked(4, 4, 2, 2);
    let serial = build_hierarchy(a, residual(16), 2, 1);
    let outs = setup_all(&serial, &starts, &CompGridParams::default());
    for out in outs {
        let t = &out.timings;
        let phases = t.discovery
            + t.pack
            + t.size_exchange
            + t.data_exchange
            + t.unpack
            + t.resolve
            + t.map_negotiation;
        assert_eq!(t.total(), phases);
        assert!(t.total() >= t.discovery);
        // every rank of the 2x2 split sends on the finest level
        assert!(!out.comm_pkg.send_procs(0).is_empty());
        assert!(t.pack > std::time::Duration::ZERO);
        assert!(t.unpack > std::time::Duration::ZERO);
    }
}
