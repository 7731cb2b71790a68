use amgdd::prelude::*;
use amgdd::composite::IncomingNode;
use proptest::prelude::*;
use std::collections::BTreeMap;

const OWNED: std::ops::Range<usize> = 20..30;

/// A rank owning rows 20..30 of a two-level hierarchy.
fn owned_grid() -> CompositeGrid {
    let rows = ParLevel {
        first_row: OWNED.start,
        num_global_rows: 60,
        a: ParCsr::from_rows(OWNED.map(|i| vec![(i, 2.0)])),
        p: Some(ParCsr::from_rows(OWNED.map(|i| vec![(i / 2, 1.0)]))),
        residual: vec![0.0; OWNED.len()],
        cf_marker: vec![CfMarker::Fine; OWNED.len()],
        comm_pattern: OneHopPattern::default(),
    };
    CompositeGrid::initialize(0, &rows, 0).unwrap()
}

fn incoming(batch: &BTreeMap<usize, bool>) -> Vec<IncomingNode> {
    batch
        .iter()
        .map(|(&g, &ghost)| IncomingNode {
            global_index: g,
            residual: g as f64,
            ghost,
            coarse_global_index: None,
            a_row: CompositeMatrixRow::new(vec![2.0], vec![g]),
            p_row: Some(CompositeMatrixRow::new(vec![1.0], vec![g / 2])),
        })
        .collect()
}

proptest! {
    #[test]
    fn merges_keep_the_grid_sorted_and_unique(
        batches in prop::collection::vec(
            prop::collection::btree_map(0usize..60, any::<bool>(), 0..15),
            1..6,
        )
    ) {
        let mut grid = owned_grid();
        let mut handles: Vec<(NodeId, usize)> = Vec::new();
        let mut real_seen: BTreeMap<usize, bool> = BTreeMap::new();

        for (source, batch) in batches.iter().enumerate() {
            let dest = grid.merge_incoming(incoming(batch), source).unwrap();
            prop_assert_eq!(dest.len(), batch.len());
            for ((&g, &ghost), d) in batch.iter().zip(&dest) {
                let stored_before = real_seen.contains_key(&g);
                if OWNED.contains(&g) || stored_before {
                    prop_assert!(d.is_none());
                } else {
                    let id = d.expect("new node must be stored");
                    handles.push((id, g));
                }
                if !OWNED.contains(&g) {
                    let real = real_seen.entry(g).or_insert(false);
                    *real |= !ghost;
                }
            }

            grid.validate_invariants().unwrap();
            let nonowned = &grid.global_indices()[grid.num_owned()..];
            prop_assert!(nonowned.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(nonowned.iter().all(|g| !OWNED.contains(g)));
            prop_assert_eq!(nonowned.to_vec(), real_seen.keys().copied().collect::<Vec<_>>());

            // a node is real as soon as any source sent it as real
            for pos in grid.num_owned()..grid.num_nodes() {
                let g = grid.global_index(pos);
                prop_assert_eq!(grid.node(pos).ghost, !real_seen[&g]);
            }
            // handles stay attached to their node across merges
            for &(id, g) in &handles {
                prop_assert_eq!(grid.global_index(grid.position_of(id)), g);
            }
        }
    }

    #[test]
    fn unsorted_input_is_rejected(a in 30usize..60, b in 30usize..60) {
        prop_assume!(a > b);
        let mut grid = owned_grid();
        let mut nodes = incoming(&[(a, false)].into_iter().collect());
        nodes.extend(incoming(&[(b, false)].into_iter().collect()));
        let is_unsorted = matches!(
            grid.merge_incoming(nodes, 3),
            Err(AmgDdError::UnsortedIncoming { level: 0, neighbor: 3 })
        );
        prop_assert!(is_unsorted);
        prop_assert_eq!(grid.num_nodes(), OWNED.len());
    }
}
