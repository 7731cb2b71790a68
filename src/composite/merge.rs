//! Merging a sorted list of incoming nodes into a composite grid.

use crate::amgdd_error::AmgDdError;
use crate::composite::grid::{CompositeGrid, CompositeNode, NodeId};
use crate::composite::row::CompositeMatrixRow;
use crate::debug_invariants::DebugInvariants;

/// A node decoded from a neighbor's buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct IncomingNode {
    pub global_index: usize,
    pub residual: f64,
    pub ghost: bool,
    pub coarse_global_index: Option<usize>,
    pub a_row: CompositeMatrixRow,
    pub p_row: Option<CompositeMatrixRow>,
}

impl From<IncomingNode> for CompositeNode {
    fn from(n: IncomingNode) -> Self {
        CompositeNode {
            global_index: n.global_index,
            residual: n.residual,
            a_row: n.a_row,
            p_row: n.p_row,
            ghost: n.ghost,
            coarse_global_index: n.coarse_global_index,
            coarse_local_index: None,
        }
    }
}

enum Slot {
    Existing(NodeId),
    Incoming(usize),
}

impl CompositeGrid {
    /// Merge `incoming` (strictly ascending by global index) into the
    /// non-owned block with a two-pointer sweep.
    ///
    /// Incoming nodes that fall in the owned range or duplicate a stored
    /// non-owned node are discarded; a discarded real copy promotes a stored
    /// ghost to real. Returns, per incoming node, the handle of the node it
    /// became, or `None` if it was discarded.
    ///
    /// Handles of nodes already in the grid are unaffected. Local indices
    /// are positions and must be re-resolved afterwards.
    pub fn merge_incoming(
        &mut self,
        incoming: Vec<IncomingNode>,
        source: usize,
    ) -> Result<Vec<Option<NodeId>>, AmgDdError> {
        if incoming
            .windows(2)
            .any(|w| w[0].global_index >= w[1].global_index)
        {
            return Err(AmgDdError::UnsortedIncoming {
                level: self.level,
                neighbor: source,
            });
        }

        if let Some(node) = incoming.iter().find(|n| n.p_row.is_some() != self.has_coarse) {
            return Err(AmgDdError::MalformedBuffer(format!(
                "level {}: P row presence of global {} does not match the level",
                self.level, node.global_index
            )));
        }

        let num_nodes = self.num_nodes();
        let mut merged = Vec::with_capacity(self.num_nonowned() + incoming.len());
        let mut promote = Vec::new();
        let mut added = 0usize;
        let mut local = self.num_owned;
        for (k, node) in incoming.iter().enumerate() {
            let g = node.global_index;
            if self.is_owned_global(g) {
                continue;
            }
            while local < num_nodes && self.globals[local] < g {
                merged.push(Slot::Existing(self.order[local]));
                local += 1;
            }
            if local < num_nodes && self.globals[local] == g {
                if !node.ghost {
                    promote.push(self.order[local]);
                }
                continue;
            }
            merged.push(Slot::Incoming(k));
            added += 1;
        }
        merged.extend(self.order[local..].iter().map(|&id| Slot::Existing(id)));

        self.reserve_nodes(added);

        for id in promote {
            self.nodes[id.index()].ghost = false;
        }

        let mut incoming: Vec<Option<IncomingNode>> = incoming.into_iter().map(Some).collect();
        let mut dest = vec![None; incoming.len()];
        let mut nonowned = Vec::with_capacity(merged.len());
        for slot in merged {
            match slot {
                Slot::Existing(id) => nonowned.push(id),
                Slot::Incoming(k) => {
                    if let Some(node) = incoming[k].take() {
                        let mut node = CompositeNode::from(node);
                        node.ghost &= self.has_coarse;
                        let id = self.push_node(node);
                        dest[k] = Some(id);
                        nonowned.push(id);
                    }
                }
            }
        }
        self.set_nonowned_order(nonowned);

        log::trace!(
            "level {}: merged {} of {} nodes from rank {source} ({} total)",
            self.level,
            added,
            dest.len(),
            self.num_nodes()
        );
        crate::debug_invariants!(self.validate_invariants(), "CompositeGrid::merge_incoming");
        Ok(dest)
    }
}
