//! Map negotiation buffers.
//!
//! After merging, each receiver tells every source which incoming nodes it
//! kept. The source drops the rest from its send map, so later solve-phase
//! messages carry only rows the receiver stores.

use crate::algs::wire::{WireReader, WireWord, WireWriter};
use crate::amgdd_error::AmgDdError;
use crate::composite::{NodeId, PeerMap};

/// Words in a negotiation buffer covering levels `level..`: one count per
/// level plus one flag per node.
pub fn negotiation_len(level: usize, num_levels: usize, num_nodes: usize) -> usize {
    (num_levels - level) + num_nodes
}

/// Per level from `level` down: the number of incoming nodes, then one
/// kept/discarded flag per node. Levels not reached are sent as zero counts.
pub fn pack_recv_map_send(recv_map_send: &[Vec<Option<NodeId>>], level: usize) -> Vec<WireWord> {
    let mut w = WireWriter::new();
    for incoming in &recv_map_send[level..] {
        w.push_count(incoming.len());
        for dest in incoming {
            w.push_flag(dest.is_some());
        }
    }
    w.finish()
}

/// Restrict `send_flag` to the nodes `peer` kept.
pub fn unpack_send_flag_buffer(
    words: &[WireWord],
    send_flag: Vec<Vec<NodeId>>,
    level: usize,
    peer: usize,
) -> Result<PeerMap<NodeId>, AmgDdError> {
    let num_levels = send_flag.len();
    let mut r = WireReader::new(words);
    let mut levels = vec![Vec::new(); num_levels];
    for (l, sent) in send_flag.into_iter().enumerate().skip(level) {
        let n = r.count()?;
        if n != sent.len() {
            return Err(AmgDdError::MalformedBuffer(format!(
                "rank {peer} acknowledged {n} nodes on level {l}, {} were sent",
                sent.len()
            )));
        }
        for id in sent {
            if r.flag()? {
                levels[l].push(id);
            }
        }
    }
    r.finish()?;
    let kept = levels.iter().map(Vec::len).sum();
    Ok(PeerMap {
        peer,
        buffer_size: negotiation_len(level, num_levels, kept),
        levels,
    })
}

/// The receive map of one source: the handles its nodes were stored under.
pub fn recv_map_from(
    recv_map_send: &[Vec<Option<NodeId>>],
    level: usize,
    peer: usize,
) -> PeerMap<NodeId> {
    let levels: Vec<Vec<NodeId>> = recv_map_send
        .iter()
        .map(|l| l.iter().flatten().copied().collect())
        .collect();
    let retained = levels.iter().map(Vec::len).sum();
    PeerMap {
        peer,
        buffer_size: negotiation_len(level, recv_map_send.len(), retained),
        levels,
    }
}
