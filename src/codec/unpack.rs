//! Decoding received buffers and merging them into the composite grids.

use crate::algs::wire::{WireReader, WireWord};
use crate::amgdd_error::AmgDdError;
use crate::composite::{CompositeGrid, CompositeMatrixRow, IncomingNode, NodeId};

/// Decode a buffer packed for `level`.
///
/// Returns one node list per Psi level, starting at `level`.
pub fn decode_recv_buffer(
    words: &[WireWord],
    level: usize,
    num_levels: usize,
) -> Result<Vec<Vec<IncomingNode>>, AmgDdError> {
    let mut r = WireReader::new(words);
    let num_psi_levels = r.count()?;
    if num_psi_levels == 0 || level + num_psi_levels > num_levels {
        return Err(AmgDdError::MalformedBuffer(format!(
            "{num_psi_levels} Psi levels starting at level {level} of {num_levels}"
        )));
    }
    let mut out = Vec::with_capacity(num_psi_levels);
    for l in level..level + num_psi_levels {
        let has_coarse = l + 1 < num_levels;
        let n = r.count()?;
        let globals = (0..n).map(|_| r.index()).collect::<Result<Vec<_>, _>>()?;
        let residuals = (0..n).map(|_| r.value()).collect::<Result<Vec<_>, _>>()?;
        let (ghosts, coarse) = if has_coarse {
            (
                (0..n).map(|_| r.flag()).collect::<Result<Vec<_>, _>>()?,
                (0..n).map(|_| r.opt_index()).collect::<Result<Vec<_>, _>>()?,
            )
        } else {
            (vec![false; n], vec![None; n])
        };
        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let a_row = decode_row(&mut r)?;
            let p_row = if has_coarse { Some(decode_row(&mut r)?) } else { None };
            nodes.push(IncomingNode {
                global_index: globals[i],
                residual: residuals[i],
                ghost: ghosts[i],
                coarse_global_index: coarse[i],
                a_row,
                p_row,
            });
        }
        out.push(nodes);
    }
    r.finish()?;
    Ok(out)
}

pub(crate) fn decode_row(r: &mut WireReader<'_>) -> Result<CompositeMatrixRow, AmgDdError> {
    let len = r.count()?;
    let values = (0..len).map(|_| r.value()).collect::<Result<Vec<_>, _>>()?;
    let cols = (0..len).map(|_| r.index()).collect::<Result<Vec<_>, _>>()?;
    Ok(CompositeMatrixRow::new(values, cols))
}

/// Decode a buffer from `source` and merge every Psi level into `grids`.
///
/// Returns, indexed by absolute level, the handle each incoming node became
/// (`None` where it was discarded). Levels the buffer did not reach are empty.
pub fn unpack_recv_buffer(
    words: &[WireWord],
    grids: &mut [CompositeGrid],
    level: usize,
    source: usize,
) -> Result<Vec<Vec<Option<NodeId>>>, AmgDdError> {
    let num_levels = grids.len();
    let decoded = decode_recv_buffer(words, level, num_levels)?;
    let mut recv_map_send = vec![Vec::new(); num_levels];
    for (offset, nodes) in decoded.into_iter().enumerate() {
        let l = level + offset;
        recv_map_send[l] = grids[l].merge_incoming(nodes, source)?;
    }
    Ok(recv_map_send)
}
