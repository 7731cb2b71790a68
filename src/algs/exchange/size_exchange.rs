//! Stage 1: exchange word counts with each neighbor.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{WireCount, cast_slice, cast_slice_mut};
use crate::amgdd_error::AmgDdError;

/// Send one count to each `(peer, n)` in `sends` and receive one count from
/// each rank in `recv_from`.
///
/// Returns the received counts in `recv_from` order once every handle has
/// completed.
pub fn exchange_sizes<C>(
    sends: &[(usize, usize)],
    recv_from: &[usize],
    comm: &C,
    tag: CommTag,
) -> Result<Vec<usize>, AmgDdError>
where
    C: Communicator,
{
    // 1) post all receives
    let mut pending_recvs = Vec::with_capacity(recv_from.len());
    for &nbr in recv_from {
        let mut cnt = WireCount::new(0);
        let h = comm.irecv(
            nbr,
            tag.as_u16(),
            cast_slice_mut(std::slice::from_mut(&mut cnt)),
        );
        pending_recvs.push((nbr, h));
    }

    // 2) post all sends
    let mut pending_sends = Vec::with_capacity(sends.len());
    for &(nbr, n) in sends {
        let count = WireCount::new(n);
        pending_sends.push(comm.isend(
            nbr,
            tag.as_u16(),
            cast_slice(std::slice::from_ref(&count)),
        ));
    }

    // 3) wait for all recvs, keep the first error but do not early-return
    let mut sizes = Vec::with_capacity(recv_from.len());
    let mut maybe_err = None;
    for (nbr, h) in pending_recvs {
        match h.wait() {
            Some(data) if data.len() == std::mem::size_of::<WireCount>() => {
                let mut cnt = WireCount::new(0);
                cast_slice_mut(std::slice::from_mut(&mut cnt)).copy_from_slice(&data);
                sizes.push(cnt.get());
            }
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(AmgDdError::BufferSizeMismatch {
                    neighbor: nbr,
                    expected: std::mem::size_of::<WireCount>(),
                    got: data.len(),
                });
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(AmgDdError::comm(
                    nbr,
                    format!("failed to receive size from rank {nbr}"),
                ));
            }
            _ => {}
        }
    }

    // 4) always drain all send handles
    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(sizes),
    }
}
