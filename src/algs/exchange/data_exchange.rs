//! Stage 2: move word buffers whose lengths are already known.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::exchange::size_exchange::exchange_sizes;
use crate::algs::wire::{WireWord, cast_slice, words_from_bytes};
use crate::amgdd_error::AmgDdError;
use std::mem::size_of;

/// Send each `(peer, words)` and receive exactly `n` words from each `(peer, n)`.
///
/// Returns the received buffers in `recvs` order.
pub fn exchange_words<C>(
    sends: &[(usize, Vec<WireWord>)],
    recvs: &[(usize, usize)],
    comm: &C,
    tag: CommTag,
) -> Result<Vec<Vec<WireWord>>, AmgDdError>
where
    C: Communicator,
{
    let mut pending_recvs = Vec::with_capacity(recvs.len());
    for &(nbr, n) in recvs {
        let mut buf = vec![0u8; n * size_of::<WireWord>()];
        let h = comm.irecv(nbr, tag.as_u16(), &mut buf);
        pending_recvs.push((nbr, n, h));
    }

    let mut pending_sends = Vec::with_capacity(sends.len());
    for (nbr, words) in sends {
        pending_sends.push(comm.isend(*nbr, tag.as_u16(), cast_slice(words)));
    }

    let mut out = Vec::with_capacity(recvs.len());
    let mut maybe_err = None;
    for (nbr, n, h) in pending_recvs {
        let expected = n * size_of::<WireWord>();
        match h.wait() {
            Some(raw) if raw.len() == expected => {
                if maybe_err.is_none() {
                    match words_from_bytes(&raw) {
                        Ok(words) => out.push(words),
                        Err(e) => maybe_err = Some(e),
                    }
                }
            }
            Some(raw) if maybe_err.is_none() => {
                maybe_err = Some(AmgDdError::BufferSizeMismatch {
                    neighbor: nbr,
                    expected,
                    got: raw.len(),
                });
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(AmgDdError::comm(
                    nbr,
                    format!("failed to receive {n} words from rank {nbr}"),
                ));
            }
            _ => {}
        }
    }

    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(out),
    }
}

/// Size handshake followed by the data exchange.
///
/// `recv_from` lists the ranks that will send to us; each of them must also
/// list us among its `sends`.
pub fn exchange_variable<C>(
    sends: &[(usize, Vec<WireWord>)],
    recv_from: &[usize],
    comm: &C,
    size_tag: CommTag,
    data_tag: CommTag,
) -> Result<Vec<Vec<WireWord>>, AmgDdError>
where
    C: Communicator,
{
    let announced: Vec<(usize, usize)> = sends.iter().map(|(p, w)| (*p, w.len())).collect();
    let sizes = exchange_sizes(&announced, recv_from, comm, size_tag)?;
    let recvs: Vec<(usize, usize)> = recv_from.iter().copied().zip(sizes).collect();
    exchange_words(sends, &recvs, comm, data_tag)
}

/// Every rank contributes `words`; returns all contributions indexed by rank.
pub fn all_gather_words<C>(
    words: Vec<WireWord>,
    comm: &C,
    size_tag: CommTag,
    data_tag: CommTag,
) -> Result<Vec<Vec<WireWord>>, AmgDdError>
where
    C: Communicator,
{
    let me = comm.rank();
    let others: Vec<usize> = (0..comm.size()).filter(|&r| r != me).collect();
    let sends: Vec<(usize, Vec<WireWord>)> =
        others.iter().map(|&r| (r, words.clone())).collect();
    let received = exchange_variable(&sends, &others, comm, size_tag, data_tag)?;

    let mut out = vec![Vec::new(); comm.size()];
    for (r, buf) in others.into_iter().zip(received) {
        out[r] = buf;
    }
    out[me] = words;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{LocalComm, NoComm};

    fn words(v: &[u64]) -> Vec<WireWord> {
        v.iter().copied().map(WireWord::of).collect()
    }

    #[test]
    fn serial_gather_returns_own_contribution() {
        let got =
            all_gather_words(words(&[1, 2]), &NoComm, CommTag::new(0), CommTag::new(1)).unwrap();
        assert_eq!(got, vec![words(&[1, 2])]);
    }

    #[test]
    fn three_rank_ring_variable_lengths() {
        let comms = LocalComm::group(3);
        let handles: Vec<_> = comms
            .into_iter()
            .map(|c| {
                std::thread::spawn(move || {
                    let n = c.size();
                    let me = c.rank();
                    let next = (me + 1) % n;
                    let prev = (me + n - 1) % n;
                    let payload = words(&vec![me as u64; me + 1]);
                    let (size_tag, data_tag) = (CommTag::new(10), CommTag::new(11));
                    exchange_variable(&[(next, payload)], &[prev], &c, size_tag, data_tag).unwrap()
                })
            })
            .collect();
        let got: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(got[0], vec![words(&[2, 2, 2])]);
        assert_eq!(got[1], vec![words(&[0])]);
        assert_eq!(got[2], vec![words(&[1, 1])]);
    }

    #[test]
    fn gather_orders_by_rank() {
        let comms = LocalComm::group(3);
        let handles: Vec<_> = comms
            .into_iter()
            .map(|c| {
                std::thread::spawn(move || {
                    let mine = words(&[c.rank() as u64 * 7]);
                    all_gather_words(mine, &c, CommTag::new(20), CommTag::new(21)).unwrap()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), vec![words(&[0]), words(&[7]), words(&[14])]);
        }
    }

    #[test]
    fn short_message_is_a_size_mismatch() {
        let comms = LocalComm::group(2);
        comms[1].isend(0, 3, cast_slice(&words(&[9])));
        let err = exchange_words(&[], &[(1, 2)], &comms[0], CommTag::new(3)).unwrap_err();
        assert!(matches!(
            err,
            AmgDdError::BufferSizeMismatch {
                neighbor: 1,
                expected: 16,
                got: 8
            }
        ));
    }
}
