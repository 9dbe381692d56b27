//! In-process back end: one OS thread per rank, rendezvous channels
//! between every ordered pair of ranks.
//!
//! Every channel has capacity zero, so a send completes only when the
//! receiver takes the message, the same blocking behaviour as a
//! synchronous MPI send. Channels are per ordered pair, so messages from
//! one rank to another arrive in the order they were sent.
//!
//! When a rank's [`LocalComm`] is dropped (its closure returned or
//! panicked), every peer blocked on it wakes with
//! [`CommError::Disconnected`] instead of hanging.

use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded};
use halogrid_core::{CommError, Communicator, Payload, Rank, Slice, SliceMut, Tag};
use tracing::{debug, warn};

/// A message in flight.
#[derive(Debug)]
struct Envelope {
    tag: Tag,
    payload: Payload,
}

/// One rank's endpoint in an in-process group.
///
/// `senders[to]` and `receivers[from]` are `None` only at this rank's own
/// index.
#[derive(Debug)]
pub struct LocalComm {
    rank: Rank,
    senders: Vec<Option<Sender<Envelope>>>,
    receivers: Vec<Option<Receiver<Envelope>>>,
}

impl LocalComm {
    /// Build a fully connected group of `size` endpoints, indexed by rank.
    #[must_use]
    pub fn group(size: usize) -> Vec<Self> {
        let mut senders: Vec<Vec<Option<Sender<Envelope>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        let mut receivers: Vec<Vec<Option<Receiver<Envelope>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        for from in 0..size {
            for to in 0..size {
                if from != to {
                    let (tx, rx) = bounded(0);
                    senders[from][to] = Some(tx);
                    receivers[to][from] = Some(rx);
                }
            }
        }
        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (senders, receivers))| Self {
                rank,
                senders,
                receivers,
            })
            .collect()
    }

    fn sender(&self, to: Rank) -> Result<&Sender<Envelope>, CommError> {
        match self.senders.get(to) {
            Some(Some(tx)) => Ok(tx),
            Some(None) => Err(CommError::SelfMessage { rank: to }),
            None => Err(CommError::RankOutOfRange {
                rank: to,
                size: self.size(),
            }),
        }
    }

    fn receiver(&self, from: Rank) -> Result<&Receiver<Envelope>, CommError> {
        match self.receivers.get(from) {
            Some(Some(rx)) => Ok(rx),
            Some(None) => Err(CommError::SelfMessage { rank: from }),
            None => Err(CommError::RankOutOfRange {
                rank: from,
                size: self.size(),
            }),
        }
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn send(&self, to: Rank, tag: Tag, data: Slice<'_>) -> Result<(), CommError> {
        let envelope = Envelope {
            tag,
            payload: data.into(),
        };
        self.sender(to)?
            .send(envelope)
            .map_err(|_| CommError::Disconnected { peer: to })
    }

    fn recv(&self, from: Rank, tag: Tag, mut buf: SliceMut<'_>) -> Result<(), CommError> {
        let envelope = self
            .receiver(from)?
            .recv()
            .map_err(|_| CommError::Disconnected { peer: from })?;
        if envelope.tag != tag {
            return Err(CommError::TagMismatch {
                peer: from,
                expected: tag.0,
                found: envelope.tag.0,
            });
        }
        buf.fill_from(envelope.payload.as_slice(), from)
    }
}

/// Runs a closure on every rank of an in-process group.
#[derive(Debug, Clone, Copy)]
pub struct LocalCluster;

impl LocalCluster {
    /// Spawn `size` threads, one per rank, call `f` on each with that
    /// rank's [`LocalComm`], and return the results in rank order.
    ///
    /// # Errors
    ///
    /// [`CommError::WorkerPanicked`] for the lowest rank whose closure
    /// panicked, or [`CommError::Backend`] if a thread could not be
    /// spawned.
    pub fn run<F, R>(size: usize, f: F) -> Result<Vec<R>, CommError>
    where
        F: Fn(&LocalComm) -> R + Sync,
        R: Send,
    {
        debug!(size, "starting local cluster");
        let f = &f;
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(size);
            for comm in LocalComm::group(size) {
                let rank = comm.rank();
                let handle = thread::Builder::new()
                    .name(format!("rank-{rank}"))
                    .spawn_scoped(scope, move || f(&comm))
                    .map_err(|e| CommError::Backend(e.to_string()))?;
                handles.push(handle);
            }

            let mut results = Vec::with_capacity(size);
            let mut panicked = None;
            for (rank, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(result) => results.push(result),
                    Err(_) => {
                        warn!(rank, "worker thread panicked");
                        panicked.get_or_insert(rank);
                    }
                }
            }
            match panicked {
                Some(rank) => Err(CommError::WorkerPanicked { rank }),
                None => Ok(results),
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn group_is_fully_connected() {
        let group = LocalComm::group(3);
        assert_eq!(group.len(), 3);
        for (rank, comm) in group.iter().enumerate() {
            assert_eq!(comm.rank(), rank);
            assert_eq!(comm.size(), 3);
            assert!(comm.senders[rank].is_none());
            assert_eq!(comm.senders.iter().flatten().count(), 2);
            assert_eq!(comm.receivers.iter().flatten().count(), 2);
        }
    }

    #[test]
    fn messages_arrive_in_order() {
        let results = LocalCluster::run(2, |comm| {
            if comm.rank() == 0 {
                for value in 0..5 {
                    let data: &[i32] = &[value];
                    comm.send(1, Tag::COLLECT, data.into()).unwrap();
                }
                Vec::new()
            } else {
                (0..5)
                    .map(|_| {
                        let mut buf = [0i32; 1];
                        comm.recv(0, Tag::COLLECT, SliceMut::Pixels(&mut buf)).unwrap();
                        buf[0]
                    })
                    .collect()
            }
        })
        .unwrap();
        assert_eq!(results[1], vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn send_waits_for_the_matching_receive() {
        let delay = std::time::Duration::from_millis(200);
        let results = LocalCluster::run(2, |comm| {
            if comm.rank() == 0 {
                let start = std::time::Instant::now();
                comm.send(1, Tag::PING, Slice::Pixels(&[7])).unwrap();
                Some(start.elapsed())
            } else {
                thread::sleep(delay);
                let mut cell = [0i32];
                comm.recv(0, Tag::PING, SliceMut::Pixels(&mut cell)).unwrap();
                assert_eq!(cell, [7]);
                None
            }
        })
        .unwrap();
        // Rank 1 may start sleeping before rank 0 starts its clock.
        assert!(results[0].unwrap() >= delay / 2);
    }

    #[test]
    fn paired_exchange_does_not_deadlock() {
        let results = LocalCluster::run(2, |comm| {
            let peer = 1 - comm.rank();
            let mine = [i32::try_from(comm.rank()).unwrap() + 10; 4];
            let mut theirs = [0i32; 4];
            comm.send_recv(
                peer,
                Tag::PING,
                Slice::Pixels(&mine),
                Tag::PING,
                SliceMut::Pixels(&mut theirs),
            )
            .unwrap();
            theirs
        })
        .unwrap();
        assert_eq!(results, vec![[11; 4], [10; 4]]);
    }

    #[test]
    fn wrong_tag_is_reported() {
        let results = LocalCluster::run(2, |comm| {
            if comm.rank() == 0 {
                comm.send(1, Tag::DISTRIBUTE, Slice::Bytes(&[1])).map(|()| None)
            } else {
                comm.recv(0, Tag::COLLECT, SliceMut::Bytes(&mut [0]))
                    .map(|()| None)
                    .or_else(|e| Ok::<_, CommError>(Some(e)))
            }
        })
        .unwrap();
        assert_eq!(
            results[1].as_ref().unwrap().as_ref().unwrap(),
            &CommError::TagMismatch {
                peer: 0,
                expected: Tag::COLLECT.0,
                found: Tag::DISTRIBUTE.0,
            }
        );
    }

    #[test]
    fn departed_peer_is_a_disconnect() {
        let results = LocalCluster::run(2, |comm| {
            if comm.rank() == 0 {
                Ok(())
            } else {
                comm.recv(0, Tag::PING, SliceMut::Bytes(&mut []))
            }
        })
        .unwrap();
        assert_eq!(results[1], Err(CommError::Disconnected { peer: 0 }));
    }

    #[test]
    fn panicking_rank_is_reported_and_peers_unblock() {
        let err = LocalCluster::run(3, |comm| {
            if comm.rank() == 2 {
                panic!("boom");
            }
            comm.barrier()
        })
        .unwrap_err();
        assert_eq!(err, CommError::WorkerPanicked { rank: 2 });
    }

    #[test]
    fn barrier_completes_for_every_rank() {
        let results = LocalCluster::run(5, |comm| {
            for _ in 0..3 {
                comm.barrier()?;
            }
            Ok::<_, CommError>(comm.rank())
        })
        .unwrap();
        assert_eq!(
            results.into_iter().collect::<Result<Vec<_>, _>>().unwrap(),
            vec![0, 1, 2, 3, 4]
        );
    }

    #[test]
    fn addressing_self_or_outside_the_group_fails() {
        let group = LocalComm::group(2);
        assert_eq!(
            group[0].send(0, Tag::PING, Slice::Bytes(&[])).unwrap_err(),
            CommError::SelfMessage { rank: 0 }
        );
        assert_eq!(
            group[0].send(7, Tag::PING, Slice::Bytes(&[])).unwrap_err(),
            CommError::RankOutOfRange { rank: 7, size: 2 }
        );
    }
}
