//! MPI back end.
//!
//! Requires the `mpi` feature flag and an MPI installation. Rank and group
//! size come from the launch environment (`mpirun -n <p> halogrid ...`).
//! Sends are synchronous (`MPI_Ssend`): a send returns only once the
//! matching receive has started, the same rendezvous as the in-process back
//! end. Paired transfers map onto `MPI_Sendrecv`, so both sides of an
//! exchange progress together.
//!
//! MPI reports most failures by aborting the job; a peer that never
//! arrives blocks forever.

use halogrid_core::{CommError, Communicator, Rank, Slice, SliceMut, Tag};
use mpi::environment::Universe;
use mpi::point_to_point::send_receive_into_with_tags;
use mpi::topology::SimpleCommunicator;
// The glob's `Communicator` is shadowed by halogrid's; import it unnamed so
// its methods stay in scope.
use mpi::traits::Communicator as _;
use mpi::traits::*;

/// The MPI world communicator.
///
/// Owns the MPI environment; dropping it finalizes MPI.
pub struct MpiComm {
    world: SimpleCommunicator,
    rank: Rank,
    size: usize,
    // Declared last so the communicator is released before finalization.
    _universe: Universe,
}

impl std::fmt::Debug for MpiComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpiComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl MpiComm {
    /// Initialize MPI and wrap the world communicator.
    ///
    /// # Errors
    ///
    /// [`CommError::Backend`] if MPI was already initialized in this
    /// process or reports a negative rank or size.
    pub fn init() -> Result<Self, CommError> {
        let universe = mpi::initialize()
            .ok_or_else(|| CommError::Backend("MPI is already initialized".to_owned()))?;
        let world = universe.world();
        let rank = Rank::try_from(world.rank())
            .map_err(|e| CommError::Backend(format!("invalid MPI rank: {e}")))?;
        let size = usize::try_from(world.size())
            .map_err(|e| CommError::Backend(format!("invalid MPI size: {e}")))?;
        tracing::debug!(rank, size, "MPI initialized");
        Ok(Self {
            world,
            rank,
            size,
            _universe: universe,
        })
    }

    /// Validate `rank` as a peer and convert it to an MPI rank.
    fn peer(&self, rank: Rank) -> Result<i32, CommError> {
        if rank == self.rank {
            return Err(CommError::SelfMessage { rank });
        }
        let out_of_range = CommError::RankOutOfRange {
            rank,
            size: self.size,
        };
        if rank >= self.size {
            return Err(out_of_range);
        }
        i32::try_from(rank).map_err(|_| out_of_range)
    }

    /// Check a completed receive delivered exactly `expected` elements.
    fn check_count<T: Equivalence>(
        status: &mpi::point_to_point::Status,
        peer: Rank,
        expected: usize,
    ) -> Result<(), CommError> {
        let found = usize::try_from(status.count(T::equivalent_datatype()))
            .map_err(|e| CommError::Backend(format!("invalid MPI count: {e}")))?;
        if found == expected {
            Ok(())
        } else {
            Err(CommError::LengthMismatch {
                peer,
                expected,
                found,
            })
        }
    }
}

impl Communicator for MpiComm {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, to: Rank, tag: Tag, data: Slice<'_>) -> Result<(), CommError> {
        let process = self.world.process_at_rank(self.peer(to)?);
        match data {
            Slice::Bytes(bytes) => process.synchronous_send_with_tag(bytes, tag.0),
            Slice::Pixels(pixels) => process.synchronous_send_with_tag(pixels, tag.0),
        }
        Ok(())
    }

    fn recv(&self, from: Rank, tag: Tag, buf: SliceMut<'_>) -> Result<(), CommError> {
        let process = self.world.process_at_rank(self.peer(from)?);
        match buf {
            SliceMut::Bytes(bytes) => {
                let expected = bytes.len();
                let status = process.receive_into_with_tag(bytes, tag.0);
                Self::check_count::<u8>(&status, from, expected)
            }
            SliceMut::Pixels(pixels) => {
                let expected = pixels.len();
                let status = process.receive_into_with_tag(pixels, tag.0);
                Self::check_count::<i32>(&status, from, expected)
            }
        }
    }

    fn send_recv(
        &self,
        peer: Rank,
        send_tag: Tag,
        data: Slice<'_>,
        recv_tag: Tag,
        buf: SliceMut<'_>,
    ) -> Result<(), CommError> {
        let process = self.world.process_at_rank(self.peer(peer)?);
        let expected = buf.len();
        match (data, buf) {
            (Slice::Pixels(out), SliceMut::Pixels(inc)) => {
                let status = send_receive_into_with_tags(
                    out, &process, send_tag.0, inc, &process, recv_tag.0,
                );
                Self::check_count::<i32>(&status, peer, expected)
            }
            (Slice::Bytes(out), SliceMut::Bytes(inc)) => {
                let status = send_receive_into_with_tags(
                    out, &process, send_tag.0, inc, &process, recv_tag.0,
                );
                Self::check_count::<u8>(&status, peer, expected)
            }
            (data, buf) if self.rank < peer => {
                self.send(peer, send_tag, data)?;
                self.recv(peer, recv_tag, buf)
            }
            (data, buf) => {
                self.recv(peer, recv_tag, buf)?;
                self.send(peer, send_tag, data)
            }
        }
    }

    fn barrier(&self) -> Result<(), CommError> {
        self.world.barrier();
        Ok(())
    }
}
