//! Point-to-point messaging between ranks.
//!
//! The [`Communicator`] trait is the only thing the distributed stages see
//! of the transport. It offers blocking, tagged, point-to-point `send` and
//! `recv` over typed slices plus a combined [`send_recv`] and a
//! [`barrier`]. Messages between one ordered pair of ranks are delivered in
//! the order they were sent.
//!
//! Concrete transports live in `halogrid-comm`. [`SingleRank`] is the
//! trivial group of one, used when a run has a single worker.
//!
//! [`send_recv`]: Communicator::send_recv
//! [`barrier`]: Communicator::barrier

use crate::types::{COORDINATOR, CommError, Direction, Pixel, Rank};

/// Message tag. Receivers state the tag they expect and a mismatch is an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(pub i32);

impl Tag {
    /// Tile rows travelling from the coordinator to a worker.
    pub const DISTRIBUTE: Self = Self(1);

    /// Result rows travelling from a worker to the coordinator.
    pub const COLLECT: Self = Self(2);

    /// Latency benchmark traffic, in both directions.
    pub const PING: Self = Self(3);

    /// Barrier arrival and release.
    pub const BARRIER: Self = Self(4);

    /// Border data travelling towards `direction`.
    #[must_use]
    pub const fn halo(direction: Direction) -> Self {
        match direction {
            Direction::North => Self(10),
            Direction::South => Self(11),
            Direction::East => Self(12),
            Direction::West => Self(13),
        }
    }
}

/// Borrowed message contents.
#[derive(Debug, Clone, Copy)]
pub enum Slice<'a> {
    /// Raw bytes.
    Bytes(&'a [u8]),
    /// Pixel values.
    Pixels(&'a [Pixel]),
}

impl Slice<'_> {
    /// Number of elements.
    #[must_use]
    pub const fn len(&self) -> usize {
        match self {
            Self::Bytes(b) => b.len(),
            Self::Pixels(p) => p.len(),
        }
    }

    /// `true` if the message carries no elements.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> From<&'a [u8]> for Slice<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::Bytes(bytes)
    }
}

impl<'a> From<&'a [Pixel]> for Slice<'a> {
    fn from(pixels: &'a [Pixel]) -> Self {
        Self::Pixels(pixels)
    }
}

/// Borrowed receive buffer. The incoming message must match its element
/// type and length exactly.
#[derive(Debug)]
pub enum SliceMut<'a> {
    /// Raw bytes.
    Bytes(&'a mut [u8]),
    /// Pixel values.
    Pixels(&'a mut [Pixel]),
}

impl SliceMut<'_> {
    /// Number of elements the buffer holds.
    #[must_use]
    pub const fn len(&self) -> usize {
        match self {
            Self::Bytes(b) => b.len(),
            Self::Pixels(p) => p.len(),
        }
    }

    /// `true` if the buffer holds no elements.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `src` into this buffer, checking type and length.
    ///
    /// # Errors
    ///
    /// [`CommError::TypeMismatch`] or [`CommError::LengthMismatch`],
    /// attributed to `peer`.
    pub fn fill_from(&mut self, src: Slice<'_>, peer: Rank) -> Result<(), CommError> {
        if src.len() != self.len() {
            return Err(CommError::LengthMismatch {
                peer,
                expected: self.len(),
                found: src.len(),
            });
        }
        match (self, src) {
            (Self::Bytes(dst), Slice::Bytes(src)) => dst.copy_from_slice(src),
            (Self::Pixels(dst), Slice::Pixels(src)) => dst.copy_from_slice(src),
            _ => return Err(CommError::TypeMismatch { peer }),
        }
        Ok(())
    }
}

impl<'a> From<&'a mut [u8]> for SliceMut<'a> {
    fn from(bytes: &'a mut [u8]) -> Self {
        Self::Bytes(bytes)
    }
}

impl<'a> From<&'a mut [Pixel]> for SliceMut<'a> {
    fn from(pixels: &'a mut [Pixel]) -> Self {
        Self::Pixels(pixels)
    }
}

/// Owned message contents, for transports that buffer messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Pixel values.
    Pixels(Vec<Pixel>),
}

impl Payload {
    /// Borrow the contents.
    #[must_use]
    pub fn as_slice(&self) -> Slice<'_> {
        match self {
            Self::Bytes(b) => Slice::Bytes(b),
            Self::Pixels(p) => Slice::Pixels(p),
        }
    }
}

impl From<Slice<'_>> for Payload {
    fn from(slice: Slice<'_>) -> Self {
        match slice {
            Slice::Bytes(b) => Self::Bytes(b.to_vec()),
            Slice::Pixels(p) => Self::Pixels(p.to_vec()),
        }
    }
}

/// A group of ranks that can exchange messages.
///
/// All operations block until the matching operation on the peer has
/// taken part. Any error is fatal to the run.
pub trait Communicator {
    /// This process's rank, in `0..size()`.
    fn rank(&self) -> Rank;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Send `data` to rank `to` with `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`CommError`] if `to` is not a valid peer or the transport
    /// fails.
    fn send(&self, to: Rank, tag: Tag, data: Slice<'_>) -> Result<(), CommError>;

    /// Receive a message from rank `from` with `tag` into `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`CommError`] if `from` is not a valid peer, the transport
    /// fails, or the message does not match `tag`, element type or length.
    fn recv(&self, from: Rank, tag: Tag, buf: SliceMut<'_>) -> Result<(), CommError>;

    /// Send `data` to `peer` and receive `peer`'s message into `buf`.
    ///
    /// Both sides of a pair call this with each other as `peer`. The lower
    /// rank sends first, so the pair never waits on itself even over an
    /// unbuffered transport.
    ///
    /// # Errors
    ///
    /// As for [`send`](Self::send) and [`recv`](Self::recv).
    fn send_recv(
        &self,
        peer: Rank,
        send_tag: Tag,
        data: Slice<'_>,
        recv_tag: Tag,
        buf: SliceMut<'_>,
    ) -> Result<(), CommError> {
        if peer == self.rank() {
            return Err(CommError::SelfMessage { rank: peer });
        }
        if self.rank() < peer {
            self.send(peer, send_tag, data)?;
            self.recv(peer, recv_tag, buf)
        } else {
            self.recv(peer, recv_tag, buf)?;
            self.send(peer, send_tag, data)
        }
    }

    /// Block until every rank in the group has entered the barrier.
    ///
    /// The default gathers an empty message from every rank at the
    /// coordinator, then releases them all.
    ///
    /// # Errors
    ///
    /// Returns [`CommError`] if any rank has gone away.
    fn barrier(&self) -> Result<(), CommError> {
        if self.rank() == COORDINATOR {
            for rank in 1..self.size() {
                self.recv(rank, Tag::BARRIER, SliceMut::Bytes(&mut []))?;
            }
            for rank in 1..self.size() {
                self.send(rank, Tag::BARRIER, Slice::Bytes(&[]))?;
            }
            Ok(())
        } else {
            self.send(COORDINATOR, Tag::BARRIER, Slice::Bytes(&[]))?;
            self.recv(COORDINATOR, Tag::BARRIER, SliceMut::Bytes(&mut []))
        }
    }
}

/// The group containing only the coordinator.
///
/// There are no peers, so every send and receive fails; the barrier is a
/// no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleRank;

impl SingleRank {
    fn no_peer(peer: Rank) -> CommError {
        if peer == COORDINATOR {
            CommError::SelfMessage { rank: peer }
        } else {
            CommError::RankOutOfRange {
                rank: peer,
                size: 1,
            }
        }
    }
}

impl Communicator for SingleRank {
    fn rank(&self) -> Rank {
        COORDINATOR
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, to: Rank, _tag: Tag, _data: Slice<'_>) -> Result<(), CommError> {
        Err(Self::no_peer(to))
    }

    fn recv(&self, from: Rank, _tag: Tag, _buf: SliceMut<'_>) -> Result<(), CommError> {
        Err(Self::no_peer(from))
    }

    fn barrier(&self) -> Result<(), CommError> {
        Ok(())
    }
}
