//! Shared types for halogrid: pixel representation, ranks, directions and
//! the error enums every stage reports through.

use serde::{Deserialize, Serialize};

/// A single pixel intensity.
///
/// Logically `0..=255`, but generated inputs and intermediate gradient sums
/// are allowed to leave that range, so a signed 32-bit integer carries them.
pub type Pixel = i32;

/// Identity of one worker process within a run (row-major, `0..size`).
pub type Rank = usize;

/// The rank that owns the [`GlobalImage`](crate::GlobalImage) and drives
/// distribution and collection.
pub const COORDINATOR: Rank = 0;

/// Width of the border around every tile, in cells.
///
/// A 3x3 stencil reads one cell past each edge of the interior.
pub const HALO: usize = 1;

/// One of the four spatial neighbours of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    /// All directions, in exchange order: row axis first, then column axis.
    pub const ALL: [Self; 4] = [Self::North, Self::South, Self::West, Self::East];

    /// The direction pointing back at us from the neighbour.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::North => Self::South,
            Self::South => Self::North,
            Self::East => Self::West,
            Self::West => Self::East,
        }
    }
}

/// Errors from resolving the process grid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    /// A run needs at least one worker.
    #[error("worker count must be at least 1")]
    NoWorkers,

    /// The 3x3 stencil needs an image of at least 3x3 pixels.
    #[error("image size {size} is smaller than the 3x3 stencil")]
    ImageTooSmall { size: usize },

    /// The base tile along some axis would be empty.
    #[error(
        "image size {size} cannot be split over a {grid_rows}x{grid_cols} process grid \
         without empty tiles"
    )]
    TooManyWorkers {
        size: usize,
        grid_rows: usize,
        grid_cols: usize,
    },
}

/// Errors raised by a [`Communicator`](crate::Communicator).
///
/// Any of these is fatal for the run: there is no partial result and no
/// retry at this layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommError {
    /// The peer went away before the rendezvous completed.
    #[error("rank {peer} disconnected")]
    Disconnected { peer: Rank },

    /// A message arrived with a different tag than the protocol expected.
    #[error("unexpected message from rank {peer}: expected tag {expected}, found {found}")]
    TagMismatch { peer: Rank, expected: i32, found: i32 },

    /// A message arrived with a different length than the receive buffer.
    #[error("unexpected message from rank {peer}: expected {expected} elements, found {found}")]
    LengthMismatch {
        peer: Rank,
        expected: usize,
        found: usize,
    },

    /// A message arrived carrying a different element type.
    #[error("unexpected element type in message from rank {peer}")]
    TypeMismatch { peer: Rank },

    /// A rank outside `0..size` was addressed.
    #[error("rank {rank} is out of range for a group of {size}")]
    RankOutOfRange { rank: Rank, size: usize },

    /// A rank addressed a message to itself.
    #[error("rank {rank} cannot exchange messages with itself")]
    SelfMessage { rank: Rank },

    /// A worker thread panicked instead of returning.
    #[error("worker rank {rank} panicked")]
    WorkerPanicked { rank: Rank },

    /// Failure reported by the underlying transport.
    #[error("transport error: {0}")]
    Backend(String),
}

/// Errors converting between [`GlobalImage`](crate::GlobalImage) and
/// encoded image files.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// The image is not N x N.
    #[error("image must be square, got {width}x{height}")]
    NotSquare { width: u32, height: u32 },

    /// A raw pixel buffer does not hold `size * size` values.
    #[error("expected {expected} pixels for the given size, found {found}")]
    SizeMismatch { expected: usize, found: usize },

    /// Decoding or encoding failed.
    #[error(transparent)]
    Codec(#[from] image::ImageError),
}

/// Errors that abort a distributed run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The process grid could not be resolved.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// A cross-worker operation failed.
    #[error(transparent)]
    Comm(#[from] CommError),

    /// The input image is unusable.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// The coordinator was started without an input image.
    #[error("the coordinator rank needs a global image")]
    MissingImage,

    /// The global image does not match the resolved geometry.
    #[error("global image is {found}x{found}, geometry expects {expected}x{expected}")]
    ImageGeometryMismatch { expected: usize, found: usize },

    /// The communicator group and the process grid disagree on the worker
    /// count.
    #[error("process grid needs {expected} workers, communicator has {found}")]
    WorkerCountMismatch { expected: usize, found: usize },

    /// The group is smaller than the protocol needs.
    #[error("at least {needed} ranks are required, found {found}")]
    TooFewRanks { needed: usize, found: usize },

    /// The harness was asked to run zero iterations.
    #[error("iteration count must be at least 1")]
    ZeroIterations,
}
