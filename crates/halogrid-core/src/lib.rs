//! halogrid-core: Distributed Sobel stencil over a 2D-partitioned pixel
//! grid (sans-IO).
//!
//! Splits an N x N image over a near-square grid of workers and runs:
//! distribute -> halo exchange -> 3x3 Sobel -> collect, repeated for a
//! configured number of iterations.
//!
//! This crate has **no transport or process code** -- every cross-worker
//! step goes through the [`Communicator`] trait. Concrete back ends (one
//! thread per rank, MPI) live in `halogrid-comm`.

pub mod collect;
pub mod comm;
pub mod diagnostics;
pub mod distribute;
pub mod exchange;
pub mod geometry;
pub mod harness;
pub mod kernel;
pub mod latency;
pub mod raster;
pub mod tile;
pub mod types;

pub use collect::collect;
pub use comm::{Communicator, Payload, SingleRank, Slice, SliceMut, Tag};
pub use diagnostics::{Clock, IterationTiming, RunReport, RunSummary, StdClock};
pub use distribute::distribute;
pub use exchange::exchange;
pub use geometry::{GridGeometry, Neighbors, Placement, TileExtent};
pub use harness::{RunConfig, Worker, expected_output, run};
pub use kernel::{Parallelism, Stencil, StencilKind, sobel_reference};
pub use latency::{LatencyConfig, LatencySample, iterations_for, ping_pong, run_latency};
pub use raster::GlobalImage;
pub use tile::{OutputTile, Tile};
pub use types::{
    COORDINATOR, CommError, Direction, GeometryError, HALO, ImageError, Pixel, Rank, RunError,
};
