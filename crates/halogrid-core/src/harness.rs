//! Run harness: drive Distribute, Exchange, Compute and Collect for a
//! configured number of iterations on every rank.
//!
//! Per rank the run goes `Init -> {Distribute -> Exchange -> Compute ->
//! Collect} x iterations -> Finalize`. A barrier follows Distribute and
//! another follows Collect, so iteration `k` is finished everywhere before
//! `k + 1` starts. The coordinator's image is overwritten by each
//! iteration's output, which becomes the next iteration's input.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::collect::collect;
use crate::comm::Communicator;
use crate::diagnostics::{Clock, IterationTiming, RunReport, RunSummary, duration_ms};
use crate::distribute::distribute;
use crate::exchange::exchange;
use crate::geometry::{GridGeometry, Neighbors, TileExtent};
use crate::kernel::{Parallelism, Stencil, StencilKind, sobel_reference};
use crate::raster::GlobalImage;
use crate::tile::{OutputTile, Tile};
use crate::types::{COORDINATOR, CommError, Rank, RunError};

/// Parameters of one run that are not part of the geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// How many times the pipeline is repeated.
    pub iterations: usize,
    /// Kernel applied to each tile.
    pub stencil: StencilKind,
    /// Row scheduling inside the kernel.
    pub parallelism: Parallelism,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            iterations: 1,
            stencil: StencilKind::default(),
            parallelism: Parallelism::default(),
        }
    }
}

/// One rank's share of a run: its place in the grid and its buffers.
///
/// The tile and output buffers are allocated once here and reused by
/// every iteration.
#[derive(Debug, Clone)]
pub struct Worker {
    geometry: GridGeometry,
    rank: Rank,
    neighbors: Neighbors,
    tile: Tile,
    out: OutputTile,
}

impl Worker {
    /// Allocate the buffers for `rank`.
    #[must_use]
    pub fn new(geometry: GridGeometry, rank: Rank) -> Self {
        let extent = geometry.extent(rank);
        Self {
            geometry,
            rank,
            neighbors: geometry.neighbors(rank),
            tile: Tile::for_extent(&extent),
            out: OutputTile::for_extent(&extent),
        }
    }

    /// This worker's rank.
    #[must_use]
    pub const fn rank(&self) -> Rank {
        self.rank
    }

    /// The region of the global image this worker owns.
    #[must_use]
    pub const fn extent(&self) -> TileExtent {
        self.geometry.extent(self.rank)
    }

    /// The padded input tile.
    #[must_use]
    pub const fn tile(&self) -> &Tile {
        &self.tile
    }

    /// The computed output.
    #[must_use]
    pub const fn output(&self) -> &OutputTile {
        &self.out
    }

    /// Fill the tile interior from the coordinator's image.
    ///
    /// # Errors
    ///
    /// See [`distribute`](crate::distribute()).
    pub fn distribute<C: Communicator + ?Sized>(
        &mut self,
        comm: &C,
        image: Option<&GlobalImage>,
    ) -> Result<(), RunError> {
        distribute(comm, &self.geometry, image, &mut self.tile)
    }

    /// Fill the tile border from the neighbours.
    ///
    /// # Errors
    ///
    /// See [`exchange`](crate::exchange()).
    pub fn exchange<C: Communicator + ?Sized>(&mut self, comm: &C) -> Result<(), CommError> {
        exchange(comm, &self.neighbors, &mut self.tile)
    }

    /// Run `stencil` over the tile into the output buffer.
    pub fn compute<S: Stencil + ?Sized>(&mut self, stencil: &S, parallelism: Parallelism) {
        stencil.apply(&self.tile, &mut self.out, parallelism);
    }

    /// Send the output to the coordinator, or assemble it there.
    ///
    /// # Errors
    ///
    /// See [`collect`](crate::collect()).
    pub fn collect<C: Communicator + ?Sized>(
        &self,
        comm: &C,
        image: Option<&mut GlobalImage>,
    ) -> Result<(), RunError> {
        collect(comm, &self.geometry, &self.out, image)
    }

    /// One full iteration including both barriers, timed with `clock`.
    ///
    /// # Errors
    ///
    /// Any error from the four stages or the barriers.
    pub fn iterate<C, K>(
        &mut self,
        comm: &C,
        clock: &K,
        config: &RunConfig,
        mut image: Option<&mut GlobalImage>,
    ) -> Result<IterationTiming, RunError>
    where
        C: Communicator + ?Sized,
        K: Clock + ?Sized,
    {
        let start = clock.now();

        self.distribute(comm, image.as_deref())?;
        comm.barrier()?;
        let distribute = clock.elapsed(&start);

        let stage = clock.now();
        self.exchange(comm)?;
        let exchange = clock.elapsed(&stage);

        let stage = clock.now();
        self.compute(&config.stencil, config.parallelism);
        let compute = clock.elapsed(&stage);

        let stage = clock.now();
        self.collect(comm, image.as_deref_mut())?;
        comm.barrier()?;
        let collect = clock.elapsed(&stage);

        Ok(IterationTiming {
            total: clock.elapsed(&start),
            distribute,
            exchange,
            compute,
            collect,
        })
    }
}

/// Run the whole pipeline on this rank.
///
/// Every rank of `comm` calls this with the same `geometry` and `config`.
/// The coordinator passes the global image, receives the result in place
/// and gets the report; other ranks pass `None` and get `None`.
///
/// # Errors
///
/// [`RunError::ZeroIterations`], [`RunError::WorkerCountMismatch`] when
/// the group size differs from `geometry.workers()`, a missing or
/// mis-sized image on the coordinator, or any communication failure.
pub fn run<C, K>(
    comm: &C,
    clock: &K,
    geometry: &GridGeometry,
    config: &RunConfig,
    mut image: Option<&mut GlobalImage>,
) -> Result<Option<RunReport>, RunError>
where
    C: Communicator + ?Sized,
    K: Clock + ?Sized,
{
    if config.iterations == 0 {
        return Err(RunError::ZeroIterations);
    }
    if comm.size() != geometry.workers() {
        return Err(RunError::WorkerCountMismatch {
            expected: geometry.workers(),
            found: comm.size(),
        });
    }
    let rank = comm.rank();
    let coordinator = rank == COORDINATOR;
    if coordinator {
        let found = image.as_ref().ok_or(RunError::MissingImage)?.size();
        if found != geometry.size() {
            return Err(RunError::ImageGeometryMismatch {
                expected: geometry.size(),
                found,
            });
        }
        info!(
            workers = geometry.workers(),
            size = geometry.size(),
            grid_rows = geometry.grid_rows(),
            grid_cols = geometry.grid_cols(),
            iterations = config.iterations,
            "starting run"
        );
    }

    let mut worker = Worker::new(*geometry, rank);
    let mut timings = Vec::with_capacity(config.iterations);
    for iteration in 0..config.iterations {
        let timing = worker.iterate(comm, clock, config, image.as_deref_mut())?;
        debug!(
            rank,
            iteration,
            total_ms = duration_ms(timing.total),
            exchange_ms = duration_ms(timing.exchange),
            "iteration complete"
        );
        timings.push(timing);
    }

    if !coordinator {
        return Ok(None);
    }
    let summary = RunSummary::from_timings(&timings).ok_or(RunError::ZeroIterations)?;
    info!(
        mean_ms = duration_ms(summary.mean),
        mean_exchange_ms = duration_ms(summary.mean_exchange),
        "run complete"
    );
    Ok(Some(RunReport {
        geometry: *geometry,
        config: *config,
        iterations: timings,
        summary,
    }))
}

/// What a run with `config` must leave in the coordinator's image,
/// computed in one process without partitioning.
#[must_use]
pub fn expected_output(image: &GlobalImage, config: &RunConfig) -> GlobalImage {
    let mut current = image.clone();
    if config.stencil == StencilKind::Sobel {
        for _ in 0..config.iterations {
            current = sobel_reference(&current);
        }
    }
    current
}
