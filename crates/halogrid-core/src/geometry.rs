//! Geometry resolution: map a worker count and an image size onto a
//! near-square 2D process grid and per-worker tile boundaries.
//!
//! ```text
//!            col 0      col 1      col 2 (absorbs remainder)
//!         +----------+----------+--------------+
//!  row 0  | rank 0   | rank 1   | rank 2       |  base_rows
//!         +----------+----------+--------------+
//!  row 1  | rank 3   | rank 4   | rank 5       |  size - base_rows
//!         +----------+----------+--------------+
//!           base_cols  base_cols  size - 2*base_cols
//! ```
//!
//! Every tile except those in the last grid row/column gets the evenly
//! divided size; the last row and column absorb the remainder. When the
//! image size is not divisible by the grid dimensions this leaves the last
//! row/column with more work than the rest. That imbalance is expected.

use serde::{Deserialize, Serialize};

use crate::types::{Direction, GeometryError, Rank};

/// Immutable description of how a run is partitioned.
///
/// Resolved once at startup and passed by value to every stage. All
/// per-worker quantities (position, tile extent, neighbours) are derived
/// from it on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridGeometry {
    size: usize,
    workers: usize,
    grid_rows: usize,
    grid_cols: usize,
    base_rows: usize,
    base_cols: usize,
}

impl GridGeometry {
    /// Smallest image the 3x3 stencil accepts.
    pub const MIN_SIZE: usize = 3;

    /// Resolve the process grid for `workers` ranks over a `size x size`
    /// image.
    ///
    /// `grid_rows` is the largest divisor of `workers` that does not exceed
    /// `sqrt(workers)`; `grid_cols = workers / grid_rows`. A prime worker
    /// count therefore degrades to a single grid row.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::NoWorkers`] for `workers == 0`,
    /// [`GeometryError::ImageTooSmall`] for `size < 3`, and
    /// [`GeometryError::TooManyWorkers`] when a grid dimension exceeds
    /// `size` (some tile would be empty).
    pub fn resolve(workers: usize, size: usize) -> Result<Self, GeometryError> {
        if workers == 0 {
            return Err(GeometryError::NoWorkers);
        }
        if size < Self::MIN_SIZE {
            return Err(GeometryError::ImageTooSmall { size });
        }

        let mut grid_rows = workers.isqrt();
        while workers % grid_rows != 0 {
            grid_rows -= 1;
        }
        let grid_cols = workers / grid_rows;

        let base_rows = size / grid_rows;
        let base_cols = size / grid_cols;
        if base_rows == 0 || base_cols == 0 {
            return Err(GeometryError::TooManyWorkers {
                size,
                grid_rows,
                grid_cols,
            });
        }

        let geometry = Self {
            size,
            workers,
            grid_rows,
            grid_cols,
            base_rows,
            base_cols,
        };
        if !geometry.is_balanced() {
            tracing::debug!(
                size,
                grid_rows,
                grid_cols,
                "last grid row/column absorbs the remainder; tiles are uneven"
            );
        }
        Ok(geometry)
    }

    /// Side length of the global image.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Number of workers the grid was resolved for.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Number of rows in the process grid.
    #[must_use]
    pub const fn grid_rows(&self) -> usize {
        self.grid_rows
    }

    /// Number of columns in the process grid.
    #[must_use]
    pub const fn grid_cols(&self) -> usize {
        self.grid_cols
    }

    /// `true` when every tile has the same shape.
    #[must_use]
    pub const fn is_balanced(&self) -> bool {
        self.size % self.grid_rows == 0 && self.size % self.grid_cols == 0
    }

    /// Iterate over every rank in row-major order.
    pub fn ranks(&self) -> impl Iterator<Item = Rank> + use<> {
        0..self.workers
    }

    /// Grid position of `rank`.
    #[must_use]
    pub const fn placement(&self, rank: Rank) -> Placement {
        debug_assert!(rank < self.workers);
        Placement {
            rank,
            row: rank / self.grid_cols,
            col: rank % self.grid_cols,
        }
    }

    /// Rank at grid position `(row, col)`, if it exists.
    #[must_use]
    pub const fn rank_at(&self, row: usize, col: usize) -> Option<Rank> {
        if row < self.grid_rows && col < self.grid_cols {
            Some(row * self.grid_cols + col)
        } else {
            None
        }
    }

    /// The region of the global image owned by `rank`.
    #[must_use]
    pub const fn extent(&self, rank: Rank) -> TileExtent {
        let Placement { row, col, .. } = self.placement(rank);
        let row_start = row * self.base_rows;
        let col_start = col * self.base_cols;
        let rows = if row == self.grid_rows - 1 {
            self.size - row_start
        } else {
            self.base_rows
        };
        let cols = if col == self.grid_cols - 1 {
            self.size - col_start
        } else {
            self.base_cols
        };
        TileExtent {
            row_start,
            col_start,
            rows,
            cols,
        }
    }

    /// Spatial neighbours of `rank`; missing neighbours at the grid edge
    /// are `None`.
    #[must_use]
    pub const fn neighbors(&self, rank: Rank) -> Neighbors {
        let Placement { row, col, .. } = self.placement(rank);
        Neighbors {
            north: if row > 0 {
                Some(rank - self.grid_cols)
            } else {
                None
            },
            south: if row + 1 < self.grid_rows {
                Some(rank + self.grid_cols)
            } else {
                None
            },
            west: if col > 0 { Some(rank - 1) } else { None },
            east: if col + 1 < self.grid_cols {
                Some(rank + 1)
            } else {
                None
            },
        }
    }
}

/// A worker's position in the process grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Row-major rank.
    pub rank: Rank,
    /// Grid row (`rank / grid_cols`).
    pub row: usize,
    /// Grid column (`rank % grid_cols`).
    pub col: usize,
}

/// The rectangle of the global image owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileExtent {
    /// First global row of the tile.
    pub row_start: usize,
    /// First global column of the tile.
    pub col_start: usize,
    /// Number of rows (`local_rows`).
    pub rows: usize,
    /// Number of columns (`local_cols`).
    pub cols: usize,
}

impl TileExtent {
    /// Number of pixels in the tile.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows * self.cols
    }

    /// `true` for a tile with no pixels (never produced by
    /// [`GridGeometry::resolve`]).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the global pixel `(row, col)` falls inside this tile.
    #[must_use]
    pub const fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.row_start
            && row < self.row_start + self.rows
            && col >= self.col_start
            && col < self.col_start + self.cols
    }
}

/// Up to four neighbour ranks; `None` is the null-neighbour sentinel and
/// any exchange aimed at it is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Neighbors {
    pub north: Option<Rank>,
    pub south: Option<Rank>,
    pub east: Option<Rank>,
    pub west: Option<Rank>,
}

impl Neighbors {
    /// Neighbour in `direction`.
    #[must_use]
    pub const fn get(&self, direction: Direction) -> Option<Rank> {
        match direction {
            Direction::North => self.north,
            Direction::South => self.south,
            Direction::East => self.east,
            Direction::West => self.west,
        }
    }

    /// Number of real (non-null) neighbours.
    #[must_use]
    pub fn count(&self) -> usize {
        Direction::ALL
            .iter()
            .filter(|d| self.get(**d).is_some())
            .count()
    }
}
