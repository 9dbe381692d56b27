//! The 3x3 stencil applied to each tile's interior.
//!
//! This module defines the [`Stencil`] trait for pluggable per-tile
//! kernels and the [`StencilKind`] enum for selecting one at runtime.
//! [`Sobel`](StencilKind::Sobel) is the production kernel;
//! [`Identity`](StencilKind::Identity) copies the interior through and is
//! used to check that distribution and collection alone are lossless.
//!
//! The Sobel kernel reads the eight neighbours of every interior cell,
//! including border cells, so it must run after the boundary exchange.
//! Cells are independent: rows can be computed in parallel without changing
//! the result.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::raster::GlobalImage;
use crate::tile::{OutputTile, Tile};
use crate::types::{HALO, Pixel};

/// Horizontal gradient kernel.
pub const GX: [[i64; 3]; 3] = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]];

/// Vertical gradient kernel.
pub const GY: [[i64; 3]; 3] = [[-1, -2, -1], [0, 0, 0], [1, 2, 1]];

/// Largest value a gradient magnitude is clamped to.
pub const MAX_MAGNITUDE: Pixel = 255;

/// Selects which per-tile kernel to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StencilKind {
    /// Sobel gradient magnitude `clamp(round(sqrt(gx^2 + gy^2)), 0, 255)`.
    #[default]
    Sobel,

    /// Copy the interior unchanged.
    Identity,
}

/// How the rows of a tile are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Parallelism {
    /// One row after another on the calling thread.
    #[default]
    Sequential,

    /// Rows spread over the rayon thread pool.
    Rows,
}

/// Trait for per-tile stencil kernels.
///
/// Input: a padded tile whose border has been exchanged.
/// Output: one value per interior cell, written to `out`.
pub trait Stencil {
    /// Compute `out` from `tile`. `out` must have the tile's interior shape.
    fn apply(&self, tile: &Tile, out: &mut OutputTile, parallelism: Parallelism);
}

impl Stencil for StencilKind {
    fn apply(&self, tile: &Tile, out: &mut OutputTile, parallelism: Parallelism) {
        debug_assert_eq!((tile.rows(), tile.cols()), (out.rows(), out.cols()));
        match *self {
            Self::Sobel => sobel_tile(tile, out, parallelism),
            Self::Identity => copy_interior(tile, out),
        }
    }
}

/// Gradient magnitude for one pair of gradient sums.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn gradient_magnitude(gx: i64, gy: i64) -> Pixel {
    let squared = gx.saturating_mul(gx).saturating_add(gy.saturating_mul(gy));
    let magnitude = (squared as f64).sqrt().round();
    magnitude.clamp(0.0, f64::from(MAX_MAGNITUDE)) as Pixel
}

/// Sobel response for padded column `j` given the padded rows above, at
/// and below the cell.
#[inline]
fn sobel_at(above: &[Pixel], mid: &[Pixel], below: &[Pixel], j: usize) -> Pixel {
    let window = [
        [above[j - 1], above[j], above[j + 1]],
        [mid[j - 1], mid[j], mid[j + 1]],
        [below[j - 1], below[j], below[j + 1]],
    ];
    let mut gx = 0i64;
    let mut gy = 0i64;
    for (r, row) in window.iter().enumerate() {
        for (c, &pixel) in row.iter().enumerate() {
            let pixel = i64::from(pixel);
            gx += GX[r][c] * pixel;
            gy += GY[r][c] * pixel;
        }
    }
    gradient_magnitude(gx, gy)
}

/// Compute one interior row. `row` is the interior row index.
fn sobel_row(tile: &Tile, row: usize, out_row: &mut [Pixel]) {
    let above = tile.padded_row(row);
    let mid = tile.padded_row(row + HALO);
    let below = tile.padded_row(row + 2 * HALO);
    for (col, cell) in out_row.iter_mut().enumerate() {
        *cell = sobel_at(above, mid, below, col + HALO);
    }
}

fn sobel_tile(tile: &Tile, out: &mut OutputTile, parallelism: Parallelism) {
    let cols = tile.cols();
    if cols == 0 {
        return;
    }
    match parallelism {
        Parallelism::Sequential => {
            for (row, out_row) in out.as_mut_slice().chunks_mut(cols).enumerate() {
                sobel_row(tile, row, out_row);
            }
        }
        Parallelism::Rows => {
            out.as_mut_slice()
                .par_chunks_mut(cols)
                .enumerate()
                .for_each(|(row, out_row)| sobel_row(tile, row, out_row));
        }
    }
}

fn copy_interior(tile: &Tile, out: &mut OutputTile) {
    let cols = tile.cols();
    if cols == 0 {
        return;
    }
    for (row, out_row) in out.as_mut_slice().chunks_mut(cols).enumerate() {
        out_row.copy_from_slice(tile.interior_row(row));
    }
}

/// Single-process Sobel over the whole image, treating every pixel
/// outside it as zero.
///
/// Independent of tiles and exchange; a distributed run must reproduce it
/// exactly.
#[must_use]
pub fn sobel_reference(image: &GlobalImage) -> GlobalImage {
    let size = image.size();
    let at = |row: usize, col: usize, dr: usize, dc: usize| -> i64 {
        // `dr`/`dc` are offsets into the 3x3 window, so `row + dr` is one
        // past the neighbour's row.
        match ((row + dr).checked_sub(1), (col + dc).checked_sub(1)) {
            (Some(r), Some(c)) if r < size && c < size => i64::from(image.get(r, c)),
            _ => 0,
        }
    };
    GlobalImage::from_fn(size, |row, col| {
        let mut gx = 0i64;
        let mut gy = 0i64;
        for dr in 0..3 {
            for dc in 0..3 {
                let pixel = at(row, col, dr, dc);
                gx += GX[dr][dc] * pixel;
                gy += GY[dr][dc] * pixel;
            }
        }
        gradient_magnitude(gx, gy)
    })
}
