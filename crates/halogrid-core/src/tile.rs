//! Per-worker buffers: the padded input [`Tile`] and the unpadded
//! [`OutputTile`].
//!
//! ## Tile layout
//!
//! ```text
//!  +--+----------------+--+
//!  |NW| north border   |NE|   padded row 0
//!  +--+----------------+--+
//!  |W |                |E |
//!  |  |    interior    |  |   padded rows 1..=rows
//!  |  |  rows x cols   |  |
//!  +--+----------------+--+
//!  |SW| south border   |SE|   padded row rows + 1
//!  +--+----------------+--+
//! ```
//!
//! Storage is row-major with a pitch of `cols + 2`. Border cells start at
//! zero and hold neighbour data once the boundary exchange has run. A
//! border facing the edge of the global image is never written and stays
//! zero.
//!
//! Both buffers are allocated once per run and reused across iterations.

use crate::geometry::TileExtent;
use crate::types::{HALO, Pixel};

/// A worker's padded pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    rows: usize,
    cols: usize,
    data: Vec<Pixel>,
}

impl Tile {
    /// Allocate a zeroed tile with a `rows x cols` interior.
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0; (rows + 2 * HALO) * (cols + 2 * HALO)],
        }
    }

    /// Allocate a zeroed tile sized for `extent`.
    #[must_use]
    pub fn for_extent(extent: &TileExtent) -> Self {
        Self::new(extent.rows, extent.cols)
    }

    /// Number of interior rows (`local_rows`).
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of interior columns (`local_cols`).
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Row stride of the padded buffer.
    #[must_use]
    pub const fn pitch(&self) -> usize {
        self.cols + 2 * HALO
    }

    /// Number of padded rows.
    #[must_use]
    pub const fn padded_rows(&self) -> usize {
        self.rows + 2 * HALO
    }

    /// The whole padded buffer.
    #[must_use]
    pub fn as_slice(&self) -> &[Pixel] {
        &self.data
    }

    /// Value at padded coordinates; `(0, 0)` is the north-west corner of
    /// the border.
    #[must_use]
    pub fn get(&self, padded_row: usize, padded_col: usize) -> Pixel {
        self.data[padded_row * self.pitch() + padded_col]
    }

    /// Overwrite the value at padded coordinates.
    pub fn set(&mut self, padded_row: usize, padded_col: usize, value: Pixel) {
        let pitch = self.pitch();
        self.data[padded_row * pitch + padded_col] = value;
    }

    /// Full padded row, border cells included.
    #[must_use]
    pub fn padded_row(&self, padded_row: usize) -> &[Pixel] {
        let pitch = self.pitch();
        &self.data[padded_row * pitch..(padded_row + 1) * pitch]
    }

    /// Mutable full padded row, border cells included.
    pub fn padded_row_mut(&mut self, padded_row: usize) -> &mut [Pixel] {
        let pitch = self.pitch();
        &mut self.data[padded_row * pitch..(padded_row + 1) * pitch]
    }

    /// Interior cells of interior row `row` (`0..rows`).
    #[must_use]
    pub fn interior_row(&self, row: usize) -> &[Pixel] {
        let start = (row + HALO) * self.pitch() + HALO;
        &self.data[start..start + self.cols]
    }

    /// Mutable interior cells of interior row `row` (`0..rows`).
    pub fn interior_row_mut(&mut self, row: usize) -> &mut [Pixel] {
        let start = (row + HALO) * self.pitch() + HALO;
        let cols = self.cols;
        &mut self.data[start..start + cols]
    }

    /// Split the buffer into the outgoing edge row and the incoming border
    /// row for an exchange with the north (`north == true`) or south
    /// neighbour.
    ///
    /// Only the `cols` interior-aligned cells are returned; the corner
    /// cells are filled later by the column exchange.
    pub fn row_halo_mut(&mut self, north: bool) -> (&[Pixel], &mut [Pixel]) {
        let pitch = self.pitch();
        let cols = self.cols;
        if north {
            let (border, rest) = self.data.split_at_mut(pitch);
            (&rest[HALO..HALO + cols], &mut border[HALO..HALO + cols])
        } else {
            let border_start = (self.rows + HALO) * pitch;
            let edge_start = self.rows * pitch;
            let (head, border) = self.data.split_at_mut(border_start);
            (
                &head[edge_start + HALO..edge_start + HALO + cols],
                &mut border[HALO..HALO + cols],
            )
        }
    }

    /// Zero every border cell, leaving the interior untouched.
    pub fn clear_border(&mut self) {
        let pitch = self.pitch();
        let last = self.padded_rows() - 1;
        self.padded_row_mut(0).fill(0);
        self.padded_row_mut(last).fill(0);
        for row in HALO..=self.rows {
            self.data[row * pitch] = 0;
            self.data[row * pitch + pitch - 1] = 0;
        }
    }

    /// Copy of the interior as a dense `rows x cols` buffer.
    #[must_use]
    pub fn interior(&self) -> Vec<Pixel> {
        (0..self.rows)
            .flat_map(|row| self.interior_row(row).iter().copied())
            .collect()
    }
}

/// A worker's unpadded result buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTile {
    rows: usize,
    cols: usize,
    data: Vec<Pixel>,
}

impl OutputTile {
    /// Allocate a zeroed `rows x cols` output.
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0; rows * cols],
        }
    }

    /// Allocate a zeroed output sized for `extent`.
    #[must_use]
    pub fn for_extent(extent: &TileExtent) -> Self {
        Self::new(extent.rows, extent.cols)
    }

    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// All values, row-major.
    #[must_use]
    pub fn as_slice(&self) -> &[Pixel] {
        &self.data
    }

    /// All values, row-major, mutable.
    pub fn as_mut_slice(&mut self) -> &mut [Pixel] {
        &mut self.data
    }

    /// Row `row` of the output.
    #[must_use]
    pub fn row(&self, row: usize) -> &[Pixel] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Value at `(row, col)`.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Pixel {
        self.data[row * self.cols + col]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(rows: usize, cols: usize) -> Tile {
        let mut tile = Tile::new(rows, cols);
        for row in 0..rows {
            for (col, cell) in tile.interior_row_mut(row).iter_mut().enumerate() {
                *cell = Pixel::try_from(row * 10 + col + 1).unwrap_or(Pixel::MAX);
            }
        }
        tile
    }

    #[test]
    fn new_tile_is_zeroed_and_padded() {
        let tile = Tile::new(3, 4);
        assert_eq!(tile.pitch(), 6);
        assert_eq!(tile.padded_rows(), 5);
        assert_eq!(tile.as_slice().len(), 30);
        assert!(tile.as_slice().iter().all(|&v| v == 0));
    }

    #[test]
    fn interior_rows_skip_the_border() {
        let tile = numbered(2, 3);
        assert_eq!(tile.interior_row(0), &[1, 2, 3]);
        assert_eq!(tile.interior_row(1), &[11, 12, 13]);
        assert_eq!(tile.get(1, 1), 1);
        assert_eq!(tile.get(0, 1), 0);
        assert_eq!(tile.padded_row(1), &[0, 1, 2, 3, 0]);
        assert_eq!(tile.interior(), vec![1, 2, 3, 11, 12, 13]);
    }

    #[test]
    fn north_halo_split_pairs_first_row_with_top_border() {
        let mut tile = numbered(3, 2);
        let (send, recv) = tile.row_halo_mut(true);
        assert_eq!(send, &[1, 2]);
        recv.copy_from_slice(&[90, 91]);
        assert_eq!(tile.padded_row(0), &[0, 90, 91, 0]);
    }

    #[test]
    fn south_halo_split_pairs_last_row_with_bottom_border() {
        let mut tile = numbered(3, 2);
        let (send, recv) = tile.row_halo_mut(false);
        assert_eq!(send, &[21, 22]);
        recv.copy_from_slice(&[80, 81]);
        assert_eq!(tile.padded_row(4), &[0, 80, 81, 0]);
    }

    #[test]
    fn single_row_tile_sends_the_same_row_both_ways() {
        let mut tile = numbered(1, 3);
        assert_eq!(tile.row_halo_mut(true).0, &[1, 2, 3]);
        assert_eq!(tile.row_halo_mut(false).0, &[1, 2, 3]);
    }

    #[test]
    fn clear_border_keeps_interior() {
        let mut tile = numbered(2, 2);
        for padded_row in 0..tile.padded_rows() {
            tile.set(padded_row, 0, 7);
            tile.set(padded_row, 3, 7);
        }
        tile.padded_row_mut(0).fill(5);
        tile.clear_border();
        assert_eq!(tile.padded_row(0), &[0, 0, 0, 0]);
        assert_eq!(tile.padded_row(1), &[0, 1, 2, 0]);
        assert_eq!(tile.padded_row(2), &[0, 11, 12, 0]);
        assert_eq!(tile.padded_row(3), &[0, 0, 0, 0]);
    }

    #[test]
    fn for_extent_matches_dimensions() {
        let extent = TileExtent {
            row_start: 4,
            col_start: 0,
            rows: 5,
            cols: 3,
        };
        let tile = Tile::for_extent(&extent);
        let out = OutputTile::for_extent(&extent);
        assert_eq!((tile.rows(), tile.cols()), (5, 3));
        assert_eq!((out.rows(), out.cols()), (5, 3));
        assert_eq!(out.as_slice().len(), 15);
    }

    #[test]
    fn output_rows_are_contiguous() {
        let mut out = OutputTile::new(2, 3);
        out.as_mut_slice().copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(out.row(1), &[4, 5, 6]);
        assert_eq!(out.get(0, 2), 3);
    }
}
