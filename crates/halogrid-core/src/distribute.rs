//! Distributor: scatter the coordinator's image into every worker's tile.
//!
//! The coordinator walks the workers in rank order and sends each one its
//! sub-region row by row, `local_rows` messages of `local_cols` pixels. Its
//! own sub-region is a local copy. The caller runs a barrier afterwards.

use tracing::debug;

use crate::comm::{Communicator, Tag};
use crate::geometry::GridGeometry;
use crate::raster::GlobalImage;
use crate::tile::Tile;
use crate::types::{COORDINATOR, RunError};

/// Fill this rank's tile interior from the coordinator's image.
///
/// `image` is required on the coordinator and ignored elsewhere. Border
/// cells are not touched.
///
/// # Errors
///
/// [`RunError::MissingImage`] or [`RunError::ImageGeometryMismatch`] on the
/// coordinator, or any [`CommError`](crate::CommError) from the transfers.
pub fn distribute<C: Communicator + ?Sized>(
    comm: &C,
    geometry: &GridGeometry,
    image: Option<&GlobalImage>,
    tile: &mut Tile,
) -> Result<(), RunError> {
    let rank = comm.rank();
    if rank != COORDINATOR {
        for row in 0..tile.rows() {
            comm.recv(COORDINATOR, Tag::DISTRIBUTE, tile.interior_row_mut(row).into())?;
        }
        return Ok(());
    }

    let image = image.ok_or(RunError::MissingImage)?;
    if image.size() != geometry.size() {
        return Err(RunError::ImageGeometryMismatch {
            expected: geometry.size(),
            found: image.size(),
        });
    }

    let own = geometry.extent(COORDINATOR);
    for row in 0..own.rows {
        tile.interior_row_mut(row)
            .copy_from_slice(image.tile_row(&own, row));
    }

    for worker in geometry.ranks().skip(1) {
        let extent = geometry.extent(worker);
        debug!(worker, rows = extent.rows, cols = extent.cols, "sending tile");
        for row in 0..extent.rows {
            comm.send(worker, Tag::DISTRIBUTE, image.tile_row(&extent, row).into())?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::comm::SingleRank;

    #[test]
    fn single_rank_copies_whole_image() {
        let geometry = GridGeometry::resolve(1, 5).unwrap();
        let image = GlobalImage::test_pattern(5);
        let mut tile = Tile::for_extent(&geometry.extent(0));
        distribute(&SingleRank, &geometry, Some(&image), &mut tile).unwrap();
        assert_eq!(tile.interior(), image.as_slice());
        assert_eq!(tile.padded_row(0), &[0; 7]);
    }

    #[test]
    fn coordinator_needs_an_image() {
        let geometry = GridGeometry::resolve(1, 4).unwrap();
        let mut tile = Tile::for_extent(&geometry.extent(0));
        let err = distribute(&SingleRank, &geometry, None, &mut tile).unwrap_err();
        assert!(matches!(err, RunError::MissingImage));
    }

    #[test]
    fn image_size_must_match_geometry() {
        let geometry = GridGeometry::resolve(1, 4).unwrap();
        let image = GlobalImage::zeros(6);
        let mut tile = Tile::for_extent(&geometry.extent(0));
        let err = distribute(&SingleRank, &geometry, Some(&image), &mut tile).unwrap_err();
        assert!(matches!(
            err,
            RunError::ImageGeometryMismatch {
                expected: 4,
                found: 6
            }
        ));
    }
}
