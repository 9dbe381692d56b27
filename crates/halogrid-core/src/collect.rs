//! Collector: gather every worker's output tile back into the
//! coordinator's image.
//!
//! The inverse of [`distribute`](crate::distribute()). Each worker sends its
//! output row by row; the coordinator takes the workers in rank order and
//! overwrites the matching sub-region of the image in place.

use tracing::debug;

use crate::comm::{Communicator, Tag};
use crate::geometry::GridGeometry;
use crate::raster::GlobalImage;
use crate::tile::OutputTile;
use crate::types::{COORDINATOR, RunError};

/// Send this rank's output to the coordinator, or on the coordinator,
/// assemble every worker's output into `image`.
///
/// # Errors
///
/// [`RunError::MissingImage`] or [`RunError::ImageGeometryMismatch`] on the
/// coordinator, or any [`CommError`](crate::CommError) from the transfers.
pub fn collect<C: Communicator + ?Sized>(
    comm: &C,
    geometry: &GridGeometry,
    out: &OutputTile,
    image: Option<&mut GlobalImage>,
) -> Result<(), RunError> {
    if comm.rank() != COORDINATOR {
        for row in 0..out.rows() {
            comm.send(COORDINATOR, Tag::COLLECT, out.row(row).into())?;
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
        image.tile_row_mut(&own, row).copy_from_slice(out.row(row));
    }

    for worker in geometry.ranks().skip(1) {
        let extent = geometry.extent(worker);
        debug!(worker, rows = extent.rows, cols = extent.cols, "receiving tile");
        for row in 0..extent.rows {
            comm.recv(worker, Tag::COLLECT, image.tile_row_mut(&extent, row).into())?;
        }
    }
    Ok(())
}
