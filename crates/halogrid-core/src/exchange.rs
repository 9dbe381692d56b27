//! Boundary exchange: fill each tile's border from its neighbours' edges.
//!
//! Two axes, in a fixed order:
//!
//! 1. **Rows.** With the north and then the south neighbour, one paired
//!    send/receive of the contiguous edge row (`cols` cells) into the
//!    matching border row.
//! 2. **Columns.** With the west and then the east neighbour, one paired
//!    send/receive per padded row (`rows + 2` transfers of one cell), since
//!    a column is not contiguous in the row-major tile. Walking the padded
//!    height carries the border rows received in step 1 along, which fills
//!    the four corner cells with the diagonal neighbours' pixels.
//!
//! A missing neighbour skips its direction and the border keeps whatever it
//! held, zero for a fresh tile. Every transfer is a
//! [`send_recv`](Communicator::send_recv) so both sides of a pair are
//! always in the same operation.

use crate::comm::{Communicator, Slice, SliceMut, Tag};
use crate::geometry::Neighbors;
use crate::tile::Tile;
use crate::types::{CommError, Direction, HALO, Pixel};

/// Run the full row-then-column exchange for one tile.
///
/// # Errors
///
/// Any [`CommError`] from the paired transfers; the tile border is then
/// partially updated and the run must be abandoned.
pub fn exchange<C: Communicator + ?Sized>(
    comm: &C,
    neighbors: &Neighbors,
    tile: &mut Tile,
) -> Result<(), CommError> {
    exchange_rows(comm, neighbors, tile)?;
    exchange_columns(comm, neighbors, tile)
}

fn exchange_rows<C: Communicator + ?Sized>(
    comm: &C,
    neighbors: &Neighbors,
    tile: &mut Tile,
) -> Result<(), CommError> {
    for direction in [Direction::North, Direction::South] {
        let Some(peer) = neighbors.get(direction) else {
            continue;
        };
        let (edge, border) = tile.row_halo_mut(direction == Direction::North);
        comm.send_recv(
            peer,
            Tag::halo(direction),
            edge.into(),
            Tag::halo(direction.opposite()),
            border.into(),
        )?;
    }
    Ok(())
}

fn exchange_columns<C: Communicator + ?Sized>(
    comm: &C,
    neighbors: &Neighbors,
    tile: &mut Tile,
) -> Result<(), CommError> {
    let cols = tile.cols();
    for (direction, edge_col, border_col) in [
        (Direction::West, HALO, 0),
        (Direction::East, cols, cols + HALO),
    ] {
        let Some(peer) = neighbors.get(direction) else {
            continue;
        };
        for padded_row in 0..tile.padded_rows() {
            let outgoing: [Pixel; 1] = [tile.get(padded_row, edge_col)];
            let mut incoming: [Pixel; 1] = [0];
            comm.send_recv(
                peer,
                Tag::halo(direction),
                Slice::Pixels(&outgoing),
                Tag::halo(direction.opposite()),
                SliceMut::Pixels(&mut incoming),
            )?;
            tile.set(padded_row, border_col, incoming[0]);
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::comm::{Payload, SingleRank};
    use crate::geometry::GridGeometry;
    use crate::types::Rank;

    /// Records every send and answers every receive with `peer * 100`,
    /// checking the tag against what the peer would have used.
    struct Scripted {
        rank: Rank,
        sent: RefCell<Vec<(Rank, Tag, Payload)>>,
    }

    impl Scripted {
        fn new(rank: Rank) -> Self {
            Self {
                rank,
                sent: RefCell::new(Vec::new()),
            }
        }
    }

    impl Communicator for Scripted {
        fn rank(&self) -> Rank {
            self.rank
        }

        fn size(&self) -> usize {
            9
        }

        fn send(&self, to: Rank, tag: Tag, data: Slice<'_>) -> Result<(), CommError> {
            self.sent.borrow_mut().push((to, tag, data.into()));
            Ok(())
        }

        fn recv(&self, from: Rank, tag: Tag, buf: SliceMut<'_>) -> Result<(), CommError> {
            let SliceMut::Pixels(buf) = buf else {
                return Err(CommError::TypeMismatch { peer: from });
            };
            // The peer sends towards us, so its tag names the direction
            // from it to us.
            let expected_from_rank_delta = match tag {
                t if t == Tag::halo(Direction::South) => -3,
                t if t == Tag::halo(Direction::North) => 3,
                t if t == Tag::halo(Direction::East) => -1,
                t if t == Tag::halo(Direction::West) => 1,
                _ => 0,
            };
            let delta = i64::try_from(from).unwrap() - i64::try_from(self.rank).unwrap();
            assert_eq!(delta, expected_from_rank_delta, "tag {tag:?} from {from}");
            buf.fill(Pixel::try_from(from * 100).unwrap());
            Ok(())
        }
    }

    fn numbered_tile(rows: usize, cols: usize) -> Tile {
        let mut tile = Tile::new(rows, cols);
        for row in 0..rows {
            for (col, cell) in tile.interior_row_mut(row).iter_mut().enumerate() {
                *cell = Pixel::try_from(row * 10 + col + 1).unwrap();
            }
        }
        tile
    }

    #[test]
    fn centre_tile_receives_all_four_borders_and_corners() {
        // 3x3 grid of 3x3 tiles; rank 4 is in the middle.
        let geometry = GridGeometry::resolve(9, 9).unwrap();
        let comm = Scripted::new(4);
        let mut tile = numbered_tile(3, 3);
        exchange(&comm, &geometry.neighbors(4), &mut tile).unwrap();

        // North border from rank 1, corners from the west (3) and east (5)
        // column transfers.
        assert_eq!(tile.padded_row(0), &[300, 100, 100, 100, 500]);
        assert_eq!(tile.padded_row(1), &[300, 1, 2, 3, 500]);
        assert_eq!(tile.padded_row(4), &[300, 700, 700, 700, 500]);
        assert_eq!(tile.interior(), numbered_tile(3, 3).interior());
    }

    #[test]
    fn column_transfers_carry_row_borders() {
        let geometry = GridGeometry::resolve(9, 9).unwrap();
        let comm = Scripted::new(4);
        let mut tile = numbered_tile(3, 3);
        exchange(&comm, &geometry.neighbors(4), &mut tile).unwrap();

        let sent = comm.sent.borrow();
        // 2 row transfers plus 5 padded rows to each side.
        assert_eq!(sent.len(), 2 + 2 * 5);
        assert_eq!(sent[0], (1, Tag::halo(Direction::North), Payload::Pixels(vec![1, 2, 3])));
        assert_eq!(sent[1], (7, Tag::halo(Direction::South), Payload::Pixels(vec![21, 22, 23])));

        let west: Vec<_> = sent[2..7].iter().map(|(to, _, p)| (*to, p.clone())).collect();
        assert_eq!(
            west,
            vec![
                (3, Payload::Pixels(vec![100])),
                (3, Payload::Pixels(vec![1])),
                (3, Payload::Pixels(vec![11])),
                (3, Payload::Pixels(vec![21])),
                (3, Payload::Pixels(vec![700])),
            ]
        );
        assert!(sent[7..].iter().all(|(to, tag, _)| *to == 5 && *tag == Tag::halo(Direction::East)));
    }

    #[test]
    fn missing_neighbours_are_skipped() {
        let geometry = GridGeometry::resolve(1, 4).unwrap();
        let mut tile = numbered_tile(4, 4);
        tile.set(0, 0, 42);
        exchange(&SingleRank, &geometry.neighbors(0), &mut tile).unwrap();
        // Border keeps its last value.
        assert_eq!(tile.get(0, 0), 42);
        assert_eq!(tile.get(5, 5), 0);
    }

    #[test]
    fn corner_tile_only_talks_to_two_neighbours() {
        let geometry = GridGeometry::resolve(9, 9).unwrap();
        let comm = Scripted::new(0);
        let mut tile = numbered_tile(3, 3);
        exchange(&comm, &geometry.neighbors(0), &mut tile).unwrap();
        let peers: Vec<Rank> = comm.sent.borrow().iter().map(|(to, _, _)| *to).collect();
        assert_eq!(peers, vec![3, 1, 1, 1, 1, 1]);
        // No north or west neighbour: only the east column reaches row 0.
        assert_eq!(tile.padded_row(0), &[0, 0, 0, 0, 100]);
        assert_eq!(tile.padded_row(4), &[0, 300, 300, 300, 100]);
    }
}
