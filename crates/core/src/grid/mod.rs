//! Grid data structures and metadata

mod config;
#[allow(clippy::module_inception)]
mod grid;

pub use config::{DataKind, DataScale, Endianness, RasterConfig};
pub use grid::{Envelope, Grid};

/// D8 neighbour displacements, clockwise from the north-east neighbour.
///
/// `DX[n]`/`DY[n]` give the column/row offset of neighbour `n`; direction
/// codes stored in pointer grids are `n + 1`, 0 meaning "no direction".
pub const DX: [isize; 8] = [1, 1, 1, 0, -1, -1, -1, 0];
pub const DY: [isize; 8] = [-1, 0, 1, 1, 1, 0, -1, -1];

/// Backlink codes: `BACKLINK[n]` is the 1-based direction from neighbour `n`
/// back to the centre cell.
pub const BACKLINK: [u8; 8] = [5, 6, 7, 8, 1, 2, 3, 4];
