//! Data structures shared by the analysis algorithms

mod integral;
mod priority_queue;
mod queue;

pub use integral::{BoxStats, IntegralImage};
pub use priority_queue::{ElevationScale, GridCell, IndexedPriorityQueue};
pub use queue::{CellQueue, QueueGroup};

pub(crate) use integral::clamp_span;
