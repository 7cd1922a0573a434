//! # HydroGrid Algorithms
//!
//! Hydrological terrain analysis over [`hydrogrid_core::Grid`] elevation
//! models.
//!
//! ## Categories
//!
//! - **hydrology**: depression breaching (plain, constrained and
//!   stream-aware), depression filling, D8 and FD8 flow accumulation
//! - **terrain**: deviation/difference from mean, elevation percentile,
//!   maximum elevation deviation, hillshade, aspect, mean filter
//! - **structures**: the indexed priority queue, cell FIFOs and integral
//!   images the algorithms are built on

pub mod hydrology;
pub mod maybe_rayon;
pub mod structures;
pub mod terrain;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::hydrology::{
        breach_depressions, breach_streams, d8_flow_accumulation, fd8_flow_accumulation,
        fill_depressions, BreachOutcome, BreachParams, D8Outcome, D8Params, Fd8Params, FillParams,
    };
    pub use crate::structures::{
        CellQueue, ElevationScale, GridCell, IndexedPriorityQueue, IntegralImage, QueueGroup,
    };
    pub use crate::terrain::{
        aspect, deviation_from_mean, difference_from_mean, elevation_percentile, hillshade,
        max_elevation_deviation, mean_filter, HillshadeParams, MaxDeviationOutcome,
        MaxDeviationParams, MeanFilterParams, NeighbourhoodParams, PercentileParams,
    };
    pub use hydrogrid_core::prelude::*;
}
