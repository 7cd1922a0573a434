//! Neighbourhood-based terrain statistics
//!
//! All the mean-based statistics share the integral-image machinery in
//! [`crate::structures`]; each cell costs a constant number of table
//! lookups regardless of window size.

mod deviation;
mod hillshade;
mod max_deviation;
mod mean_filter;
mod percentile;

pub use deviation::{deviation_from_mean, difference_from_mean, NeighbourhoodParams};
pub use hillshade::{aspect, hillshade, HillshadeParams};
pub use max_deviation::{max_elevation_deviation, MaxDeviationOutcome, MaxDeviationParams};
pub use mean_filter::{mean_filter, MeanFilterParams};
pub use percentile::{elevation_percentile, PercentileParams};
