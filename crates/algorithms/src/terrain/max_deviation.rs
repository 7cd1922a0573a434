//! Maximum elevation deviation across scales
//!
//! Sweeps the deviation-from-mean statistic over a range of window radii
//! and keeps, per cell, the deviation of largest magnitude together with
//! the radius it occurred at (signed by the deviation's direction). One
//! integral image serves every scale; each radius pass is row-partitioned
//! across the worker pool.

use hydrogrid_core::{Error, Grid, ProgressReporter, Result};

use crate::maybe_rayon::*;
use crate::structures::IntegralImage;

/// Scale range for the maximum-deviation sweep
#[derive(Debug, Clone)]
pub struct MaxDeviationParams {
    /// Smallest window radius, in cells.
    pub min_radius: usize,
    /// Largest window radius, in cells.
    pub max_radius: usize,
    /// Radius increment between passes.
    pub step: usize,
}

impl Default for MaxDeviationParams {
    fn default() -> Self {
        Self {
            min_radius: 1,
            max_radius: 3,
            step: 1,
        }
    }
}

/// Result pair of the multi-scale sweep
#[derive(Debug)]
pub struct MaxDeviationOutcome {
    /// Largest absolute deviation per cell
    pub magnitude: Grid,
    /// Radius at which it occurred, negative where the deviation was
    /// negative
    pub scale: Grid,
}

/// Find each cell's maximum deviation from the mean across scales.
pub fn max_elevation_deviation(
    dem: &Grid,
    params: &MaxDeviationParams,
    progress: &ProgressReporter,
) -> Result<MaxDeviationOutcome> {
    if params.min_radius == 0 || params.min_radius > params.max_radius || params.step == 0 {
        return Err(Error::InvalidArgument {
            name: "radius range",
            value: format!(
                "{}..{} step {}",
                params.min_radius, params.max_radius, params.step
            ),
            reason: "radii must be positive, ordered and stepped".to_string(),
        });
    }

    let (rows, columns) = dem.shape();
    let nodata = dem.nodata();
    let integral = IntegralImage::new(dem);
    let k = integral.offset();

    let mut max_value = vec![-f64::MAX; rows * columns];
    let mut scale_value = vec![0isize; rows * columns];

    let radii: Vec<usize> = (params.min_radius..=params.max_radius)
        .step_by(params.step)
        .collect();
    let num_passes = radii.len();

    for (pass, &radius) in radii.iter().enumerate() {
        progress.checkpoint()?;
        max_value
            .par_chunks_mut(columns)
            .zip(scale_value.par_chunks_mut(columns))
            .enumerate()
            .for_each(|(row, (max_row, scale_row))| {
                if progress.is_cancelled() {
                    return;
                }
                for col in 0..columns {
                    let z = dem.value(row as isize, col as isize);
                    if dem.is_nodata(z) {
                        continue;
                    }
                    let stats = integral.box_stats(row, col, radius);
                    if stats.n <= 0 {
                        continue;
                    }
                    let variance = stats.variance();
                    if variance <= 0.0 {
                        continue;
                    }
                    let deviation = ((z - k) - stats.mean()) / variance.sqrt();
                    if deviation.abs() > max_row[col] {
                        max_row[col] = deviation.abs();
                        scale_row[col] = if deviation >= 0.0 {
                            radius as isize
                        } else {
                            -(radius as isize)
                        };
                    }
                }
            });
        progress.update(pass + 1, num_passes);
    }
    progress.checkpoint()?;

    // the magnitude is unsigned; the deviation's sign rides on the scale
    let mut magnitude = dem.like(nodata);
    let mut scale = dem.like(nodata);
    {
        let mag = magnitude.data_mut();
        let sc = scale.data_mut();
        for row in 0..rows {
            for col in 0..columns {
                let idx = row * columns + col;
                if max_value[idx] > -f64::MAX {
                    mag[(row, col)] = max_value[idx];
                    sc[(row, col)] = scale_value[idx] as f64;
                }
            }
        }
    }

    Ok(MaxDeviationOutcome { magnitude, scale })
}
