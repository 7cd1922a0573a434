//! Deviation and difference from mean elevation
//!
//! Both statistics share one integral-image pass; every cell then costs a
//! constant four table lookups regardless of the window radius.
//!
//! - deviation: `(z - mean) / stdev` of the neighbourhood, a
//!   scale-independent topographic position measure
//! - difference: `z - mean`, in elevation units

use hydrogrid_core::{Error, Grid, ProgressReporter, Result};
use ndarray::Array2;

use crate::maybe_rayon::*;
use crate::structures::IntegralImage;

/// Window radius for the mean-based statistics
#[derive(Debug, Clone)]
pub struct NeighbourhoodParams {
    /// Radius in cells; the window spans `2 * radius + 1`.
    pub radius: usize,
}

impl Default for NeighbourhoodParams {
    fn default() -> Self {
        Self { radius: 10 }
    }
}

/// Deviation from mean elevation: `(z - mean) / stdev` over the window.
///
/// Cells whose window has no valid neighbours or no spread emit 0.
pub fn deviation_from_mean(
    dem: &Grid,
    params: &NeighbourhoodParams,
    progress: &ProgressReporter,
) -> Result<Grid> {
    mean_statistic(dem, params, progress, |z_offset, stats| {
        let variance = stats.variance();
        if variance > 0.0 {
            (z_offset - stats.mean()) / variance.sqrt()
        } else {
            0.0
        }
    })
}

/// Difference from mean elevation: `z - mean` over the window.
pub fn difference_from_mean(
    dem: &Grid,
    params: &NeighbourhoodParams,
    progress: &ProgressReporter,
) -> Result<Grid> {
    mean_statistic(dem, params, progress, |z_offset, stats| {
        z_offset - stats.mean()
    })
}

fn mean_statistic<F>(
    dem: &Grid,
    params: &NeighbourhoodParams,
    progress: &ProgressReporter,
    statistic: F,
) -> Result<Grid>
where
    F: Fn(f64, crate::structures::BoxStats) -> f64 + Sync,
{
    if params.radius == 0 {
        return Err(Error::InvalidArgument {
            name: "radius",
            value: "0".to_string(),
            reason: "the window must include at least one neighbour".to_string(),
        });
    }

    let (rows, columns) = dem.shape();
    let nodata = dem.nodata();
    let integral = IntegralImage::new(dem);
    let k = integral.offset();
    let radius = params.radius;

    let output_data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![nodata; columns];
            if progress.is_cancelled() {
                return row_data;
            }
            for (col, out) in row_data.iter_mut().enumerate() {
                let z = dem.value(row as isize, col as isize);
                if dem.is_nodata(z) {
                    continue;
                }
                let stats = integral.box_stats(row, col, radius);
                *out = if stats.n > 0 {
                    statistic(z - k, stats)
                } else {
                    0.0
                };
            }
            progress.update(row + 1, rows);
            row_data
        })
        .collect();
    progress.checkpoint()?;

    let mut output = dem.like(nodata);
    *output.data_mut() = Array2::from_shape_vec((rows, columns), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::breach::tests::grid_from;

    #[test]
    fn test_deviation_zero_on_linear_ramp() {
        // z = 2x + 3y + 7: symmetric windows centre on their own mean
        let mut values = Vec::new();
        for row in 0..15 {
            for col in 0..15 {
                values.push(2.0 * col as f64 + 3.0 * row as f64 + 7.0);
            }
        }
        let dem = grid_from(&values, 15, 15);
        let params = NeighbourhoodParams { radius: 3 };
        let dev = deviation_from_mean(&dem, &params, &ProgressReporter::silent()).unwrap();

        // wherever the box lies fully inside the grid the deviation is 0
        for row in 4..11 {
            for col in 4..11 {
                assert!(
                    dev.value(row, col).abs() < 1e-9,
                    "ramp deviation at ({row},{col}) = {}",
                    dev.value(row, col)
                );
            }
        }
    }

    #[test]
    fn test_deviation_sign() {
        let mut values = vec![10.0; 121];
        values[5 * 11 + 5] = 50.0; // peak
        let dem = grid_from(&values, 11, 11);
        let params = NeighbourhoodParams { radius: 2 };
        let dev = deviation_from_mean(&dem, &params, &ProgressReporter::silent()).unwrap();

        assert!(dev.value(5, 5) > 0.0, "peak must deviate positively");
        // a neighbour of the peak sits below its window mean
        assert!(dev.value(5, 6) < 0.0);
    }

    #[test]
    fn test_deviation_scale_independent() {
        let mut values = Vec::new();
        for row in 0..11 {
            for col in 0..11 {
                let x = col as f64 - 5.0;
                let y = row as f64 - 5.0;
                values.push(100.0 - x * x - y * y);
            }
        }
        let dem1 = grid_from(&values, 11, 11);
        let dem2 = grid_from(
            &values.iter().map(|v| v * 10.0).collect::<Vec<_>>(),
            11,
            11,
        );
        let params = NeighbourhoodParams { radius: 2 };
        let d1 = deviation_from_mean(&dem1, &params, &ProgressReporter::silent()).unwrap();
        let d2 = deviation_from_mean(&dem2, &params, &ProgressReporter::silent()).unwrap();

        assert!(
            (d1.value(5, 5) - d2.value(5, 5)).abs() < 1e-6,
            "vertical exaggeration changed the deviation: {} vs {}",
            d1.value(5, 5),
            d2.value(5, 5)
        );
    }

    #[test]
    fn test_deviation_flat_surface_is_zero() {
        let dem = grid_from(&vec![100.0; 100], 10, 10);
        let dev = deviation_from_mean(
            &dem,
            &NeighbourhoodParams { radius: 2 },
            &ProgressReporter::silent(),
        )
        .unwrap();
        // variance 0 recovers locally as 0
        assert_eq!(dev.value(5, 5), 0.0);
    }

    #[test]
    fn test_difference_in_elevation_units() {
        let mut values = vec![10.0; 49];
        values[3 * 7 + 3] = 17.0;
        let dem = grid_from(&values, 7, 7);
        let diff = difference_from_mean(
            &dem,
            &NeighbourhoodParams { radius: 1 },
            &ProgressReporter::silent(),
        )
        .unwrap();

        // window mean at the peak is (8*10 + 17)/9, difference ~6.22
        let expected = 17.0 - (8.0 * 10.0 + 17.0) / 9.0;
        assert!((diff.value(3, 3) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_nodata_propagates() {
        let mut dem = grid_from(&vec![5.0; 25], 5, 5);
        dem.set_value(2, 2, -9999.0);
        let dev = deviation_from_mean(
            &dem,
            &NeighbourhoodParams { radius: 1 },
            &ProgressReporter::silent(),
        )
        .unwrap();
        assert!(dev.is_nodata(dev.value(2, 2)));
        assert!(!dev.is_nodata(dev.value(1, 1)));
    }

    #[test]
    fn test_zero_radius_rejected() {
        let dem = grid_from(&[1.0, 2.0, 3.0, 4.0], 2, 2);
        assert!(matches!(
            deviation_from_mean(
                &dem,
                &NeighbourhoodParams { radius: 0 },
                &ProgressReporter::silent()
            ),
            Err(Error::InvalidArgument { .. })
        ));
    }
}
