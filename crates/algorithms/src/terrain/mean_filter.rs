//! Mean filter with independent X and Y dimensions
//!
//! Plain nodata-aware moving average. Filter dimensions are given as full
//! window sizes (odd numbers centre cleanly; even sizes lean one cell
//! toward the origin, matching the half-size truncation).

use hydrogrid_core::{Error, Grid, ProgressReporter, Result};
use ndarray::Array2;

use crate::maybe_rayon::*;

/// Filter window dimensions, in cells
#[derive(Debug, Clone)]
pub struct MeanFilterParams {
    pub size_x: usize,
    pub size_y: usize,
}

impl Default for MeanFilterParams {
    fn default() -> Self {
        Self {
            size_x: 3,
            size_y: 3,
        }
    }
}

/// Smooth a raster with a rectangular mean filter.
pub fn mean_filter(
    dem: &Grid,
    params: &MeanFilterParams,
    progress: &ProgressReporter,
) -> Result<Grid> {
    if params.size_x == 0 || params.size_y == 0 {
        return Err(Error::InvalidArgument {
            name: "filter size",
            value: format!("{}x{}", params.size_x, params.size_y),
            reason: "both filter dimensions must be positive".to_string(),
        });
    }

    let (rows, columns) = dem.shape();
    let nodata = dem.nodata();
    let half_x = (params.size_x / 2) as isize;
    let half_y = (params.size_y / 2) as isize;

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
                let mut total = 0.0;
                let mut count = 0usize;
                for dy in -half_y..=half_y {
                    for dx in -half_x..=half_x {
                        let zn = dem.value(row as isize + dy, col as isize + dx);
                        if !dem.is_nodata(zn) {
                            total += zn;
                            count += 1;
                        }
                    }
                }
                if count > 0 {
                    *out = total / count as f64;
                }
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
    fn test_constant_is_unchanged() {
        let dem = grid_from(&[5.0; 25], 5, 5);
        let out = mean_filter(&dem, &MeanFilterParams::default(), &ProgressReporter::silent())
            .unwrap();
        for r in 0..5 {
            for c in 0..5 {
                assert_eq!(out.value(r, c), 5.0);
            }
        }
    }

    #[test]
    fn test_averages_window() {
        let mut dem = grid_from(&[0.0; 9], 3, 3);
        dem.set_value(1, 1, 9.0);
        let out = mean_filter(&dem, &MeanFilterParams::default(), &ProgressReporter::silent())
            .unwrap();
        // centre window holds all nine cells
        assert!((out.value(1, 1) - 1.0).abs() < 1e-12);
        // corner window holds four cells, one of them the spike
        assert!((out.value(0, 0) - 9.0 / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_rectangular_window() {
        // a 1x3 (x by y) filter averages vertically only
        let dem = grid_from(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0], 3, 3);
        let params = MeanFilterParams {
            size_x: 1,
            size_y: 3,
        };
        let out = mean_filter(&dem, &params, &ProgressReporter::silent()).unwrap();
        // column mean of 2, 5, 8 at the centre
        assert!((out.value(1, 1) - 5.0).abs() < 1e-12);
        assert!((out.value(1, 0) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_nodata_excluded_from_mean() {
        let mut dem = grid_from(&[4.0; 9], 3, 3);
        dem.set_value(0, 0, -9999.0);
        let out = mean_filter(&dem, &MeanFilterParams::default(), &ProgressReporter::silent())
            .unwrap();
        assert_eq!(out.value(1, 1), 4.0);
        assert!(out.is_nodata(out.value(0, 0)));
    }
}
