//! Hillshade and aspect
//!
//! Both derive the surface gradient with Horn's third-order finite
//! difference over the eight neighbours; nodata neighbours fall back to
//! the centre elevation. Rows are partitioned across the worker pool.

use hydrogrid_core::grid::{DX, DY};
use hydrogrid_core::{Error, Grid, ProgressReporter, Result};
use ndarray::Array2;

use crate::maybe_rayon::*;

/// Parameters for hillshading
#[derive(Debug, Clone)]
pub struct HillshadeParams {
    /// Sun azimuth, degrees clockwise from north.
    pub azimuth: f64,
    /// Sun altitude above the horizon, degrees.
    pub altitude: f64,
    /// Vertical exaggeration applied before the gradient.
    pub z_factor: f64,
}

impl Default for HillshadeParams {
    fn default() -> Self {
        Self {
            azimuth: 315.0,
            altitude: 30.0,
            z_factor: 1.0,
        }
    }
}

/// Gradient of the 3x3 window around `(row, col)`, nodata-padded.
#[inline]
fn gradient(dem: &Grid, row: isize, col: isize, z: f64, z_factor: f64, grid_res8: f64) -> (f64, f64) {
    let mut n = [0.0f64; 8];
    for (i, v) in n.iter_mut().enumerate() {
        let zn = dem.value(row + DY[i], col + DX[i]);
        *v = if dem.is_nodata(zn) { z } else { zn * z_factor };
    }
    let fy = (n[6] - n[4] + 2.0 * (n[7] - n[3]) + n[0] - n[2]) / grid_res8;
    let fx = (n[2] - n[4] + 2.0 * (n[1] - n[5]) + n[0] - n[6]) / grid_res8;
    (fx, fy)
}

/// Compute a 0..255 hillshade of the DEM.
pub fn hillshade(
    dem: &Grid,
    params: &HillshadeParams,
    progress: &ProgressReporter,
) -> Result<Grid> {
    let (rows, columns) = dem.shape();
    let nodata = dem.nodata();
    let azimuth = (params.azimuth - 90.0).to_radians();
    let altitude = params.altitude.to_radians();
    let sin_theta = altitude.sin();
    let cos_theta = altitude.cos();
    let grid_res8 = 8.0 * (dem.cell_size_x() + dem.cell_size_y()) / 2.0;

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
                let (fx, fy) = gradient(
                    dem,
                    row as isize,
                    col as isize,
                    z * params.z_factor,
                    params.z_factor,
                    grid_res8,
                );
                let shade = if fx != 0.0 {
                    let tan_slope = (fx * fx + fy * fy).sqrt();
                    let aspect =
                        (180.0 - (fy / fx).atan().to_degrees() + 90.0 * (fx / fx.abs()))
                            .to_radians();
                    let term1 = tan_slope / (1.0 + tan_slope * tan_slope).sqrt();
                    let term2 = sin_theta / tan_slope;
                    let term3 = cos_theta * (azimuth - aspect).sin();
                    term1 * (term2 - term3)
                } else {
                    0.5
                };
                *out = (shade * 255.0).floor().max(0.0);
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

/// Compute the aspect in degrees clockwise from north; flat cells get -1.
pub fn aspect(dem: &Grid, z_factor: f64, progress: &ProgressReporter) -> Result<Grid> {
    let (rows, columns) = dem.shape();
    let nodata = dem.nodata();
    let grid_res8 = 8.0 * (dem.cell_size_x() + dem.cell_size_y()) / 2.0;

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
                let (fx, fy) = gradient(
                    dem,
                    row as isize,
                    col as isize,
                    z * z_factor,
                    z_factor,
                    grid_res8,
                );
                *out = if fx != 0.0 {
                    180.0 - (fy / fx).atan().to_degrees() + 90.0 * (fx / fx.abs())
                } else {
                    -1.0
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

    fn west_facing_slope() -> Grid {
        // rises to the east: the west-facing side is lit by a western sun
        let mut values = Vec::new();
        for _ in 0..9 {
            for col in 0..9 {
                values.push(col as f64 * 2.0);
            }
        }
        grid_from(&values, 9, 9)
    }

    #[test]
    fn test_hillshade_range() {
        let dem = west_facing_slope();
        let shade =
            hillshade(&dem, &HillshadeParams::default(), &ProgressReporter::silent()).unwrap();
        for r in 0..9 {
            for c in 0..9 {
                let v = shade.value(r, c);
                assert!((0.0..=255.0).contains(&v), "shade out of range: {v}");
                assert_eq!(v, v.floor(), "shade values are whole numbers");
            }
        }
    }

    #[test]
    fn test_hillshade_illumination_direction() {
        let dem = west_facing_slope();
        // a sun due west lights the west-facing slope more than one due east
        let west_sun = hillshade(
            &dem,
            &HillshadeParams {
                azimuth: 270.0,
                ..Default::default()
            },
            &ProgressReporter::silent(),
        )
        .unwrap();
        let east_sun = hillshade(
            &dem,
            &HillshadeParams {
                azimuth: 90.0,
                ..Default::default()
            },
            &ProgressReporter::silent(),
        )
        .unwrap();
        assert!(west_sun.value(4, 4) > east_sun.value(4, 4));
    }

    #[test]
    fn test_aspect_cardinal_directions() {
        let dem = west_facing_slope();
        let out = aspect(&dem, 1.0, &ProgressReporter::silent()).unwrap();
        // surface dips to the west: aspect 270 degrees
        assert!(
            (out.value(4, 4) - 270.0).abs() < 1e-6,
            "expected west aspect, got {}",
            out.value(4, 4)
        );

        // east-dipping surface
        let mut values = Vec::new();
        for _ in 0..9 {
            for col in 0..9 {
                values.push(-(col as f64) * 2.0);
            }
        }
        let east = grid_from(&values, 9, 9);
        let out = aspect(&east, 1.0, &ProgressReporter::silent()).unwrap();
        assert!(
            (out.value(4, 4) - 90.0).abs() < 1e-6,
            "expected east aspect, got {}",
            out.value(4, 4)
        );
    }

    #[test]
    fn test_aspect_flat_is_negative_one() {
        let dem = grid_from(&[7.0; 25], 5, 5);
        let out = aspect(&dem, 1.0, &ProgressReporter::silent()).unwrap();
        assert_eq!(out.value(2, 2), -1.0);
    }
}
