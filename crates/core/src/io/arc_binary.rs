//! ArcGIS binary grid (`.flt` payload + `.hdr` header)
//!
//! The header is ASCII key/value (`NCOLS`, `NROWS`, `XLLCORNER`/`XLLCENTER`,
//! `YLLCORNER`/`YLLCENTER`, `CELLSIZE`, `NODATA_VALUE`, `BYTEORDER`); the
//! payload is row-major float32 in the declared byte order.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::grid::{DataKind, Endianness, Envelope, Grid, RasterConfig};

use super::{last_token, malformed, read_header_lines};

pub fn read(path: &Path) -> Result<(Grid, RasterConfig)> {
    let header_path = path.with_extension("hdr");
    let data_path = path.with_extension("flt");
    if !header_path.exists() {
        return Err(Error::FileDoesNotExist(header_path));
    }
    if !data_path.exists() {
        return Err(Error::FileDoesNotExist(data_path));
    }

    let lines = read_header_lines(&header_path)?;

    let mut columns: Option<usize> = None;
    let mut rows: Option<usize> = None;
    let mut cellsize: Option<f64> = None;
    let mut nodata = -9999.0;
    let mut xll: Option<(f64, bool)> = None;
    let mut yll: Option<(f64, bool)> = None;
    let mut byte_order = Endianness::Little;

    for (idx, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let lower = line.to_ascii_lowercase();
        let value = last_token(line);
        let parse_f64 = |keyword: &str| -> Result<f64> {
            value
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| malformed(&header_path, idx + 1, keyword))
        };

        if lower.starts_with("ncols") {
            columns = Some(parse_f64("ncols")? as usize);
        } else if lower.starts_with("nrows") {
            rows = Some(parse_f64("nrows")? as usize);
        } else if lower.starts_with("xllcenter") {
            xll = Some((parse_f64("xllcenter")?, true));
        } else if lower.starts_with("xllcorner") {
            xll = Some((parse_f64("xllcorner")?, false));
        } else if lower.starts_with("yllcenter") {
            yll = Some((parse_f64("yllcenter")?, true));
        } else if lower.starts_with("yllcorner") {
            yll = Some((parse_f64("yllcorner")?, false));
        } else if lower.starts_with("cellsize") {
            cellsize = Some(parse_f64("cellsize")?);
        } else if lower.starts_with("nodata") {
            nodata = parse_f64("nodata_value")?;
        } else if lower.starts_with("byteorder") {
            let v = value.unwrap_or("").to_ascii_uppercase();
            byte_order = if v.contains("MSB") {
                Endianness::Big
            } else {
                Endianness::Little
            };
        }
    }

    let columns = columns.ok_or_else(|| malformed(&header_path, 0, "ncols"))?;
    let rows = rows.ok_or_else(|| malformed(&header_path, 0, "nrows"))?;
    let cellsize = cellsize.ok_or_else(|| malformed(&header_path, 0, "cellsize"))?;
    let (xll, x_centre) = xll.ok_or_else(|| malformed(&header_path, 0, "xllcorner"))?;
    let (yll, y_centre) = yll.ok_or_else(|| malformed(&header_path, 0, "yllcorner"))?;

    let bytes = fs::read(&data_path).map_err(|e| Error::ReadError {
        path: data_path.clone(),
        reason: e.to_string(),
    })?;
    let num_cells = rows * columns;
    if bytes.len() < num_cells * 4 {
        return Err(Error::ReadError {
            path: data_path,
            reason: format!(
                "payload holds {} bytes, {} cells need {}",
                bytes.len(),
                num_cells,
                num_cells * 4
            ),
        });
    }

    let mut values = vec![0.0f32; num_cells];
    match byte_order {
        Endianness::Little => LittleEndian::read_f32_into(&bytes[..num_cells * 4], &mut values),
        Endianness::Big => BigEndian::read_f32_into(&bytes[..num_cells * 4], &mut values),
    }
    let values: Vec<f64> = values.into_iter().map(f64::from).collect();

    let west = if x_centre { xll - 0.5 * cellsize } else { xll };
    let south = if y_centre { yll - 0.5 * cellsize } else { yll };

    let mut grid = Grid::from_vec(values, rows, columns, f64::from(nodata as f32))?;
    grid.set_envelope(Envelope {
        north: south + rows as f64 * cellsize,
        south,
        east: west + columns as f64 * cellsize,
        west,
    });

    let mut config = RasterConfig::default();
    config.nodata = grid.nodata();
    config.data_kind = DataKind::Float32;
    config.byte_order = byte_order;
    Ok((grid, config))
}

pub fn write(grid: &Grid, config: &RasterConfig, path: &Path) -> Result<()> {
    let header_path = path.with_extension("hdr");
    let data_path = path.with_extension("flt");
    let env = grid.envelope();

    let byte_order_name = match config.byte_order {
        Endianness::Little => "LSBFIRST",
        Endianness::Big => "MSBFIRST",
    };
    let header = format!(
        "NCOLS {}\nNROWS {}\nXLLCORNER {}\nYLLCORNER {}\nCELLSIZE {}\nNODATA_VALUE {}\nBYTEORDER {}\n",
        grid.columns(),
        grid.rows(),
        env.west,
        env.south,
        grid.cell_size_x(),
        config.nodata,
        byte_order_name,
    );
    fs::write(&header_path, header).map_err(|e| Error::WriteError {
        path: header_path.clone(),
        reason: e.to_string(),
    })?;

    let mut bytes = vec![0u8; grid.num_cells() * 4];
    let values: Vec<f32> = grid.data().iter().map(|&v| v as f32).collect();
    match config.byte_order {
        Endianness::Little => LittleEndian::write_f32_into(&values, &mut bytes),
        Endianness::Big => BigEndian::write_f32_into(&values, &mut bytes),
    }
    fs::write(&data_path, bytes).map_err(|e| Error::WriteError {
        path: data_path.clone(),
        reason: e.to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::RasterStore;

    fn sample_grid() -> (Grid, RasterConfig) {
        let mut grid =
            Grid::from_vec(vec![1.5, 2.5, -9999.0, 4.5], 2, 2, -9999.0).unwrap();
        grid.set_envelope(Envelope {
            north: 2.0,
            south: 0.0,
            east: 2.0,
            west: 0.0,
        });
        let mut config = RasterConfig::default();
        config.nodata = -9999.0;
        (grid, config)
    }

    #[test]
    fn test_flt_round_trip_little_endian() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.flt");
        let (grid, config) = sample_grid();

        RasterStore::save(&grid, &config, &path).unwrap();
        assert!(dir.path().join("grid.hdr").exists());

        let (reloaded, reconfig) = RasterStore::load(&path).unwrap();
        assert_eq!(reconfig.byte_order, Endianness::Little);
        for r in 0..2 {
            for c in 0..2 {
                assert_eq!(grid.value(r, c), reloaded.value(r, c));
            }
        }
    }

    #[test]
    fn test_flt_round_trip_big_endian() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.flt");
        let (grid, mut config) = sample_grid();
        config.byte_order = Endianness::Big;

        write(&grid, &config, &path).unwrap();
        let (reloaded, reconfig) = read(&path).unwrap();
        assert_eq!(reconfig.byte_order, Endianness::Big);
        assert_eq!(reloaded.value(1, 1), 4.5);
    }

    #[test]
    fn test_load_via_hdr_path() {
        let dir = tempfile::tempdir().unwrap();
        let (grid, config) = sample_grid();
        write(&grid, &config, &dir.path().join("grid.flt")).unwrap();

        let (reloaded, _) = read(&dir.path().join("grid.hdr")).unwrap();
        assert_eq!(reloaded.shape(), (2, 2));
    }

    #[test]
    fn test_truncated_payload() {
        let dir = tempfile::tempdir().unwrap();
        let (grid, config) = sample_grid();
        write(&grid, &config, &dir.path().join("grid.flt")).unwrap();
        // chop the payload
        let data = fs::read(dir.path().join("grid.flt")).unwrap();
        fs::write(dir.path().join("grid.flt"), &data[..7]).unwrap();

        assert!(matches!(
            read(&dir.path().join("grid.flt")),
            Err(Error::ReadError { .. })
        ));
    }
}
