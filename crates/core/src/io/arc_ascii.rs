//! ArcGIS ASCII grid (`.asc` / `.txt`)
//!
//! Six-line ASCII header (`ncols`, `nrows`, `xllcorner`/`xllcenter`,
//! `yllcorner`/`yllcenter`, `cellsize`, `nodata_value`) followed by
//! whitespace-delimited values, row-major from the north edge.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::grid::{DataKind, Envelope, Grid, RasterConfig};

use super::{last_token, malformed, read_header_lines};

pub fn read(path: &Path) -> Result<(Grid, RasterConfig)> {
    let lines = read_header_lines(path)?;

    let mut columns: Option<usize> = None;
    let mut rows: Option<usize> = None;
    let mut cellsize: Option<f64> = None;
    let mut nodata = -9999.0;
    let mut xll: Option<(f64, bool)> = None; // (value, is_centre)
    let mut yll: Option<(f64, bool)> = None;
    let mut values: Vec<f64> = Vec::new();

    for (idx, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let lower = line.to_ascii_lowercase();
        let value = last_token(line);

        if lower.starts_with("ncols") {
            columns = Some(
                value
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| malformed(path, idx + 1, "ncols"))?,
            );
        } else if lower.starts_with("nrows") {
            rows = Some(
                value
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| malformed(path, idx + 1, "nrows"))?,
            );
        } else if lower.starts_with("xllcenter") {
            let v = value
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| malformed(path, idx + 1, "xllcenter"))?;
            xll = Some((v, true));
        } else if lower.starts_with("xllcorner") {
            let v = value
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| malformed(path, idx + 1, "xllcorner"))?;
            xll = Some((v, false));
        } else if lower.starts_with("yllcenter") {
            let v = value
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| malformed(path, idx + 1, "yllcenter"))?;
            yll = Some((v, true));
        } else if lower.starts_with("yllcorner") {
            let v = value
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| malformed(path, idx + 1, "yllcorner"))?;
            yll = Some((v, false));
        } else if lower.starts_with("cellsize") {
            cellsize = Some(
                value
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| malformed(path, idx + 1, "cellsize"))?,
            );
        } else if lower.starts_with("nodata_value") || lower.starts_with("nodata") {
            nodata = value
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| malformed(path, idx + 1, "nodata_value"))?;
        } else {
            // data row
            for token in line.split_whitespace() {
                let v: f64 = token.parse().map_err(|_| Error::ReadError {
                    path: path.to_path_buf(),
                    reason: format!("unparsable value '{token}' on line {}", idx + 1),
                })?;
                values.push(v);
            }
        }
    }

    let columns = columns.ok_or_else(|| malformed(path, 0, "ncols"))?;
    let rows = rows.ok_or_else(|| malformed(path, 0, "nrows"))?;
    let cellsize = cellsize.ok_or_else(|| malformed(path, 0, "cellsize"))?;
    let (xll, x_centre) = xll.ok_or_else(|| malformed(path, 0, "xllcorner"))?;
    let (yll, y_centre) = yll.ok_or_else(|| malformed(path, 0, "yllcorner"))?;

    if values.len() != rows * columns {
        return Err(Error::ReadError {
            path: path.to_path_buf(),
            reason: format!(
                "expected {} values, found {}",
                rows * columns,
                values.len()
            ),
        });
    }

    let west = if x_centre { xll - 0.5 * cellsize } else { xll };
    let south = if y_centre { yll - 0.5 * cellsize } else { yll };

    let mut grid = Grid::from_vec(values, rows, columns, nodata)?;
    grid.set_envelope(Envelope {
        north: south + rows as f64 * cellsize,
        south,
        east: west + columns as f64 * cellsize,
        west,
    });

    let mut config = RasterConfig::default();
    config.nodata = nodata;
    config.data_kind = DataKind::Float32;
    Ok((grid, config))
}

pub fn write(grid: &Grid, config: &RasterConfig, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::WriteError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut w = BufWriter::new(file);
    let env = grid.envelope();
    let write_err = |e: std::io::Error| Error::WriteError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    writeln!(w, "NCOLS {}", grid.columns()).map_err(write_err)?;
    writeln!(w, "NROWS {}", grid.rows()).map_err(write_err)?;
    writeln!(w, "XLLCORNER {}", env.west).map_err(write_err)?;
    writeln!(w, "YLLCORNER {}", env.south).map_err(write_err)?;
    writeln!(w, "CELLSIZE {}", grid.cell_size_x()).map_err(write_err)?;
    writeln!(w, "NODATA_VALUE {}", config.nodata).map_err(write_err)?;

    for row in 0..grid.rows() {
        let mut line = String::with_capacity(grid.columns() * 8);
        for (col, &v) in grid.row_values(row).iter().enumerate() {
            if col > 0 {
                line.push(' ');
            }
            line.push_str(&format_value(v));
        }
        writeln!(w, "{line}").map_err(write_err)?;
    }
    w.flush().map_err(write_err)?;
    Ok(())
}

/// Trim trailing zeros so integers round-trip as integers.
fn format_value(v: f64) -> String {
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}
