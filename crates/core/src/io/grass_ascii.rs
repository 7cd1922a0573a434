//! GRASS ASCII grid (`.txt`)
//!
//! Header keywords `north`, `south`, `east`, `west`, `rows`, `cols` and an
//! optional `null` nodata marker, each `key: value`, followed by
//! whitespace-delimited values row-major from the north edge.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::grid::{DataKind, Envelope, Grid, RasterConfig};

use super::{last_token, malformed, read_header_lines};

pub fn read(path: &Path) -> Result<(Grid, RasterConfig)> {
    let lines = read_header_lines(path)?;

    let mut north: Option<f64> = None;
    let mut south: Option<f64> = None;
    let mut east: Option<f64> = None;
    let mut west: Option<f64> = None;
    let mut rows: Option<usize> = None;
    let mut columns: Option<usize> = None;
    let mut nodata = -9999.0;
    let mut values: Vec<f64> = Vec::new();

    for (idx, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let lower = line.to_ascii_lowercase();
        let value = last_token(line);

        let parse_f64 = |keyword: &str| -> Result<f64> {
            value
                .and_then(|v| v.trim_end_matches(':').parse().ok())
                .ok_or_else(|| malformed(path, idx + 1, keyword))
        };

        if lower.starts_with("north") {
            north = Some(parse_f64("north")?);
        } else if lower.starts_with("south") {
            south = Some(parse_f64("south")?);
        } else if lower.starts_with("east") {
            east = Some(parse_f64("east")?);
        } else if lower.starts_with("west") {
            west = Some(parse_f64("west")?);
        } else if lower.starts_with("rows") {
            rows = Some(parse_f64("rows")? as usize);
        } else if lower.starts_with("cols") {
            columns = Some(parse_f64("cols")? as usize);
        } else if lower.starts_with("null") {
            nodata = parse_f64("null")?;
        } else {
            for token in line.split_whitespace() {
                let v: f64 = if token == "*" {
                    // GRASS prints nulls as asterisks
                    nodata
                } else {
                    token.parse().map_err(|_| Error::ReadError {
                        path: path.to_path_buf(),
                        reason: format!("unparsable value '{token}' on line {}", idx + 1),
                    })?
                };
                values.push(v);
            }
        }
    }

    let north = north.ok_or_else(|| malformed(path, 0, "north"))?;
    let south = south.ok_or_else(|| malformed(path, 0, "south"))?;
    let east = east.ok_or_else(|| malformed(path, 0, "east"))?;
    let west = west.ok_or_else(|| malformed(path, 0, "west"))?;
    let rows = rows.ok_or_else(|| malformed(path, 0, "rows"))?;
    let columns = columns.ok_or_else(|| malformed(path, 0, "cols"))?;

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

    let mut grid = Grid::from_vec(values, rows, columns, nodata)?;
    grid.set_envelope(Envelope {
        north,
        south,
        east,
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

    writeln!(w, "north: {}", env.north).map_err(write_err)?;
    writeln!(w, "south: {}", env.south).map_err(write_err)?;
    writeln!(w, "east: {}", env.east).map_err(write_err)?;
    writeln!(w, "west: {}", env.west).map_err(write_err)?;
    writeln!(w, "rows: {}", grid.rows()).map_err(write_err)?;
    writeln!(w, "cols: {}", grid.columns()).map_err(write_err)?;
    writeln!(w, "null: {}", config.nodata).map_err(write_err)?;

    for row in 0..grid.rows() {
        let mut line = String::with_capacity(grid.columns() * 8);
        for (col, &v) in grid.row_values(row).iter().enumerate() {
            if col > 0 {
                line.push(' ');
            }
            line.push_str(&format!("{v}"));
        }
        writeln!(w, "{line}").map_err(write_err)?;
    }
    w.flush().map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grass_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.txt");

        let mut grid =
            Grid::from_vec(vec![10.25, 11.5, -9999.0, 13.75, 14.0, 15.125], 2, 3, -9999.0)
                .unwrap();
        grid.set_envelope(Envelope {
            north: 20.0,
            south: 0.0,
            east: 30.0,
            west: 0.0,
        });
        let mut config = RasterConfig::default();
        config.nodata = -9999.0;

        write(&grid, &config, &path).unwrap();
        let (reloaded, reconfig) = read(&path).unwrap();

        assert_eq!(reloaded.shape(), (2, 3));
        assert_eq!(reconfig.nodata, -9999.0);
        for r in 0..2 {
            for c in 0..3 {
                assert_eq!(grid.value(r, c).to_bits(), reloaded.value(r, c).to_bits());
            }
        }
        assert_eq!(reloaded.envelope(), grid.envelope());
    }

    #[test]
    fn test_null_asterisks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nulls.txt");
        std::fs::write(
            &path,
            "north: 2\nsouth: 0\neast: 2\nwest: 0\nrows: 1\ncols: 2\nnull: -1\n* 7\n",
        )
        .unwrap();

        let (grid, _) = read(&path).unwrap();
        assert!(grid.is_nodata(grid.value(0, 0)));
        assert_eq!(grid.value(0, 1), 7.0);
    }
}
