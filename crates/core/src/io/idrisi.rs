//! Idrisi raster (`.rst` payload + `.rdc` header)
//!
//! Colon-separated `key : value` header; payload is row-major binary,
//! data types `real` (float32), `integer` (int16), `byte` (uint8). The
//! `RGB24` type is declared by the format but not supported here.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::grid::{DataKind, Endianness, Envelope, Grid, RasterConfig};

use super::{malformed, read_header_lines};

pub fn read(path: &Path) -> Result<(Grid, RasterConfig)> {
    let header_path = path.with_extension("rdc");
    let data_path = path.with_extension("rst");
    if !header_path.exists() {
        return Err(Error::FileDoesNotExist(header_path));
    }
    if !data_path.exists() {
        return Err(Error::FileDoesNotExist(data_path));
    }

    let lines = read_header_lines(&header_path)?;
    let mut config = RasterConfig::default();
    config.nodata = -f64::MAX;
    let mut rows: Option<usize> = None;
    let mut columns: Option<usize> = None;
    let mut env = Envelope::default();

    for (idx, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let lower = line.to_ascii_lowercase();
        let value = line.split(':').last().map(str::trim).unwrap_or("");
        let parse_f64 = |keyword: &str| -> Result<f64> {
            value
                .parse()
                .map_err(|_| malformed(&header_path, idx + 1, keyword))
        };

        if lower.contains("lineage") || lower.contains("comment") {
            config.add_metadata_entry(value.replace(';', ":"));
        } else if lower.starts_with("display min") {
            config.display_minimum = parse_f64("display min")?;
        } else if lower.starts_with("display max") {
            config.display_maximum = parse_f64("display max")?;
        } else if lower.starts_with("min. value") || lower.starts_with("max. value") {
            // stored stats; recomputed on demand from the data
        } else if lower.starts_with("max. y") {
            env.north = parse_f64("max. y")?;
        } else if lower.starts_with("min. y") {
            env.south = parse_f64("min. y")?;
        } else if lower.starts_with("max. x") {
            env.east = parse_f64("max. x")?;
        } else if lower.starts_with("min. x") {
            env.west = parse_f64("min. x")?;
        } else if lower.starts_with("columns") {
            columns = Some(parse_f64("columns")? as usize);
        } else if lower.starts_with("rows") {
            rows = Some(parse_f64("rows")? as usize);
        } else if lower.starts_with("data type") {
            let dt = value.to_ascii_lowercase();
            config.data_kind = if dt.contains("real") {
                DataKind::Float32
            } else if dt.contains("int") {
                DataKind::Int16
            } else if dt.contains("byte") {
                DataKind::UInt8
            } else if dt.contains("rgb24") {
                DataKind::Rgb24
            } else {
                return Err(Error::UnsupportedDataType(dt));
            };
        } else if lower.starts_with("file type") {
            if !value.to_ascii_lowercase().contains("binary")
                || value.to_ascii_lowercase().contains("packed")
            {
                return Err(Error::UnsupportedDataType(format!(
                    "Idrisi file type '{value}' (only plain binary is supported)"
                )));
            }
        } else if lower.starts_with("flag value") {
            if let Ok(v) = value.parse::<f64>() {
                config.nodata = v;
            }
        } else if lower.starts_with("value units") {
            config.z_units = value.to_ascii_lowercase();
        } else if lower.starts_with("ref. units") {
            config.xy_units = value.to_ascii_lowercase();
        } else if lower.starts_with("ref. system") {
            config.coordinate_ref_system_wkt = value.to_string();
        } else if lower.starts_with("byteorder") {
            config.byte_order = if value.to_ascii_uppercase().contains("BIG") {
                Endianness::Big
            } else {
                Endianness::Little
            };
        }
    }

    let rows = rows.ok_or_else(|| malformed(&header_path, 0, "rows"))?;
    let columns = columns.ok_or_else(|| malformed(&header_path, 0, "columns"))?;
    let num_cells = rows * columns;

    if config.data_kind == DataKind::Rgb24 {
        return Err(Error::UnsupportedDataType(
            "Idrisi RGB24 rasters are not supported".to_string(),
        ));
    }

    let bytes = fs::read(&data_path).map_err(|e| Error::ReadError {
        path: data_path.clone(),
        reason: e.to_string(),
    })?;
    let need = num_cells * config.data_kind.bytes_per_sample();
    if bytes.len() < need {
        return Err(Error::ReadError {
            path: data_path,
            reason: format!("payload holds {} bytes, need {}", bytes.len(), need),
        });
    }
    let bytes = &bytes[..need];

    let values: Vec<f64> = match (config.data_kind, config.byte_order) {
        (DataKind::Float32, Endianness::Little) => {
            let mut v = vec![0.0f32; num_cells];
            LittleEndian::read_f32_into(bytes, &mut v);
            v.into_iter().map(f64::from).collect()
        }
        (DataKind::Float32, Endianness::Big) => {
            let mut v = vec![0.0f32; num_cells];
            BigEndian::read_f32_into(bytes, &mut v);
            v.into_iter().map(f64::from).collect()
        }
        (DataKind::Int16, Endianness::Little) => {
            let mut v = vec![0i16; num_cells];
            LittleEndian::read_i16_into(bytes, &mut v);
            v.into_iter().map(f64::from).collect()
        }
        (DataKind::Int16, Endianness::Big) => {
            let mut v = vec![0i16; num_cells];
            BigEndian::read_i16_into(bytes, &mut v);
            v.into_iter().map(f64::from).collect()
        }
        (DataKind::UInt8, _) => bytes.iter().map(|&b| f64::from(b)).collect(),
        (kind, _) => {
            return Err(Error::UnsupportedDataType(format!(
                "Idrisi data type {kind:?}"
            )))
        }
    };

    let mut grid = Grid::from_vec(values, rows, columns, config.nodata)?;
    grid.set_envelope(env);
    Ok((grid, config))
}

pub fn write(grid: &Grid, config: &RasterConfig, path: &Path) -> Result<()> {
    let header_path = path.with_extension("rdc");
    let data_path = path.with_extension("rst");
    let env = grid.envelope();

    let (min, max) = grid.min_max().unwrap_or((f64::MAX, f64::MIN));
    let data_type = match config.data_kind {
        DataKind::Int16 => "integer",
        DataKind::UInt8 => "byte",
        DataKind::Float32 | DataKind::Float64 => "real",
        other => {
            return Err(Error::UnsupportedDataType(format!(
                "{other:?} cannot be stored in an Idrisi raster"
            )))
        }
    };
    let ref_system = if config.coordinate_ref_system_wkt.is_empty() {
        "plane"
    } else {
        &config.coordinate_ref_system_wkt
    };

    let mut header = String::new();
    header.push_str("file format : IDRISI Raster A.1\n");
    header.push_str("file title  : \n");
    header.push_str(&format!("data type   : {data_type}\n"));
    header.push_str("file type   : binary\n");
    header.push_str(&format!("columns     : {}\n", grid.columns()));
    header.push_str(&format!("rows        : {}\n", grid.rows()));
    header.push_str(&format!("ref. system : {ref_system}\n"));
    header.push_str(&format!("ref. units  : {}\n", config.xy_units));
    header.push_str("unit dist.  : 1.0\n");
    header.push_str(&format!("min. X      : {}\n", env.west));
    header.push_str(&format!("max. X      : {}\n", env.east));
    header.push_str(&format!("min. Y      : {}\n", env.south));
    header.push_str(&format!("max. Y      : {}\n", env.north));
    header.push_str("pos'n error : unknown\n");
    header.push_str("resolution  : unknown\n");
    header.push_str(&format!("min. value  : {min}\n"));
    header.push_str(&format!("max. value  : {max}\n"));
    header.push_str(&format!("display min : {min}\n"));
    header.push_str(&format!("display max : {max}\n"));
    header.push_str(&format!("value units : {}\n", config.z_units));
    header.push_str("value error : unknown\n");
    header.push_str(&format!("flag value  : {}\n", config.nodata));
    header.push_str("flag def'n  : missing data\n");
    header.push_str("legend cats : 0\n");
    for entry in &config.metadata_entries {
        if !entry.trim().is_empty() {
            header.push_str(&format!("lineage     : {}\n", entry.replace(':', ";")));
        }
    }
    fs::write(&header_path, header).map_err(|e| Error::WriteError {
        path: header_path.clone(),
        reason: e.to_string(),
    })?;

    let n = grid.num_cells();
    let bytes: Vec<u8> = match config.data_kind {
        DataKind::Int16 => {
            let values: Vec<i16> = grid
                .data()
                .iter()
                .map(|&v| num_traits::cast(v).unwrap_or(i16::MIN))
                .collect();
            let mut out = vec![0u8; n * 2];
            match config.byte_order {
                Endianness::Little => LittleEndian::write_i16_into(&values, &mut out),
                Endianness::Big => BigEndian::write_i16_into(&values, &mut out),
            }
            out
        }
        DataKind::UInt8 => grid
            .data()
            .iter()
            .map(|&v| num_traits::cast::<f64, u8>(v).unwrap_or(0))
            .collect(),
        _ => {
            let values: Vec<f32> = grid.data().iter().map(|&v| v as f32).collect();
            let mut out = vec![0u8; n * 4];
            match config.byte_order {
                Endianness::Little => LittleEndian::write_f32_into(&values, &mut out),
                Endianness::Big => BigEndian::write_f32_into(&values, &mut out),
            }
            out
        }
    };
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

    #[test]
    fn test_idrisi_round_trip_real() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dem.rst");

        let mut grid = Grid::from_vec(vec![1.5, 2.5, 3.5, -9999.0], 2, 2, -9999.0).unwrap();
        grid.set_envelope(Envelope {
            north: 10.0,
            south: 8.0,
            east: 6.0,
            west: 4.0,
        });
        let config = RasterConfig {
            nodata: -9999.0,
            data_kind: DataKind::Float32,
            ..Default::default()
        };

        RasterStore::save(&grid, &config, &path).unwrap();
        assert!(dir.path().join("dem.rdc").exists());

        let (reloaded, reconfig) = RasterStore::load(&path).unwrap();
        assert_eq!(reconfig.data_kind, DataKind::Float32);
        assert_eq!(reconfig.nodata, -9999.0);
        for r in 0..2 {
            for c in 0..2 {
                assert_eq!(grid.value(r, c), reloaded.value(r, c));
            }
        }
        assert_eq!(reloaded.envelope(), grid.envelope());
    }

    #[test]
    fn test_idrisi_byte_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classes.rst");
        let grid = Grid::from_vec(vec![0.0, 1.0, 2.0, 255.0], 2, 2, 0.0).unwrap();
        let config = RasterConfig {
            nodata: 0.0,
            data_kind: DataKind::UInt8,
            ..Default::default()
        };
        write(&grid, &config, &path).unwrap();

        // payload must be exactly four bytes
        assert_eq!(fs::read(dir.path().join("classes.rst")).unwrap().len(), 4);
        let (reloaded, _) = read(&path).unwrap();
        assert_eq!(reloaded.value(1, 1), 255.0);
    }

    #[test]
    fn test_idrisi_rejects_rgb24() {
        let dir = tempfile::tempdir().unwrap();
        let rdc = dir.path().join("pic.rdc");
        fs::write(
            &rdc,
            "data type   : RGB24\nfile type   : binary\ncolumns     : 1\nrows        : 1\n",
        )
        .unwrap();
        fs::write(dir.path().join("pic.rst"), [0u8; 3]).unwrap();

        assert!(matches!(
            read(&dir.path().join("pic.rst")),
            Err(Error::UnsupportedDataType(_))
        ));
    }
}
