//! Whitebox GAT raster (`.dep` header + `.tas` payload)
//!
//! Tab-separated `Key:\tvalue` header lines; payload is row-major binary in
//! the declared data type (`DOUBLE`, `FLOAT`, `INTEGER`, `BYTE`) and byte
//! order.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::grid::{DataKind, DataScale, Endianness, Envelope, Grid, RasterConfig};

use super::{malformed, read_header_lines};

pub fn read(path: &Path) -> Result<(Grid, RasterConfig)> {
    let header_path = path.with_extension("dep");
    let data_path = path.with_extension("tas");
    if !header_path.exists() {
        return Err(Error::FileDoesNotExist(header_path));
    }
    if !data_path.exists() {
        return Err(Error::FileDoesNotExist(data_path));
    }

    let lines = read_header_lines(&header_path)?;
    let mut config = RasterConfig::default();
    let mut rows: Option<usize> = None;
    let mut columns: Option<usize> = None;
    let mut nodata = -32768.0;
    let mut env = Envelope::default();

    for (idx, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let lower = line.to_ascii_lowercase();
        let value = line.split('\t').last().map(str::trim).unwrap_or("");
        let parse_f64 = |keyword: &str| -> Result<f64> {
            value
                .parse()
                .map_err(|_| malformed(&header_path, idx + 1, keyword))
        };

        if lower.contains("metadata entry") {
            config.add_metadata_entry(value.replace(';', ":"));
        } else if lower.starts_with("display min") {
            config.display_minimum = parse_f64("display min")?;
        } else if lower.starts_with("display max") {
            config.display_maximum = parse_f64("display max")?;
        } else if lower.starts_with("min:") || lower.starts_with("max:") {
            // stored stats; recomputed on demand from the data
        } else if lower.starts_with("north") {
            env.north = parse_f64("north")?;
        } else if lower.starts_with("south") {
            env.south = parse_f64("south")?;
        } else if lower.starts_with("east") {
            env.east = parse_f64("east")?;
        } else if lower.starts_with("west") {
            env.west = parse_f64("west")?;
        } else if lower.starts_with("cols") {
            columns = Some(parse_f64("cols")? as usize);
        } else if lower.starts_with("rows") {
            rows = Some(parse_f64("rows")? as usize);
        } else if lower.starts_with("stacks") {
            config.number_of_bands = parse_f64("stacks")? as usize;
        } else if lower.starts_with("data type") {
            let dt = value.to_ascii_lowercase();
            config.data_kind = if dt.contains("double") {
                DataKind::Float64
            } else if dt.contains("float") {
                DataKind::Float32
            } else if dt.contains("int") {
                DataKind::Int16
            } else {
                DataKind::Int8
            };
        } else if lower.starts_with("data scale") {
            let ds = value.to_ascii_lowercase();
            config.data_scale = if ds.contains("categorical") {
                DataScale::Categorical
            } else if ds.contains("bool") {
                DataScale::Boolean
            } else if ds.contains("rgb") {
                DataScale::Rgb
            } else {
                DataScale::Continuous
            };
        } else if lower.starts_with("z units") {
            config.z_units = value.to_ascii_lowercase();
        } else if lower.starts_with("xy units") {
            config.xy_units = value.to_ascii_lowercase();
        } else if lower.starts_with("projection") {
            config.coordinate_ref_system_wkt = value.to_string();
        } else if lower.starts_with("preferred palette") {
            config.preferred_palette = value.to_ascii_lowercase();
        } else if lower.starts_with("palette nonlinearity") {
            config.palette_nonlinearity = parse_f64("palette nonlinearity")?;
        } else if lower.starts_with("byte order") || lower.starts_with("byteorder") {
            config.byte_order = if value.to_ascii_uppercase().contains("BIG") {
                Endianness::Big
            } else {
                Endianness::Little
            };
        } else if lower.starts_with("nodata") {
            nodata = parse_f64("nodata")?;
        }
    }

    let rows = rows.ok_or_else(|| malformed(&header_path, 0, "rows"))?;
    let columns = columns.ok_or_else(|| malformed(&header_path, 0, "cols"))?;
    let num_cells = rows * columns;

    let bytes = fs::read(&data_path).map_err(|e| Error::ReadError {
        path: data_path.clone(),
        reason: e.to_string(),
    })?;
    let values = decode_payload(&bytes, num_cells, config.data_kind, config.byte_order)
        .map_err(|reason| Error::ReadError {
            path: data_path,
            reason,
        })?;

    config.nodata = nodata;
    let mut grid = Grid::from_vec(values, rows, columns, nodata)?;
    grid.set_envelope(env);
    Ok((grid, config))
}

fn decode_payload(
    bytes: &[u8],
    num_cells: usize,
    kind: DataKind,
    order: Endianness,
) -> std::result::Result<Vec<f64>, String> {
    let need = num_cells * kind.bytes_per_sample();
    if bytes.len() < need {
        return Err(format!(
            "payload holds {} bytes, {} cells of {:?} need {}",
            bytes.len(),
            num_cells,
            kind,
            need
        ));
    }
    let bytes = &bytes[..need];
    let values = match (kind, order) {
        (DataKind::Float64, Endianness::Little) => {
            let mut v = vec![0.0f64; num_cells];
            LittleEndian::read_f64_into(bytes, &mut v);
            v
        }
        (DataKind::Float64, Endianness::Big) => {
            let mut v = vec![0.0f64; num_cells];
            BigEndian::read_f64_into(bytes, &mut v);
            v
        }
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
        (DataKind::Int8, _) => bytes.iter().map(|&b| f64::from(b as i8)).collect(),
        _ => return Err(format!("unsupported Whitebox data type {kind:?}")),
    };
    Ok(values)
}

pub fn write(grid: &Grid, config: &RasterConfig, path: &Path) -> Result<()> {
    let header_path = path.with_extension("dep");
    let data_path = path.with_extension("tas");
    let env = grid.envelope();

    let (min, max) = grid.min_max().unwrap_or((f64::MAX, f64::MIN));
    let display_min = if config.display_minimum == f64::MAX {
        min
    } else {
        config.display_minimum
    };
    let display_max = if config.display_maximum == f64::MIN {
        max
    } else {
        config.display_maximum
    };

    let data_type = match config.data_kind {
        DataKind::Float64 => "DOUBLE",
        DataKind::Int16 => "INTEGER",
        DataKind::Int8 => "BYTE",
        _ => "FLOAT",
    };
    let data_scale = match config.data_scale {
        DataScale::Categorical => "categorical",
        DataScale::Boolean => "boolean",
        DataScale::Rgb => "rgb",
        DataScale::Continuous => "continuous",
    };
    let palette = if config.preferred_palette == "not specified" {
        "grey.pal"
    } else {
        &config.preferred_palette
    };
    let byte_order = match config.byte_order {
        Endianness::Little => "LITTLE_ENDIAN",
        Endianness::Big => "BIG_ENDIAN",
    };
    let projection = if config.coordinate_ref_system_wkt.is_empty() {
        "not specified"
    } else {
        &config.coordinate_ref_system_wkt
    };

    let mut header = String::new();
    header.push_str(&format!("Min:\t{min}\n"));
    header.push_str(&format!("Max:\t{max}\n"));
    header.push_str(&format!("North:\t{}\n", env.north));
    header.push_str(&format!("South:\t{}\n", env.south));
    header.push_str(&format!("East:\t{}\n", env.east));
    header.push_str(&format!("West:\t{}\n", env.west));
    header.push_str(&format!("Cols:\t{}\n", grid.columns()));
    header.push_str(&format!("Rows:\t{}\n", grid.rows()));
    header.push_str(&format!("Stacks:\t{}\n", config.number_of_bands.max(1)));
    header.push_str(&format!("Data Type:\t{data_type}\n"));
    header.push_str(&format!("Z Units:\t{}\n", config.z_units));
    header.push_str(&format!("XY Units:\t{}\n", config.xy_units));
    header.push_str(&format!("Projection:\t{projection}\n"));
    header.push_str(&format!("Data Scale:\t{data_scale}\n"));
    header.push_str(&format!("Display Min:\t{display_min}\n"));
    header.push_str(&format!("Display Max:\t{display_max}\n"));
    header.push_str(&format!("Preferred Palette:\t{palette}\n"));
    header.push_str(&format!("NoData:\t{}\n", config.nodata));
    header.push_str(&format!("Byte Order:\t{byte_order}\n"));
    header.push_str(&format!(
        "Palette Nonlinearity:\t{}\n",
        config.palette_nonlinearity
    ));
    for entry in &config.metadata_entries {
        if !entry.trim().is_empty() {
            header.push_str(&format!("Metadata Entry:\t{}\n", entry.replace(':', ";")));
        }
    }
    fs::write(&header_path, header).map_err(|e| Error::WriteError {
        path: header_path.clone(),
        reason: e.to_string(),
    })?;

    let bytes = encode_payload(grid, config.data_kind, config.byte_order)
        .map_err(Error::UnsupportedDataType)?;
    fs::write(&data_path, bytes).map_err(|e| Error::WriteError {
        path: data_path.clone(),
        reason: e.to_string(),
    })?;
    Ok(())
}

fn encode_payload(
    grid: &Grid,
    kind: DataKind,
    order: Endianness,
) -> std::result::Result<Vec<u8>, String> {
    let n = grid.num_cells();
    let bytes = match kind {
        DataKind::Float64 => {
            let values: Vec<f64> = grid.data().iter().copied().collect();
            let mut out = vec![0u8; n * 8];
            match order {
                Endianness::Little => LittleEndian::write_f64_into(&values, &mut out),
                Endianness::Big => BigEndian::write_f64_into(&values, &mut out),
            }
            out
        }
        DataKind::Int16 => {
            let values: Vec<i16> = grid
                .data()
                .iter()
                .map(|&v| num_traits::cast(v).unwrap_or(i16::MIN))
                .collect();
            let mut out = vec![0u8; n * 2];
            match order {
                Endianness::Little => LittleEndian::write_i16_into(&values, &mut out),
                Endianness::Big => BigEndian::write_i16_into(&values, &mut out),
            }
            out
        }
        DataKind::Int8 => grid
            .data()
            .iter()
            .map(|&v| num_traits::cast::<f64, i8>(v).unwrap_or(i8::MIN) as u8)
            .collect(),
        DataKind::Float32 => {
            let values: Vec<f32> = grid.data().iter().map(|&v| v as f32).collect();
            let mut out = vec![0u8; n * 4];
            match order {
                Endianness::Little => LittleEndian::write_f32_into(&values, &mut out),
                Endianness::Big => BigEndian::write_f32_into(&values, &mut out),
            }
            out
        }
        other => return Err(format!("{other:?} cannot be stored in a Whitebox raster")),
    };
    Ok(bytes)
}
