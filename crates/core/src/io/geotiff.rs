//! GeoTIFF (`.tif` / `.tiff`) via the `tiff` crate
//!
//! Reading handles the sample formats u8..u64, i8..i64, f32/f64 and 8-bit
//! RGB/RGBA (packed into the cell value), with the compressions the `tiff`
//! crate decodes (none, LZW, deflate) and the horizontal predictor. Writing
//! emits an uncompressed grid with one strip per scanline and the GeoTIFF
//! georeferencing tags plus `GDAL_NODATA`.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

use crate::error::{Error, Result};
use crate::grid::{DataKind, DataScale, Envelope, Grid, RasterConfig};

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GDAL_NODATA: u16 = 42113;

const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;

pub fn read(path: &Path) -> Result<(Grid, RasterConfig)> {
    let file = File::open(path).map_err(|e| Error::ReadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let read_err = |reason: String| Error::ReadError {
        path: path.to_path_buf(),
        reason,
    };

    let mut decoder =
        Decoder::new(BufReader::new(file)).map_err(|e| read_err(format!("TIFF open: {e}")))?;
    let (width, height) = decoder
        .dimensions()
        .map_err(|e| read_err(format!("TIFF dimensions: {e}")))?;
    let rows = height as usize;
    let columns = width as usize;

    let mut config = RasterConfig::default();

    // GDAL nodata rides in an ASCII tag
    if let Ok(text) = decoder.get_tag_ascii_string(Tag::Unknown(TAG_GDAL_NODATA)) {
        if let Ok(v) = text.trim().trim_end_matches('\0').parse::<f64>() {
            config.nodata = v;
        }
    }

    // GeoKey directory: raster registration and EPSG code
    let mut pixel_is_area = true;
    if let Ok(keys) = decoder.get_tag_u64_vec(Tag::Unknown(TAG_GEO_KEY_DIRECTORY)) {
        for entry in keys[4.min(keys.len())..].chunks_exact(4) {
            let (key_id, location, value) = (entry[0], entry[1], entry[3]);
            if location != 0 {
                continue; // value lives in another tag; only inline shorts matter here
            }
            match key_id as u16 {
                KEY_RASTER_TYPE => pixel_is_area = value != 2,
                KEY_GEOGRAPHIC_TYPE | KEY_PROJECTED_CS_TYPE => {
                    if value > 0 && value < u64::from(u16::MAX) {
                        config.epsg_code = value as u16;
                    }
                }
                _ => {}
            }
        }
    }
    config.pixel_is_area = pixel_is_area;

    let decoded = decoder
        .read_image()
        .map_err(|e| read_err(format!("TIFF payload: {e}")))?;
    let color = decoder
        .colortype()
        .map_err(|e| read_err(format!("TIFF colour type: {e}")))?;
    let samples_per_pixel = match color {
        tiff::ColorType::Gray(_) => 1,
        tiff::ColorType::RGB(8) => 3,
        tiff::ColorType::RGBA(8) => 4,
        other => {
            return Err(Error::UnsupportedDataType(format!(
                "TIFF colour type {other:?}"
            )))
        }
    };

    let (values, data_kind) =
        decode_samples(decoded, rows * columns, samples_per_pixel).map_err(read_err)?;
    config.data_kind = data_kind;
    if samples_per_pixel > 1 {
        config.data_scale = DataScale::Rgb;
    }

    let mut grid = Grid::from_vec(values, rows, columns, config.nodata)?;
    grid.set_pixel_is_area(pixel_is_area);

    // Envelope from ModelTiepoint + ModelPixelScale
    let scale = decoder.get_tag_f64_vec(Tag::Unknown(TAG_MODEL_PIXEL_SCALE));
    let tiepoint = decoder.get_tag_f64_vec(Tag::Unknown(TAG_MODEL_TIEPOINT));
    if let (Ok(scale), Ok(tie)) = (scale, tiepoint) {
        if scale.len() >= 2 && tie.len() >= 6 {
            let west = tie[3] - tie[0] * scale[0];
            let north = tie[4] + tie[1] * scale[1];
            let (x_span, y_span) = if pixel_is_area {
                (columns as f64, rows as f64)
            } else {
                ((columns - 1) as f64, (rows - 1) as f64)
            };
            grid.set_envelope(Envelope {
                north,
                south: north - y_span * scale[1],
                east: west + x_span * scale[0],
                west,
            });
        }
    }

    Ok((grid, config))
}

/// Flatten a decode buffer into per-cell f64 values. Multi-sample (RGB/RGBA)
/// pixels pack their 8-bit channels into one numeric value.
fn decode_samples(
    decoded: DecodingResult,
    num_cells: usize,
    samples_per_pixel: usize,
) -> std::result::Result<(Vec<f64>, DataKind), String> {
    fn gray<T: Copy, F: Fn(T) -> f64>(
        buf: Vec<T>,
        num_cells: usize,
        cast: F,
    ) -> std::result::Result<Vec<f64>, String> {
        if buf.len() < num_cells {
            return Err(format!(
                "payload holds {} samples, expected {num_cells}",
                buf.len()
            ));
        }
        Ok(buf.into_iter().take(num_cells).map(cast).collect())
    }

    fn packed(buf: Vec<u8>, num_cells: usize, samples: usize) -> Vec<f64> {
        buf.chunks_exact(samples)
            .take(num_cells)
            .map(|px| {
                let a = if samples == 4 { px[3] } else { 255 };
                f64::from(
                    (u32::from(a) << 24)
                        | (u32::from(px[0]) << 16)
                        | (u32::from(px[1]) << 8)
                        | u32::from(px[2]),
                )
            })
            .collect()
    }

    if samples_per_pixel > 1 {
        let kind = if samples_per_pixel == 4 {
            DataKind::Rgba32
        } else {
            DataKind::Rgb24
        };
        return match decoded {
            DecodingResult::U8(buf) => Ok((packed(buf, num_cells, samples_per_pixel), kind)),
            _ => Err("only 8-bit RGB/RGBA TIFFs are supported".to_string()),
        };
    }

    match decoded {
        DecodingResult::U8(buf) => Ok((gray(buf, num_cells, f64::from)?, DataKind::UInt8)),
        DecodingResult::U16(buf) => Ok((gray(buf, num_cells, f64::from)?, DataKind::UInt16)),
        DecodingResult::U32(buf) => Ok((gray(buf, num_cells, f64::from)?, DataKind::UInt32)),
        DecodingResult::U64(buf) => {
            Ok((gray(buf, num_cells, |v| v as f64)?, DataKind::UInt64))
        }
        DecodingResult::I8(buf) => Ok((gray(buf, num_cells, f64::from)?, DataKind::Int8)),
        DecodingResult::I16(buf) => Ok((gray(buf, num_cells, f64::from)?, DataKind::Int16)),
        DecodingResult::I32(buf) => Ok((gray(buf, num_cells, f64::from)?, DataKind::Int32)),
        DecodingResult::I64(buf) => {
            Ok((gray(buf, num_cells, |v| v as f64)?, DataKind::Int64))
        }
        DecodingResult::F32(buf) => Ok((gray(buf, num_cells, f64::from)?, DataKind::Float32)),
        DecodingResult::F64(buf) => Ok((gray(buf, num_cells, |v| v)?, DataKind::Float64)),
        _ => Err("unsupported TIFF sample format".to_string()),
    }
}

pub fn write(grid: &Grid, config: &RasterConfig, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::WriteError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let write_err = |reason: String| Error::WriteError {
        path: path.to_path_buf(),
        reason,
    };

    let mut encoder =
        TiffEncoder::new(file).map_err(|e| write_err(format!("TIFF encoder: {e}")))?;
    let env = grid.envelope();
    let columns = grid.columns() as u32;
    let rows = grid.rows() as u32;

    // Georeferencing tag payloads, shared by every sample type below.
    let pixel_scale = [grid.cell_size_x(), grid.cell_size_y(), 0.0];
    let tiepoint = [0.0, 0.0, 0.0, env.west, env.north, 0.0];
    let raster_type: u16 = if config.pixel_is_area { 1 } else { 2 };
    let mut geo_keys: Vec<u16> = vec![1, 1, 0, 1, KEY_RASTER_TYPE, 0, 1, raster_type];
    if config.epsg_code != 0 {
        geo_keys[3] = 2;
        geo_keys.extend_from_slice(&[KEY_PROJECTED_CS_TYPE, 0, 1, config.epsg_code]);
    }
    let nodata_text = format!("{}", config.nodata);

    macro_rules! emit {
        ($color:ty, $sample:ty, $cast:expr) => {{
            let data: Vec<$sample> = grid.data().iter().map($cast).collect();
            let mut image = encoder
                .new_image::<$color>(columns, rows)
                .map_err(|e| write_err(format!("TIFF image: {e}")))?;
            image
                .rows_per_strip(1)
                .map_err(|e| write_err(format!("TIFF strip layout: {e}")))?;
            image
                .encoder()
                .write_tag(Tag::Unknown(TAG_MODEL_PIXEL_SCALE), &pixel_scale[..])
                .map_err(|e| write_err(format!("pixel scale tag: {e}")))?;
            image
                .encoder()
                .write_tag(Tag::Unknown(TAG_MODEL_TIEPOINT), &tiepoint[..])
                .map_err(|e| write_err(format!("tiepoint tag: {e}")))?;
            image
                .encoder()
                .write_tag(Tag::Unknown(TAG_GEO_KEY_DIRECTORY), &geo_keys[..])
                .map_err(|e| write_err(format!("geokey tag: {e}")))?;
            image
                .encoder()
                .write_tag(Tag::Unknown(TAG_GDAL_NODATA), nodata_text.as_str())
                .map_err(|e| write_err(format!("nodata tag: {e}")))?;
            image
                .write_data(&data)
                .map_err(|e| write_err(format!("TIFF payload: {e}")))?;
        }};
    }

    match config.data_kind {
        DataKind::UInt8 => emit!(colortype::Gray8, u8, |&v| {
            num_traits::cast(v).unwrap_or(0)
        }),
        DataKind::UInt16 => emit!(colortype::Gray16, u16, |&v| {
            num_traits::cast(v).unwrap_or(0)
        }),
        DataKind::UInt32 => emit!(colortype::Gray32, u32, |&v| {
            num_traits::cast(v).unwrap_or(0)
        }),
        DataKind::UInt64 => emit!(colortype::Gray64, u64, |&v| {
            num_traits::cast(v).unwrap_or(0)
        }),
        DataKind::Float64 => emit!(colortype::Gray64Float, f64, |&v| v),
        // Signed integer and everything else writes as float32; the tiff
        // encoder has no signed grayscale sample types.
        _ => emit!(colortype::Gray32Float, f32, |&v| v as f32),
    }

    Ok(())
}
