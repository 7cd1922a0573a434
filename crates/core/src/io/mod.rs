//! Raster store: maps every supported on-disk format to one grid model
//!
//! Each backend module reads a file set into a (`Grid`, `RasterConfig`) pair
//! and writes one back. Dispatch happens once per load or save on the
//! [`RasterFormat`] tag; no dynamic calls sit inside pixel loops.

mod arc_ascii;
mod arc_binary;
mod geotiff;
mod grass_ascii;
mod idrisi;
mod whitebox;

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::grid::{Grid, RasterConfig};

/// Supported on-disk raster formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    /// ArcGIS binary grid: `.flt` payload + `.hdr` header
    ArcGisBinary,
    /// ArcGIS ASCII grid: `.asc` or `.txt`
    ArcGisAscii,
    /// GeoTIFF: `.tif` or `.tiff`
    GeoTiff,
    /// Whitebox GAT: `.dep` header + `.tas` payload
    Whitebox,
    /// GRASS ASCII grid: `.txt`
    GrassAscii,
    /// Idrisi: `.rst` payload + `.rdc` header
    Idrisi,
}

impl RasterFormat {
    pub fn name(self) -> &'static str {
        match self {
            RasterFormat::ArcGisBinary => "ArcGIS binary grid",
            RasterFormat::ArcGisAscii => "ArcGIS ASCII grid",
            RasterFormat::GeoTiff => "GeoTIFF",
            RasterFormat::Whitebox => "Whitebox GAT",
            RasterFormat::GrassAscii => "GRASS ASCII grid",
            RasterFormat::Idrisi => "Idrisi raster",
        }
    }

    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            RasterFormat::ArcGisBinary => &["flt", "hdr"],
            RasterFormat::ArcGisAscii => &["asc", "txt"],
            RasterFormat::GeoTiff => &["tif", "tiff"],
            RasterFormat::Whitebox => &["dep", "tas"],
            RasterFormat::GrassAscii => &["txt"],
            RasterFormat::Idrisi => &["rst", "rdc"],
        }
    }

    /// All formats, in detection priority order.
    pub fn all() -> &'static [RasterFormat] {
        &[
            RasterFormat::ArcGisBinary,
            RasterFormat::ArcGisAscii,
            RasterFormat::GeoTiff,
            RasterFormat::Whitebox,
            RasterFormat::GrassAscii,
            RasterFormat::Idrisi,
        ]
    }
}

/// Outcome of format resolution for a path.
#[derive(Debug, Clone, Copy)]
pub struct FormatResolution {
    pub format: RasterFormat,
    /// True when several formats share the extension and the choice fell
    /// back to the first candidate. Non-fatal; callers may proceed.
    pub ambiguous: bool,
}

/// Entry point for raster file I/O.
pub struct RasterStore;

impl RasterStore {
    /// Read a raster file into a grid and its metadata.
    pub fn load(path: impl AsRef<Path>) -> Result<(Grid, RasterConfig)> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileDoesNotExist(path.to_path_buf()));
        }
        let resolution = Self::determine_format(path)?;
        match resolution.format {
            RasterFormat::ArcGisBinary => arc_binary::read(path),
            RasterFormat::ArcGisAscii => arc_ascii::read(path),
            RasterFormat::GeoTiff => geotiff::read(path),
            RasterFormat::Whitebox => whitebox::read(path),
            RasterFormat::GrassAscii => grass_ascii::read(path),
            RasterFormat::Idrisi => idrisi::read(path),
        }
    }

    /// Write a grid to disk in the format implied by the path.
    ///
    /// The write is atomic: data lands in temporaries in the target
    /// directory, stale outputs (including sidecars) are removed, and the
    /// temporaries are renamed into place. On failure no partial output
    /// remains.
    pub fn save(
        grid: &Grid,
        config: &RasterConfig,
        path: impl AsRef<Path>,
    ) -> Result<FormatResolution> {
        let path = path.as_ref();
        let resolution = Self::determine_format(path)?;
        let format = resolution.format;

        let tmp_primary = temp_name(path);
        let result = match format {
            RasterFormat::ArcGisBinary => arc_binary::write(grid, config, &tmp_primary),
            RasterFormat::ArcGisAscii => arc_ascii::write(grid, config, &tmp_primary),
            RasterFormat::GeoTiff => geotiff::write(grid, config, &tmp_primary),
            RasterFormat::Whitebox => whitebox::write(grid, config, &tmp_primary),
            RasterFormat::GrassAscii => grass_ascii::write(grid, config, &tmp_primary),
            RasterFormat::Idrisi => idrisi::write(grid, config, &tmp_primary),
        };

        let pairs: Vec<(PathBuf, PathBuf)> = file_set(format, path)
            .into_iter()
            .map(|final_path| (temp_name(&final_path), final_path))
            .collect();

        if let Err(e) = result {
            for (tmp, _) in &pairs {
                let _ = fs::remove_file(tmp);
            }
            return Err(e);
        }

        for (_, final_path) in &pairs {
            if final_path.exists() {
                fs::remove_file(final_path).map_err(|e| Error::WriteError {
                    path: final_path.clone(),
                    reason: format!("cannot remove stale output: {e}"),
                })?;
            }
        }
        for (tmp, final_path) in &pairs {
            fs::rename(tmp, final_path).map_err(|e| Error::WriteError {
                path: final_path.clone(),
                reason: format!("cannot move temporary into place: {e}"),
            })?;
        }
        Ok(resolution)
    }

    /// Table of supported formats and their extensions.
    pub fn supported_formats() -> Vec<(&'static str, &'static [&'static str])> {
        RasterFormat::all()
            .iter()
            .map(|f| (f.name(), f.extensions()))
            .collect()
    }

    /// Resolve the format for a path from its extension and, for ambiguous
    /// `.txt` files that exist, from the header keywords.
    pub fn determine_format(path: &Path) -> Result<FormatResolution> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let candidates: Vec<RasterFormat> = RasterFormat::all()
            .iter()
            .copied()
            .filter(|f| f.extensions().contains(&ext.as_str()))
            .collect();

        match candidates.len() {
            0 => Err(Error::UnsupportedFormat(path.to_path_buf())),
            1 => Ok(FormatResolution {
                format: candidates[0],
                ambiguous: false,
            }),
            _ => {
                if path.exists() {
                    // the header keywords decide for an existing file
                    return match sniff_text_header(path)? {
                        Some(format) => Ok(FormatResolution {
                            format,
                            ambiguous: false,
                        }),
                        None => Err(Error::MultiplePossibleFormats(path.to_path_buf())),
                    };
                }
                // Nothing to sniff yet; first candidate wins, flagged so
                // callers can warn and proceed.
                Ok(FormatResolution {
                    format: candidates[0],
                    ambiguous: true,
                })
            }
        }
    }
}

/// Read up to six header lines of an existing text raster and look for the
/// keywords that tell the two ASCII dialects apart.
fn sniff_text_header(path: &Path) -> Result<Option<RasterFormat>> {
    let file = fs::File::open(path).map_err(|e| Error::ReadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let reader = BufReader::new(file);
    let mut contents = String::new();
    for line in reader.lines().take(6) {
        let line = line.map_err(|e| Error::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        contents.push_str(&line.to_ascii_lowercase());
        contents.push('\n');
    }

    if contents.contains("ncols")
        && contents.contains("nrows")
        && contents.contains("xll")
        && contents.contains("yll")
    {
        return Ok(Some(RasterFormat::ArcGisAscii));
    }
    if contents.contains("north")
        && contents.contains("south")
        && contents.contains("east")
        && contents.contains("west")
        && contents.contains("rows")
        && contents.contains("cols")
    {
        return Ok(Some(RasterFormat::GrassAscii));
    }
    Ok(None)
}

/// The complete set of files a save produces, primary path first.
fn file_set(format: RasterFormat, path: &Path) -> Vec<PathBuf> {
    match format {
        RasterFormat::ArcGisBinary => vec![
            path.with_extension("flt"),
            path.with_extension("hdr"),
        ],
        RasterFormat::Whitebox => vec![
            path.with_extension("dep"),
            path.with_extension("tas"),
        ],
        RasterFormat::Idrisi => vec![
            path.with_extension("rst"),
            path.with_extension("rdc"),
        ],
        _ => vec![path.to_path_buf()],
    }
}

/// Temporary name beside the final path, keeping the extension so sidecar
/// derivation inside the codecs still works.
fn temp_name(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".tmp~{file_name}"))
}

pub(crate) use helpers::*;

mod helpers {
    use super::*;

    /// Shared header-scanning helper: lowercased line plus original for
    /// value extraction, with 1-based line numbers for error context.
    pub(crate) fn read_header_lines(path: &Path) -> Result<Vec<String>> {
        let content = fs::read_to_string(path).map_err(|e| Error::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(content
            .replace("\r\n", "\n")
            .split('\n')
            .map(|s| s.to_string())
            .collect())
    }

    pub(crate) fn malformed(path: &Path, line: usize, keyword: &str) -> Error {
        Error::MalformedHeader {
            path: path.to_path_buf(),
            line,
            keyword: keyword.to_string(),
        }
    }

    /// Parse the last whitespace-separated token of a header line.
    pub(crate) fn last_token(line: &str) -> Option<&str> {
        line.split_whitespace().last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_extension_dispatch() {
        let r = RasterStore::determine_format(Path::new("dem.tif")).unwrap();
        assert_eq!(r.format, RasterFormat::GeoTiff);
        assert!(!r.ambiguous);

        let r = RasterStore::determine_format(Path::new("dem.dep")).unwrap();
        assert_eq!(r.format, RasterFormat::Whitebox);

        let r = RasterStore::determine_format(Path::new("dem.rdc")).unwrap();
        assert_eq!(r.format, RasterFormat::Idrisi);

        assert!(matches!(
            RasterStore::determine_format(Path::new("dem.xyz")),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_ambiguous_txt_defaults_to_first_candidate() {
        let r = RasterStore::determine_format(Path::new("missing_output.txt")).unwrap();
        assert_eq!(r.format, RasterFormat::ArcGisAscii);
        assert!(r.ambiguous);
    }

    #[test]
    fn test_txt_sniffing() {
        let dir = tempfile::tempdir().unwrap();

        let arc = dir.path().join("arc.txt");
        let mut f = fs::File::create(&arc).unwrap();
        writeln!(f, "NCOLS 2\nNROWS 2\nXLLCORNER 0\nYLLCORNER 0\nCELLSIZE 1\nNODATA_VALUE -9999").unwrap();
        let r = RasterStore::determine_format(&arc).unwrap();
        assert_eq!(r.format, RasterFormat::ArcGisAscii);
        assert!(!r.ambiguous);

        let grass = dir.path().join("grass.txt");
        let mut f = fs::File::create(&grass).unwrap();
        writeln!(f, "north: 2\nsouth: 0\neast: 2\nwest: 0\nrows: 2\ncols: 2").unwrap();
        let r = RasterStore::determine_format(&grass).unwrap();
        assert_eq!(r.format, RasterFormat::GrassAscii);
    }

    #[test]
    fn test_unrecognisable_txt_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mystery.txt");
        fs::write(&path, "just some text\nwith no raster header\n").unwrap();
        assert!(matches!(
            RasterStore::determine_format(&path),
            Err(Error::MultiplePossibleFormats(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            RasterStore::load("no_such_file.tif"),
            Err(Error::FileDoesNotExist(_))
        ));
    }

    #[test]
    fn test_file_sets() {
        let set = file_set(RasterFormat::Whitebox, Path::new("/data/dem.dep"));
        assert_eq!(set.len(), 2);
        assert!(set[0].ends_with("dem.dep"));
        assert!(set[1].ends_with("dem.tas"));

        let set = file_set(RasterFormat::GeoTiff, Path::new("/data/dem.tif"));
        assert_eq!(set, vec![PathBuf::from("/data/dem.tif")]);
    }

    #[test]
    fn test_temp_name_keeps_extension() {
        let tmp = temp_name(Path::new("/data/dem.dep"));
        assert_eq!(tmp, PathBuf::from("/data/.tmp~dem.dep"));
    }
}
