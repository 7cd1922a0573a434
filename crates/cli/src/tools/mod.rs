//! Tool implementations over the algorithm crates

mod hydro;
mod info;
mod terrain;

use std::path::PathBuf;

use anyhow::{Context, Result};
use hydrogrid_core::io::RasterStore;
use hydrogrid_core::{Grid, ProgressReporter, RasterConfig};
use indicatif::{ProgressBar, ProgressStyle};

use crate::registry::Tool;
use crate::session::Session;

/// Every registered tool, construction order irrelevant.
pub fn all() -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(hydro::BreachDepressions),
        Box::new(hydro::BreachStreams),
        Box::new(hydro::FillDepressions),
        Box::new(hydro::D8FlowAccum),
        Box::new(hydro::Fd8FlowAccum),
        Box::new(terrain::DeviationFromMean),
        Box::new(terrain::DifferenceFromMean),
        Box::new(terrain::ElevationPercentile),
        Box::new(terrain::MaxElevationDeviation),
        Box::new(terrain::Hillshade),
        Box::new(terrain::Aspect),
        Box::new(terrain::MeanFilter),
        Box::new(info::Info),
    ]
}

/// Load an input raster, resolving the path against the session.
pub(crate) fn load_input(session: &Session, path: &str) -> Result<(Grid, RasterConfig, PathBuf)> {
    let resolved = session.resolve(path);
    let (grid, config) = RasterStore::load(&resolved)
        .with_context(|| format!("cannot read {}", resolved.display()))?;
    tracing::info!(
        "read {} ({} x {})",
        resolved.display(),
        grid.rows(),
        grid.columns()
    );
    Ok((grid, config, resolved))
}

/// Save an output raster; an ambiguous extension logs a warning but the
/// first matching format proceeds.
pub(crate) fn save_output(
    session: &Session,
    path: &str,
    grid: &Grid,
    config: &RasterConfig,
) -> Result<()> {
    let resolved = session.resolve(path);
    let resolution = RasterStore::save(grid, config, &resolved)
        .with_context(|| format!("cannot write {}", resolved.display()))?;
    if resolution.ambiguous {
        tracing::warn!(
            "{} matches several formats; wrote {}",
            resolved.display(),
            resolution.format.name()
        );
    }
    tracing::info!("wrote {}", resolved.display());
    Ok(())
}

/// Progress reporter wired to an indicatif bar when the session wants one.
pub(crate) fn progress(session: &Session, message: &'static str) -> ProgressReporter {
    if !session.show_progress {
        return ProgressReporter::silent();
    }
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:30}] {pos}%")
            .expect("static template"),
    );
    bar.set_message(message);
    ProgressReporter::with_callback(move |percent| bar.set_position(percent as u64))
}
