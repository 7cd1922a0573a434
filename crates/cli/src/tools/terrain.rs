//! Terrain statistics tools

use anyhow::Result;
use hydrogrid_algorithms::terrain::{
    aspect, deviation_from_mean, difference_from_mean, elevation_percentile, hillshade,
    max_elevation_deviation, mean_filter, HillshadeParams, MaxDeviationParams, MeanFilterParams,
    NeighbourhoodParams, PercentileParams,
};
use hydrogrid_core::{DataKind, RasterConfig};

use crate::registry::parse;
use crate::registry::{ArgKind, ArgSpec, Tool};
use crate::session::Session;

use super::{load_input, progress, save_output};

fn io_args() -> Vec<ArgSpec> {
    vec![
        ArgSpec {
            name: "input",
            kind: ArgKind::File,
            description: "Input raster file",
        },
        ArgSpec {
            name: "output",
            kind: ArgKind::NewFile,
            description: "Output raster file",
        },
    ]
}

fn radius_arg() -> ArgSpec {
    ArgSpec {
        name: "radius",
        kind: ArgKind::Integer,
        description: "Window radius in cells",
    }
}

pub struct DeviationFromMean;

impl Tool for DeviationFromMean {
    fn name(&self) -> &'static str {
        "DeviationFromMean"
    }

    fn description(&self) -> &'static str {
        "Deviation from mean elevation: (z - mean) / stdev over a window"
    }

    fn args(&self) -> Vec<ArgSpec> {
        let mut args = io_args();
        args.push(radius_arg());
        args
    }

    fn run(&self, session: &Session, args: &[String]) -> Result<()> {
        let specs = self.args();
        let input = parse::require(args, &specs, 0)?;
        let output = parse::require(args, &specs, 1)?;
        let mut params = NeighbourhoodParams::default();
        if let Some(v) = parse::optional(args, 2) {
            params.radius = parse::integer(v, "radius")?;
        }

        let (dem, in_config, _) = load_input(session, input)?;
        let result = deviation_from_mean(&dem, &params, &progress(session, "Analysing"))?;

        let mut config = RasterConfig::derived_from(&in_config);
        config.data_kind = DataKind::Float32;
        config.preferred_palette = "blue_white_red.plt".to_string();
        config.display_minimum = -2.58;
        config.display_maximum = 2.58;
        config.add_metadata_entry("Created by DeviationFromMean");
        config.add_metadata_entry(format!("Window size: {}", params.radius * 2 + 1));
        save_output(session, output, &result, &config)
    }
}

pub struct DifferenceFromMean;

impl Tool for DifferenceFromMean {
    fn name(&self) -> &'static str {
        "DifferenceFromMean"
    }

    fn description(&self) -> &'static str {
        "Difference from mean elevation: z - mean over a window"
    }

    fn args(&self) -> Vec<ArgSpec> {
        let mut args = io_args();
        args.push(radius_arg());
        args
    }

    fn run(&self, session: &Session, args: &[String]) -> Result<()> {
        let specs = self.args();
        let input = parse::require(args, &specs, 0)?;
        let output = parse::require(args, &specs, 1)?;
        let mut params = NeighbourhoodParams::default();
        if let Some(v) = parse::optional(args, 2) {
            params.radius = parse::integer(v, "radius")?;
        }

        let (dem, in_config, _) = load_input(session, input)?;
        let result = difference_from_mean(&dem, &params, &progress(session, "Analysing"))?;

        let mut config = RasterConfig::derived_from(&in_config);
        config.data_kind = DataKind::Float32;
        config.preferred_palette = "blue_white_red.plt".to_string();
        config.add_metadata_entry("Created by DifferenceFromMean");
        config.add_metadata_entry(format!("Window size: {}", params.radius * 2 + 1));
        save_output(session, output, &result, &config)
    }
}

pub struct ElevationPercentile;

impl Tool for ElevationPercentile {
    fn name(&self) -> &'static str {
        "ElevationPercentile"
    }

    fn description(&self) -> &'static str {
        "Local elevation percentile from an integral histogram"
    }

    fn args(&self) -> Vec<ArgSpec> {
        let mut args = io_args();
        args.push(radius_arg());
        args.push(ArgSpec {
            name: "num_bins",
            kind: ArgKind::Integer,
            description: "Number of equiprobable histogram bins",
        });
        args
    }

    fn run(&self, session: &Session, args: &[String]) -> Result<()> {
        let specs = self.args();
        let input = parse::require(args, &specs, 0)?;
        let output = parse::require(args, &specs, 1)?;
        let mut params = PercentileParams::default();
        if let Some(v) = parse::optional(args, 2) {
            params.radius = parse::integer(v, "radius")?;
        }
        if let Some(v) = parse::optional(args, 3) {
            params.num_bins = parse::integer(v, "num_bins")?;
        }

        let (dem, in_config, _) = load_input(session, input)?;
        let result = elevation_percentile(&dem, &params, &progress(session, "Ranking"))?;

        let mut config = RasterConfig::derived_from(&in_config);
        config.data_kind = DataKind::Float32;
        config.preferred_palette = "blue_white_red.plt".to_string();
        config.display_minimum = 0.0;
        config.display_maximum = 100.0;
        config.add_metadata_entry("Created by ElevationPercentile");
        config.add_metadata_entry(format!("Window size: {}", params.radius * 2 + 1));
        config.add_metadata_entry(format!("Num. histogram bins: {}", params.num_bins));
        save_output(session, output, &result, &config)
    }
}

pub struct MaxElevationDeviation;

impl Tool for MaxElevationDeviation {
    fn name(&self) -> &'static str {
        "MaxElevationDeviation"
    }

    fn description(&self) -> &'static str {
        "Maximum deviation from mean across a range of window sizes"
    }

    fn args(&self) -> Vec<ArgSpec> {
        vec![
            ArgSpec {
                name: "input",
                kind: ArgKind::File,
                description: "Input DEM file",
            },
            ArgSpec {
                name: "mag_output",
                kind: ArgKind::NewFile,
                description: "Output file for the deviation magnitude",
            },
            ArgSpec {
                name: "scale_output",
                kind: ArgKind::NewFile,
                description: "Output file for the signed scale of the maximum",
            },
            ArgSpec {
                name: "min_radius",
                kind: ArgKind::Integer,
                description: "Smallest window radius in cells",
            },
            ArgSpec {
                name: "max_radius",
                kind: ArgKind::Integer,
                description: "Largest window radius in cells",
            },
            ArgSpec {
                name: "step",
                kind: ArgKind::Integer,
                description: "Radius step between passes",
            },
        ]
    }

    fn run(&self, session: &Session, args: &[String]) -> Result<()> {
        let specs = self.args();
        let input = parse::require(args, &specs, 0)?;
        let mag_output = parse::require(args, &specs, 1)?;
        let scale_output = parse::require(args, &specs, 2)?;
        let mut params = MaxDeviationParams::default();
        if let Some(v) = parse::optional(args, 3) {
            params.min_radius = parse::integer(v, "min_radius")?;
        }
        if let Some(v) = parse::optional(args, 4) {
            params.max_radius = parse::integer(v, "max_radius")?;
        }
        if let Some(v) = parse::optional(args, 5) {
            params.step = parse::integer(v, "step")?;
        }

        let (dem, in_config, _) = load_input(session, input)?;
        let outcome = max_elevation_deviation(&dem, &params, &progress(session, "Sweeping"))?;

        let mut config = RasterConfig::derived_from(&in_config);
        config.data_kind = DataKind::Float32;
        config.preferred_palette = "blue_white_red.plt".to_string();
        config.display_minimum = -3.0;
        config.display_maximum = 3.0;
        config.add_metadata_entry("Created by MaxElevationDeviation");
        config.add_metadata_entry(format!("Min. window size: {}", params.min_radius * 2 + 1));
        config.add_metadata_entry(format!("Max. window size: {}", params.max_radius * 2 + 1));
        save_output(session, mag_output, &outcome.magnitude, &config)?;

        let mut scale_config = RasterConfig::derived_from(&in_config);
        scale_config.data_kind = DataKind::Float32;
        scale_config.preferred_palette = "imhof1.plt".to_string();
        scale_config.add_metadata_entry("Created by MaxElevationDeviation");
        save_output(session, scale_output, &outcome.scale, &scale_config)
    }
}

pub struct Hillshade;

impl Tool for Hillshade {
    fn name(&self) -> &'static str {
        "Hillshade"
    }

    fn description(&self) -> &'static str {
        "Hillshade with configurable sun position"
    }

    fn args(&self) -> Vec<ArgSpec> {
        let mut args = io_args();
        args.push(ArgSpec {
            name: "azimuth",
            kind: ArgKind::Float,
            description: "Sun azimuth, degrees clockwise from north",
        });
        args.push(ArgSpec {
            name: "altitude",
            kind: ArgKind::Float,
            description: "Sun altitude above the horizon, degrees",
        });
        args.push(ArgSpec {
            name: "z_factor",
            kind: ArgKind::Float,
            description: "Vertical exaggeration",
        });
        args
    }

    fn run(&self, session: &Session, args: &[String]) -> Result<()> {
        let specs = self.args();
        let input = parse::require(args, &specs, 0)?;
        let output = parse::require(args, &specs, 1)?;
        let mut params = HillshadeParams::default();
        if let Some(v) = parse::optional(args, 2) {
            params.azimuth = parse::float(v, "azimuth")?;
        }
        if let Some(v) = parse::optional(args, 3) {
            params.altitude = parse::float(v, "altitude")?;
        }
        if let Some(v) = parse::optional(args, 4) {
            params.z_factor = parse::float(v, "z_factor")?;
        }

        let (dem, in_config, _) = load_input(session, input)?;
        let result = hillshade(&dem, &params, &progress(session, "Shading"))?;

        let mut config = RasterConfig::derived_from(&in_config);
        config.data_kind = DataKind::Float32;
        config.preferred_palette = "grey.pal".to_string();
        config.add_metadata_entry("Created by Hillshade");
        save_output(session, output, &result, &config)
    }
}

pub struct Aspect;

impl Tool for Aspect {
    fn name(&self) -> &'static str {
        "Aspect"
    }

    fn description(&self) -> &'static str {
        "Aspect in degrees clockwise from north"
    }

    fn args(&self) -> Vec<ArgSpec> {
        let mut args = io_args();
        args.push(ArgSpec {
            name: "z_factor",
            kind: ArgKind::Float,
            description: "Vertical exaggeration",
        });
        args
    }

    fn run(&self, session: &Session, args: &[String]) -> Result<()> {
        let specs = self.args();
        let input = parse::require(args, &specs, 0)?;
        let output = parse::require(args, &specs, 1)?;
        let mut z_factor = 1.0;
        if let Some(v) = parse::optional(args, 2) {
            z_factor = parse::float(v, "z_factor")?;
        }

        let (dem, in_config, _) = load_input(session, input)?;
        let result = aspect(&dem, z_factor, &progress(session, "Analysing"))?;

        let mut config = RasterConfig::derived_from(&in_config);
        config.data_kind = DataKind::Float32;
        config.add_metadata_entry("Created by Aspect");
        save_output(session, output, &result, &config)
    }
}

pub struct MeanFilter;

impl Tool for MeanFilter {
    fn name(&self) -> &'static str {
        "MeanFilter"
    }

    fn description(&self) -> &'static str {
        "Smooths a raster with a rectangular mean filter"
    }

    fn args(&self) -> Vec<ArgSpec> {
        let mut args = io_args();
        args.push(ArgSpec {
            name: "size_x",
            kind: ArgKind::Integer,
            description: "Filter size in the X direction, cells",
        });
        args.push(ArgSpec {
            name: "size_y",
            kind: ArgKind::Integer,
            description: "Filter size in the Y direction, cells",
        });
        args
    }

    fn run(&self, session: &Session, args: &[String]) -> Result<()> {
        let specs = self.args();
        let input = parse::require(args, &specs, 0)?;
        let output = parse::require(args, &specs, 1)?;
        let mut params = MeanFilterParams::default();
        if let Some(v) = parse::optional(args, 2) {
            params.size_x = parse::integer(v, "size_x")?;
            params.size_y = params.size_x;
        }
        if let Some(v) = parse::optional(args, 3) {
            params.size_y = parse::integer(v, "size_y")?;
        }

        let (raster, in_config, _) = load_input(session, input)?;
        let result = mean_filter(&raster, &params, &progress(session, "Filtering"))?;

        let mut config = RasterConfig::derived_from(&in_config);
        config.data_kind = DataKind::Float32;
        config.preferred_palette = in_config.preferred_palette.clone();
        config.add_metadata_entry("Created by MeanFilter");
        save_output(session, output, &result, &config)
    }
}
