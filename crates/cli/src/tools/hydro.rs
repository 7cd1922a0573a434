//! Hydrology tools

use anyhow::Result;
use hydrogrid_algorithms::hydrology::{
    breach_depressions, breach_streams, d8_flow_accumulation, fd8_flow_accumulation,
    fill_depressions, BreachParams, D8Params, Fd8Params, FillParams,
};
use hydrogrid_core::{DataKind, RasterConfig};

use crate::registry::parse;
use crate::registry::{ArgKind, ArgSpec, Tool};
use crate::session::Session;

use super::{load_input, progress, save_output};

pub struct BreachDepressions;

impl Tool for BreachDepressions {
    fn name(&self) -> &'static str {
        "BreachDepressions"
    }

    fn description(&self) -> &'static str {
        "Removes depressions in DEMs using selective breaching"
    }

    fn args(&self) -> Vec<ArgSpec> {
        vec![
            ArgSpec {
                name: "input_dem",
                kind: ArgKind::File,
                description: "Input DEM file",
            },
            ArgSpec {
                name: "output",
                kind: ArgKind::NewFile,
                description: "Output DEM file",
            },
            ArgSpec {
                name: "max_depth",
                kind: ArgKind::Float,
                description: "Maximum breach channel depth (-1 to ignore)",
            },
            ArgSpec {
                name: "max_length",
                kind: ArgKind::Integer,
                description: "Maximum breach channel length in cells (-1 to ignore)",
            },
            ArgSpec {
                name: "constrained",
                kind: ArgKind::Bool,
                description: "Use constrained breaching",
            },
            ArgSpec {
                name: "post_fill",
                kind: ArgKind::Bool,
                description: "Fill the pits the limits left unbreached",
            },
        ]
    }

    fn run(&self, session: &Session, args: &[String]) -> Result<()> {
        let specs = self.args();
        let input = parse::require(args, &specs, 0)?;
        let output = parse::require(args, &specs, 1)?;

        let mut params = BreachParams::default();
        if let Some(v) = parse::optional(args, 2) {
            let depth = parse::float(v, "max_depth")?;
            if depth >= 0.0 {
                params.max_depth = depth;
            }
        }
        if let Some(v) = parse::optional(args, 3) {
            let length = parse::float(v, "max_length")?;
            if length >= 0.0 {
                params.max_length = length as usize;
            }
        }
        if let Some(v) = parse::optional(args, 4) {
            params.constrained = parse::boolean(v, "constrained")?;
        }
        if let Some(v) = parse::optional(args, 5) {
            params.post_breach_fill = parse::boolean(v, "post_fill")?;
        }

        let (dem, in_config, _) = load_input(session, input)?;
        let outcome = breach_depressions(&dem, &params, &progress(session, "Breaching DEM"))?;
        if outcome.num_unsolved_pits > 0 {
            tracing::warn!(
                "{} of {} pits were not breached within the limits",
                outcome.num_unsolved_pits,
                outcome.num_pits
            );
        }

        let mut config = RasterConfig::derived_from(&in_config);
        config.data_kind = DataKind::Float32;
        config.preferred_palette = in_config.preferred_palette.clone();
        config.add_metadata_entry("Created by BreachDepressions");
        save_output(session, output, &outcome.dem, &config)
    }
}

pub struct BreachStreams;

impl Tool for BreachStreams {
    fn name(&self) -> &'static str {
        "BreachStreams"
    }

    fn description(&self) -> &'static str {
        "Breaches depressions along a mapped stream network"
    }

    fn args(&self) -> Vec<ArgSpec> {
        vec![
            ArgSpec {
                name: "input_dem",
                kind: ArgKind::File,
                description: "Input DEM file",
            },
            ArgSpec {
                name: "streams",
                kind: ArgKind::File,
                description: "Stream mask raster, conformant to the DEM",
            },
            ArgSpec {
                name: "output",
                kind: ArgKind::NewFile,
                description: "Output DEM file",
            },
        ]
    }

    fn run(&self, session: &Session, args: &[String]) -> Result<()> {
        let specs = self.args();
        let input = parse::require(args, &specs, 0)?;
        let streams_path = parse::require(args, &specs, 1)?;
        let output = parse::require(args, &specs, 2)?;

        let (dem, in_config, _) = load_input(session, input)?;
        let (streams, _, _) = load_input(session, streams_path)?;
        let outcome = breach_streams(&dem, &streams, &progress(session, "Breaching streams"))?;
        if outcome.num_unsolved_pits > 0 {
            tracing::warn!("{} stream pits left unresolved", outcome.num_unsolved_pits);
        }

        let mut config = RasterConfig::derived_from(&in_config);
        config.data_kind = DataKind::Float32;
        config.add_metadata_entry("Created by BreachStreams");
        save_output(session, output, &outcome.dem, &config)
    }
}

pub struct FillDepressions;

impl Tool for FillDepressions {
    fn name(&self) -> &'static str {
        "FillDepressions"
    }

    fn description(&self) -> &'static str {
        "Fills depressions in DEMs using priority-flood"
    }

    fn args(&self) -> Vec<ArgSpec> {
        vec![
            ArgSpec {
                name: "input_dem",
                kind: ArgKind::File,
                description: "Input DEM file",
            },
            ArgSpec {
                name: "output",
                kind: ArgKind::NewFile,
                description: "Output DEM file",
            },
            ArgSpec {
                name: "fix_flats",
                kind: ArgKind::Bool,
                description: "Apply a small gradient across filled flats",
            },
        ]
    }

    fn run(&self, session: &Session, args: &[String]) -> Result<()> {
        let specs = self.args();
        let input = parse::require(args, &specs, 0)?;
        let output = parse::require(args, &specs, 1)?;
        let mut params = FillParams::default();
        if let Some(v) = parse::optional(args, 2) {
            params.fix_flats = parse::boolean(v, "fix_flats")?;
        }

        let (dem, in_config, _) = load_input(session, input)?;
        let filled = fill_depressions(&dem, &params, &progress(session, "Filling DEM"))?;

        let mut config = RasterConfig::derived_from(&in_config);
        config.data_kind = DataKind::Float32;
        config.preferred_palette = in_config.preferred_palette.clone();
        config.display_minimum = in_config.display_minimum;
        config.display_maximum = in_config.display_maximum;
        config.add_metadata_entry("Created by FillDepressions");
        save_output(session, output, &filled, &config)
    }
}

pub struct D8FlowAccum;

impl Tool for D8FlowAccum {
    fn name(&self) -> &'static str {
        "D8FlowAccum"
    }

    fn description(&self) -> &'static str {
        "Performs D8 flow accumulation on a DEM"
    }

    fn args(&self) -> Vec<ArgSpec> {
        vec![
            ArgSpec {
                name: "input_dem",
                kind: ArgKind::File,
                description: "Input depressionless DEM file",
            },
            ArgSpec {
                name: "output",
                kind: ArgKind::NewFile,
                description: "Output accumulation file",
            },
            ArgSpec {
                name: "ln_transform",
                kind: ArgKind::Bool,
                description: "Log-transform the output",
            },
        ]
    }

    fn run(&self, session: &Session, args: &[String]) -> Result<()> {
        let specs = self.args();
        let input = parse::require(args, &specs, 0)?;
        let output = parse::require(args, &specs, 1)?;
        let mut params = D8Params::default();
        if let Some(v) = parse::optional(args, 2) {
            params.ln_transform = parse::boolean(v, "ln_transform")?;
        }

        let (dem, in_config, _) = load_input(session, input)?;
        let outcome = d8_flow_accumulation(&dem, &params, &progress(session, "Accumulating"))?;

        let mut config = RasterConfig::derived_from(&in_config);
        config.data_kind = DataKind::Float32;
        config.preferred_palette = "blueyellow.pal".to_string();
        config.add_metadata_entry("Created by D8FlowAccum");
        save_output(session, output, &outcome.accumulation, &config)
    }
}

pub struct Fd8FlowAccum;

impl Tool for Fd8FlowAccum {
    fn name(&self) -> &'static str {
        "FD8FlowAccum"
    }

    fn description(&self) -> &'static str {
        "Performs FD8 flow accumulation on a DEM"
    }

    fn args(&self) -> Vec<ArgSpec> {
        vec![
            ArgSpec {
                name: "input_dem",
                kind: ArgKind::File,
                description: "Input depressionless DEM file",
            },
            ArgSpec {
                name: "output",
                kind: ArgKind::NewFile,
                description: "Output accumulation file",
            },
            ArgSpec {
                name: "ln_transform",
                kind: ArgKind::Bool,
                description: "Log-transform the output",
            },
            ArgSpec {
                name: "parallel",
                kind: ArgKind::Bool,
                description: "Run the analysis in parallel",
            },
        ]
    }

    fn run(&self, session: &Session, args: &[String]) -> Result<()> {
        let specs = self.args();
        let input = parse::require(args, &specs, 0)?;
        let output = parse::require(args, &specs, 1)?;
        let mut params = Fd8Params::default();
        if let Some(v) = parse::optional(args, 2) {
            params.ln_transform = parse::boolean(v, "ln_transform")?;
        }
        if let Some(v) = parse::optional(args, 3) {
            params.parallel = parse::boolean(v, "parallel")?;
        }

        let (dem, in_config, _) = load_input(session, input)?;
        let accumulation =
            fd8_flow_accumulation(&dem, &params, &progress(session, "Accumulating"))?;

        let mut config = RasterConfig::derived_from(&in_config);
        config.data_kind = DataKind::Float32;
        config.preferred_palette = "blueyellow.pal".to_string();
        config.add_metadata_entry("Created by FD8FlowAccum");
        save_output(session, output, &accumulation, &config)
    }
}
