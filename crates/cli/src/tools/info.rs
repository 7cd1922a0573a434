//! Raster inspection tool

use anyhow::Result;

use crate::registry::parse;
use crate::registry::{ArgKind, ArgSpec, Tool};
use crate::session::Session;

use super::load_input;

pub struct Info;

impl Tool for Info {
    fn name(&self) -> &'static str {
        "Info"
    }

    fn description(&self) -> &'static str {
        "Prints the header and statistics of a raster file"
    }

    fn args(&self) -> Vec<ArgSpec> {
        vec![ArgSpec {
            name: "input",
            kind: ArgKind::File,
            description: "Input raster file",
        }]
    }

    fn run(&self, session: &Session, args: &[String]) -> Result<()> {
        let specs = self.args();
        let input = parse::require(args, &specs, 0)?;
        let (grid, config, path) = load_input(session, input)?;
        let env = grid.envelope();

        println!("File: {}", path.display());
        println!(
            "Dimensions: {} x {} ({} cells)",
            grid.columns(),
            grid.rows(),
            grid.num_cells()
        );
        println!(
            "Extent: N {} S {} E {} W {}",
            env.north, env.south, env.east, env.west
        );
        println!(
            "Cell size: {} x {}",
            grid.cell_size_x(),
            grid.cell_size_y()
        );
        println!("Data type: {:?}", config.data_kind);
        println!("NoData: {}", grid.nodata());
        if config.epsg_code != 0 {
            println!("EPSG: {}", config.epsg_code);
        }
        if !config.coordinate_ref_system_wkt.is_empty() {
            println!("CRS: {}", config.coordinate_ref_system_wkt);
        }
        match grid.min_max() {
            Some((min, max)) => println!("Range: {min} .. {max}"),
            None => println!("Range: no valid cells"),
        }
        println!(
            "Valid cells: {} of {}",
            grid.num_valid_cells(),
            grid.num_cells()
        );
        for entry in &config.metadata_entries {
            println!("Metadata: {entry}");
        }
        Ok(())
    }
}
