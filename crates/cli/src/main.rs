//! HydroGrid CLI - hydrological terrain analysis for DEMs

mod registry;
mod session;
mod tools;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use hydrogrid_core::io::RasterStore;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use registry::Registry;
use session::Session;

#[derive(Parser)]
#[command(name = "hydrogrid")]
#[command(author, version, about = "Hydrological terrain analysis for DEMs", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Working directory bare file names resolve against
    #[arg(short, long, global = true)]
    wd: Option<PathBuf>,

    /// Suppress progress bars
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available tools
    List,
    /// Show the help and argument table of one tool
    Help {
        /// Tool name (case-insensitive; unique prefixes resolve)
        tool: String,
    },
    /// Run a tool with positional arguments
    Run {
        /// Tool name (case-insensitive; unique prefixes resolve)
        tool: String,
        /// Tool arguments, in the order `help` lists them
        args: Vec<String>,
    },
    /// List the supported raster formats
    Formats,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mut session = match cli.wd {
        Some(wd) => Session::new(wd),
        None => Session::default(),
    };
    session.show_progress = !cli.quiet;

    let registry = Registry::new();

    let code = match cli.command {
        Commands::List => {
            for (name, description) in registry.list_tools() {
                println!("{name:<24} {description}");
            }
            0
        }
        Commands::Help { tool } => match registry.tool_help(&tool) {
            Ok(help) => {
                println!("{help}");
                0
            }
            Err(e) => {
                tracing::error!("{e}");
                2
            }
        },
        Commands::Run { tool, args } => registry.run_tool(&session, &tool, &args),
        Commands::Formats => {
            for (name, extensions) in RasterStore::supported_formats() {
                println!("{name:<22} .{}", extensions.join(" ."));
            }
            0
        }
    };

    ExitCode::from(code as u8)
}
