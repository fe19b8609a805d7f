//! fault-cli: Command-line interface for fault sealing and boundary editing.
//!
//! This tool exposes fault-connect and poly-edit from the command line,
//! reading and writing JSON files so it can be scripted.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=fault_connect=info` - Basic operation logging
//! - `RUST_LOG=fault_connect=debug` - Detailed progress logging
//! - `RUST_LOG=fault_connect::timing=debug` - Performance timing
//! - `RUST_LOG=poly_edit=debug` - Polygon edit details
//!
//! # Example
//!
//! ```bash
//! # Seal the faults of a scene and save the result
//! fault connect scene.json -o sealed.json
//!
//! # Link two points into a boundary
//! fault add-points boundary.json -o edited.json --point 9,5 --point 2,10.5
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;
mod scene;

use commands::{bracket, connect, poly};

/// fault - Seal faults to detachments and edit boundary polygons.
#[derive(Parser)]
#[command(name = "fault")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Pad faults and a detachment, then seal them together
    Connect {
        /// Scene file with the detachment and faults
        input: PathBuf,

        /// Write sealed surfaces and contact lines here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Grid spacing, overriding the scene and the computed value
        #[arg(long)]
        spacing: Option<f64>,
    },

    /// Interpolate a detachment between two bracketing surfaces by age
    Bracket {
        /// Scene file with the lower and upper surfaces and their ages
        input: PathBuf,

        /// Output mesh file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Insert points into the nearest boundary edges
    AddPoints {
        /// Polygon file
        input: PathBuf,

        /// Output polygon file
        #[arg(short, long)]
        output: PathBuf,

        /// Point to insert as X,Y (repeatable)
        #[arg(long = "point", value_parser = poly::parse_xy, required = true)]
        points: Vec<(f64, f64)>,

        /// Maximum points in the result
        #[arg(long)]
        max_points: Option<usize>,

        /// Maximum rings in the result
        #[arg(long)]
        max_components: Option<usize>,
    },

    /// Extend a boundary to reach the ends of a tie line
    TieLine {
        /// Polygon file
        input: PathBuf,

        /// Output polygon file
        #[arg(short, long)]
        output: PathBuf,

        /// First endpoint as X,Y
        #[arg(long, value_parser = poly::parse_xy)]
        from: (f64, f64),

        /// Second endpoint as X,Y
        #[arg(long, value_parser = poly::parse_xy)]
        to: (f64, f64),

        /// Maximum points in the result
        #[arg(long)]
        max_points: Option<usize>,

        /// Maximum rings in the result
        #[arg(long)]
        max_components: Option<usize>,
    },
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over -v flags
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "fault_connect=info,poly_edit=info",
            2 => "fault_connect=debug,poly_edit=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn report(e: &anyhow::Error) {
    if let Some(err) = e.downcast_ref::<fault_connect::ConnectError>() {
        eprintln!("{}: {}", "Error".red().bold(), err);
        eprintln!("  {}: {}", "Code".cyan(), err.code());
        eprintln!("  {}: {}", "Status".cyan(), err.legacy_status());
        eprintln!("  {}: {}", "Suggestion".green(), err.recovery_suggestion());
    } else if let Some(err) = e.downcast_ref::<poly_edit::PolyEditError>() {
        eprintln!("{}: {}", "Error".red().bold(), err);
        eprintln!("  {}: {}", "Code".cyan(), err.code());
        eprintln!("  {}: {}", "Suggestion".green(), err.recovery_suggestion());
    } else {
        eprintln!("{}: {}", "Error".red().bold(), e);
        for cause in e.chain().skip(1) {
            eprintln!("  {}: {}", "Caused by".yellow(), cause);
        }
    }
}

fn main() -> Result<()> {
    #[cfg(debug_assertions)]
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Connect {
            input,
            output,
            spacing,
        } => connect::run(input, output.as_deref(), *spacing, &cli),
        Commands::Bracket { input, output } => bracket::run(input, output, &cli),
        Commands::AddPoints {
            input,
            output,
            points,
            max_points,
            max_components,
        } => poly::run_add_points(input, output, points, *max_points, *max_components, &cli),
        Commands::TieLine {
            input,
            output,
            from,
            to,
            max_points,
            max_components,
        } => poly::run_tie_line(input, output, *from, *to, *max_points, *max_components, &cli),
    };

    if let Err(e) = &result {
        if !cli.quiet {
            report(e);
        }
        std::process::exit(1);
    }

    Ok(())
}
