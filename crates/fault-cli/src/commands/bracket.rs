//! fault bracket command - interpolate a detachment between two surfaces.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use fault_connect::{FaultConnect, Outcome};
use serde::Serialize;

use crate::scene::{BracketScene, SurfaceOutput, load_json, save_json};
use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct BracketSummary {
    input: String,
    output: String,
    status: i32,
    nodes: usize,
    triangles: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    z_range: Option<[f64; 2]>,
}

pub fn run(input: &Path, output_path: &Path, cli: &Cli) -> Result<()> {
    let scene: BracketScene = load_json(input)?;

    let mut fc = FaultConnect::new()
        .with_params(scene.params.clone())
        .context("Invalid bracket parameters")?;
    fc.set_detachment_lower_surface(&scene.lower.to_trimesh()?)?;
    fc.set_detachment_upper_surface(&scene.upper.to_trimesh()?)?;

    let outcome = fc.calc_detachment(scene.lower_age, scene.upper_age, scene.age)?;
    let calculated = match (outcome, fc.calculated_detachment()) {
        (Outcome::Applied, Some(surface)) => surface,
        _ => {
            output::warning(
                "No smooth surface fits between the bracketing surfaces",
                cli.format,
                cli.quiet,
            );
            if matches!(cli.format, OutputFormat::Json) {
                output::print(
                    &BracketSummary {
                        input: input.display().to_string(),
                        output: output_path.display().to_string(),
                        status: Outcome::NotReady.legacy_status(),
                        nodes: 0,
                        triangles: 0,
                        z_range: None,
                    },
                    cli.quiet,
                );
            }
            return Ok(());
        }
    };

    save_json(output_path, &SurfaceOutput::from(&calculated))?;

    let summary = BracketSummary {
        input: input.display().to_string(),
        output: output_path.display().to_string(),
        status: outcome.legacy_status(),
        nodes: calculated.mesh.node_count(),
        triangles: calculated.mesh.triangle_count(),
        z_range: calculated.mesh.bounds().map(|b| [b.min.z, b.max.z]),
    };

    match cli.format {
        OutputFormat::Json => output::print(&summary, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                output::success(
                    &format!("Interpolated detachment saved to {}", output_path.display()),
                    cli.format,
                    cli.quiet,
                );
                println!("  {}: {}", "Nodes".cyan(), summary.nodes);
                println!("  {}: {}", "Triangles".cyan(), summary.triangles);
                if let Some([lo, hi]) = summary.z_range {
                    println!("  {}: {:.3} .. {:.3}", "Elevation".cyan(), lo, hi);
                }
            }
        }
    }

    Ok(())
}
