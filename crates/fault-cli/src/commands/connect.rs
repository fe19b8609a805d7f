//! fault connect command - seal faults against a detachment.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use fault_connect::{FaultConnect, Outcome, SurfacePlane};
use serde::Serialize;

use crate::scene::{ConnectOutput, ConnectScene, ContactLine, SurfaceOutput, load_json, save_json};
use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct ConnectSummary {
    input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    status: i32,
    input_faults: usize,
    connected_faults: usize,
    contact_lines: usize,
    line_points: Vec<usize>,
}

/// Load every surface of `scene` into a fresh connector.
fn load_scene(scene: &ConnectScene) -> Result<FaultConnect> {
    let mut fc = FaultConnect::new()
        .with_params(scene.params.clone())
        .context("Invalid connect parameters")?;

    if scene.detachment.is_scattered() {
        fc.add_points_to_detachment(&scene.detachment.points())?;
    } else {
        fc.set_detachment(&scene.detachment.to_trimesh()?)?;
    }

    for fault in &scene.faults {
        if fault.surface.is_scattered() {
            fc.add_points_to_fault(fault.id, &fault.surface.points())?;
        } else {
            let plane = fault
                .plane
                .map(SurfacePlane::from_wire)
                .transpose()
                .with_context(|| format!("Invalid plane for fault {}", fault.id))?;
            fc.set_fault(fault.id, &fault.surface.to_trimesh()?, plane)?;
        }
    }

    if let Some(spacing) = scene.average_spacing {
        fc.set_average_spacing(spacing);
    }
    Ok(fc)
}

pub fn run(input: &Path, output_path: Option<&Path>, spacing: Option<f64>, cli: &Cli) -> Result<()> {
    let mut scene: ConnectScene = load_json(input)?;
    if spacing.is_some() {
        scene.average_spacing = spacing;
    }

    let mut fc = load_scene(&scene)?;
    let outcome = fc.connect_faults()?;

    let mut summary = ConnectSummary {
        input: input.display().to_string(),
        output: None,
        status: outcome.legacy_status(),
        input_faults: fc.input_fault_count(),
        connected_faults: fc.number_of_connected_faults(),
        contact_lines: fc.number_of_contact_lines(),
        line_points: (0..fc.number_of_contact_lines())
            .filter_map(|i| fc.fault_contact_line(i))
            .map(|line| line.point_count())
            .collect(),
    };

    if outcome == Outcome::Applied {
        if let (Some(path), Some(detachment)) = (output_path, fc.connected_detachment()) {
            let result = ConnectOutput {
                detachment: SurfaceOutput::from(&detachment),
                faults: (0..fc.number_of_connected_faults())
                    .filter_map(|i| fc.connected_fault(i))
                    .map(|f| SurfaceOutput::from(&f))
                    .collect(),
                contact_lines: (0..fc.number_of_contact_lines())
                    .filter_map(|i| fc.fault_contact_line(i))
                    .map(|l| ContactLine::from(&l))
                    .collect(),
            };
            save_json(path, &result)?;
            summary.output = Some(path.display().to_string());
        }
    }

    match cli.format {
        OutputFormat::Json => output::print(&summary, cli.quiet),
        OutputFormat::Text => {
            if outcome == Outcome::NotReady {
                output::warning(
                    "Nothing to connect: the detachment or faults lack enough data",
                    cli.format,
                    cli.quiet,
                );
                return Ok(());
            }
            if cli.quiet {
                return Ok(());
            }
            match &summary.output {
                Some(path) => output::success(
                    &format!("Sealed surfaces saved to {}", path),
                    cli.format,
                    cli.quiet,
                ),
                None => output::success("Faults connected", cli.format, cli.quiet),
            }
            println!(
                "  {}: {} of {}",
                "Connected faults".cyan(),
                summary.connected_faults,
                summary.input_faults
            );
            println!("  {}: {}", "Contact lines".cyan(), summary.contact_lines);
            for (i, points) in summary.line_points.iter().enumerate() {
                if let Some(line) = fc.fault_contact_line(i) {
                    println!(
                        "    {} {}: fault {}, {} points",
                        "line".dimmed(),
                        i,
                        line.fault_id,
                        points
                    );
                }
            }
        }
    }

    Ok(())
}
