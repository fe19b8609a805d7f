//! fault add-points / tie-line commands - edit boundary polygons.
//!
//! Polygon files hold a packed polygon set with arbitrary JSON tags:
//! `{ "x": [..], "y": [..], "tags": [..], "components_per_polygon": [..],
//! "points_per_component": [..] }`.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use poly_edit::{EditOutcome, OutputLimits, PackedPolygons, PolyEdit, TaggedPoint};
use serde::Serialize;
use serde_json::Value;

use crate::scene::{load_json, save_json};
use crate::{Cli, OutputFormat, output};

type Polygons = PackedPolygons<Value>;

#[derive(Serialize)]
struct EditSummary {
    input: String,
    output: String,
    inserted: usize,
    skipped: usize,
    polygons: usize,
    components: usize,
    points: usize,
}

/// Parse `X,Y` into a coordinate pair.
pub fn parse_xy(s: &str) -> std::result::Result<(f64, f64), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y but got `{}`", s))?;
    let x = x.trim().parse::<f64>().map_err(|e| format!("bad X in `{}`: {}", s, e))?;
    let y = y.trim().parse::<f64>().map_err(|e| format!("bad Y in `{}`: {}", s, e))?;
    Ok((x, y))
}

fn limits(max_points: Option<usize>, max_components: Option<usize>) -> OutputLimits {
    OutputLimits::new(
        max_points.unwrap_or(usize::MAX),
        max_components.unwrap_or(usize::MAX),
    )
}

pub fn run_add_points(
    input: &Path,
    output_path: &Path,
    points: &[(f64, f64)],
    max_points: Option<usize>,
    max_components: Option<usize>,
    cli: &Cli,
) -> Result<()> {
    let polys: Polygons = load_json(input)?;
    let points: Vec<TaggedPoint<Value>> = points
        .iter()
        .map(|&(x, y)| TaggedPoint::new(x, y, Value::Null))
        .collect();

    let outcome = PolyEdit::new().add_points_to_boundary(
        &polys,
        &points,
        &limits(max_points, max_components),
    )?;
    finish(input, output_path, outcome, "points added", cli)
}

pub fn run_tie_line(
    input: &Path,
    output_path: &Path,
    from: (f64, f64),
    to: (f64, f64),
    max_points: Option<usize>,
    max_components: Option<usize>,
    cli: &Cli,
) -> Result<()> {
    let polys: Polygons = load_json(input)?;
    let outcome = PolyEdit::new().add_tie_line_to_boundary(
        &polys,
        TaggedPoint::new(from.0, from.1, Value::Null),
        TaggedPoint::new(to.0, to.1, Value::Null),
        &limits(max_points, max_components),
    )?;
    finish(input, output_path, outcome, "tie line endpoints linked", cli)
}

fn finish(
    input: &Path,
    output_path: &Path,
    outcome: EditOutcome<Value>,
    what: &str,
    cli: &Cli,
) -> Result<()> {
    save_json(output_path, &outcome.polygons)?;

    let summary = EditSummary {
        input: input.display().to_string(),
        output: output_path.display().to_string(),
        inserted: outcome.inserted,
        skipped: outcome.skipped,
        polygons: outcome.polygons.polygon_count(),
        components: outcome.polygons.component_count(),
        points: outcome.polygons.point_count(),
    };

    match cli.format {
        OutputFormat::Json => output::print(&summary, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                output::success(
                    &format!("{} {}, saved to {}", summary.inserted, what, summary.output),
                    cli.format,
                    cli.quiet,
                );
                if summary.skipped > 0 {
                    println!("  {}: {}", "Skipped".yellow(), summary.skipped);
                }
                println!(
                    "  {}: {} polygons, {} rings, {} points",
                    "Result".cyan(),
                    summary.polygons,
                    summary.components,
                    summary.points
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_xy() {
        assert_eq!(parse_xy("1.5,-2").unwrap(), (1.5, -2.0));
        assert_eq!(parse_xy(" 3 , 4 ").unwrap(), (3.0, 4.0));
        assert!(parse_xy("3").is_err());
        assert!(parse_xy("a,4").is_err());
    }

    #[test]
    fn test_polygon_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("square.json");
        std::fs::write(
            &input,
            r#"{
                "x": [0, 10, 10, 0, 0],
                "y": [0, 0, 10, 10, 0],
                "tags": ["a", "b", "c", "d", "a"],
                "components_per_polygon": [1],
                "points_per_component": [5]
            }"#,
        )
        .unwrap();

        let polys: Polygons = load_json(&input).unwrap();
        let outcome = PolyEdit::new()
            .add_points_to_boundary(
                &polys,
                &[TaggedPoint::new(9.0, 5.0, Value::Null)],
                &limits(None, None),
            )
            .unwrap();

        let output = dir.path().join("out.json");
        save_json(&output, &outcome.polygons).unwrap();
        let back: Polygons = load_json(&output).unwrap();
        assert_eq!(back.points_per_component, vec![6]);
        assert_eq!(back.tags[2], Value::Null);
        assert_eq!(back.tags[3], Value::from("c"));
    }
}
