//! Shared output helpers for text and JSON modes.

use colored::Colorize;
use serde::Serialize;

use crate::OutputFormat;

/// Print a result value as pretty JSON.
pub fn print<T: Serialize>(value: &T, quiet: bool) {
    if quiet {
        return;
    }
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("{}: failed to serialize output: {}", "Error".red().bold(), e),
    }
}

/// One-line success message; silent in JSON mode.
pub fn success(message: &str, format: OutputFormat, quiet: bool) {
    if quiet || matches!(format, OutputFormat::Json) {
        return;
    }
    println!("{} {}", "✓".green().bold(), message);
}

/// One-line warning on stderr; silent in JSON mode.
pub fn warning(message: &str, format: OutputFormat, quiet: bool) {
    if quiet || matches!(format, OutputFormat::Json) {
        return;
    }
    eprintln!("{}: {}", "Warning".yellow().bold(), message);
}
