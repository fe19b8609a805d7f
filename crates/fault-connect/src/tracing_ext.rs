//! Tracing helpers for the connection workflow.
//!
//! Enable output by installing a subscriber in the host application, for
//! example with `RUST_LOG=fault_connect=debug`. Targets used here:
//!
//! - `fault_connect::timing`: operation start and duration
//! - `fault_connect::surface`: surface state snapshots
//! - `fault_connect::seal`: sealing outcomes

use std::time::Instant;
use tracing::{Span, debug, info, trace, warn};

use crate::error::ConnectError;
use crate::types::Surface;

/// A timer that logs the duration of an operation when dropped.
///
/// ```rust,ignore
/// let _timer = OperationTimer::new("pad_detachment");
/// // ... work ...
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTimer {
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("connect_operation", operation = name);
        debug!(target: "fault_connect::timing", operation = name, "Starting operation");
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Timer with surface size fields attached to its span.
    pub fn with_context(name: &'static str, nodes: usize, triangles: usize) -> Self {
        let span = tracing::info_span!(
            "connect_operation",
            operation = name,
            nodes = nodes,
            triangles = triangles
        );
        debug!(
            target: "fault_connect::timing",
            operation = name,
            nodes = nodes,
            triangles = triangles,
            "Starting operation"
        );
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        info!(
            target: "fault_connect::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", self.elapsed_ms()),
            "Operation completed"
        );
    }
}

/// Log a surface snapshot at debug level.
pub fn log_surface_stats(surface: &Surface, context: &str) {
    let bounds = surface.mesh.bounds();
    let (w, h, d) = bounds
        .map(|b| (b.width(), b.height(), b.depth()))
        .unwrap_or_default();
    debug!(
        target: "fault_connect::surface",
        context = context,
        id = surface.id,
        nodes = surface.mesh.node_count(),
        triangles = surface.mesh.triangle_count(),
        staged = surface.staged_count(),
        has_plane = surface.plane.is_some(),
        dimensions = format!("{:.2} x {:.2} x {:.2}", w, h, d),
        "Surface state"
    );
    if let Some(b) = bounds {
        trace!(
            target: "fault_connect::surface",
            id = surface.id,
            min_z = format!("{:.4}", b.min.z),
            max_z = format!("{:.4}", b.max.z),
            "Surface vertical range"
        );
    }
}

/// Log the outcome of a sealing attempt.
pub fn log_seal_result(faults: usize, lines: usize, error: Option<&ConnectError>) {
    match error {
        None => info!(
            target: "fault_connect::seal",
            faults = faults,
            lines = lines,
            "Faults connected to detachment"
        ),
        Some(err) => warn!(
            target: "fault_connect::seal",
            faults = faults,
            code = err.code().as_str(),
            error = %err,
            "Fault connection failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_meshes::flat_grid;

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::with_context("test_operation", 4, 2);
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10.0);
    }

    #[test]
    fn test_log_helpers_do_not_panic() {
        log_surface_stats(&Surface::from_mesh(3, flat_grid(2, 1.0, 0.0)), "test");
        log_surface_stats(&Surface::from_points(4, &[]), "empty");
        log_seal_result(1, 1, None);
        log_seal_result(1, 0, Some(&ConnectError::no_seal("test")));
    }
}
