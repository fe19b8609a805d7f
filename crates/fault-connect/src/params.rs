//! Tunable parameters for padding, sealing and bracket interpolation.
//!
//! Defaults reproduce the numeric behaviour the connection workflow has
//! always had; every magic number lives here as a named constant.

use serde::{Deserialize, Serialize};

use crate::error::{ConnectError, ConnectResult};

/// Detachment edge lengths are divided by this to get the grid spacing.
/// Roughly a third of the edges of a right-isoceles triangulation are
/// diagonals, which inflates the mean edge length.
pub const EDGE_LENGTH_CORRECTION: f64 = 1.13;

/// Initial cap on the normal z component of triangles used to pad a fault.
pub const MAX_Z_NORMAL: f64 = 0.95;
/// Factor applied to the normal cap after a failed collection pass.
pub const Z_NORMAL_RELAX: f64 = 1.05;
/// Hard upper limit on the normal cap.
pub const MAX_Z_NORMAL_CAP: f64 = 0.99;
/// Collection passes tried before a fault is declared degenerate.
pub const MAX_NORMAL_ITERATIONS: usize = 10;
/// Upper bound on the number of low anchor points.
pub const MAX_LOW_POINTS: usize = 100;
/// Fraction of the detachment footprint added on every side when padding.
pub const DETACHMENT_PAD_FRACTION: f64 = 0.01;
/// Fault padding smooths once when it has more points than this.
pub const SMOOTH_POINT_THRESHOLD: usize = 200;

/// Smoothing passes tried by the bracket interpolation.
pub const MAX_SMOOTH_PASSES: usize = 9;
/// Fraction of the bracket gap a smoothed node must stay inside.
pub const BRACKET_CLAMP_FRACTION: f64 = 0.01;
/// Scale applied to the minimum gap when biasing toward one bracket.
pub const BRACKET_SHIFT_FACTOR: f64 = 1.8;
/// Age fractions within this of one half are not biased.
pub const AGE_FRACTION_DEADBAND: f64 = 0.01;

/// Chunk by which the fault lists grow.
pub const FAULT_LIST_CHUNK: usize = 10;

/// Spacing values above this are treated as unset.
pub const MAX_VALID_SPACING: f64 = 1.0e20;

/// Which of a raw intersection line's two owner ids becomes its fault id
/// when both are non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerIdPolicy {
    /// Take the first id, falling back to the second when the first is negative.
    #[default]
    PreferFirst,
    /// Take the second id, falling back to the first when the second is negative.
    PreferSecond,
}

impl OwnerIdPolicy {
    /// Pick the fault id for a line owned by `ids`; `-1` when neither is usable.
    pub fn select(self, ids: [i32; 2]) -> i32 {
        let (primary, secondary) = match self {
            OwnerIdPolicy::PreferFirst => (ids[0], ids[1]),
            OwnerIdPolicy::PreferSecond => (ids[1], ids[0]),
        };
        if primary >= 0 {
            primary
        } else if secondary >= 0 {
            secondary
        } else {
            -1
        }
    }
}

/// Parameters for padding faults and the detachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PadParams {
    /// Initial cap on triangle normal z used to pick dipping facets.
    pub max_z_normal: f64,
    /// Multiplier applied to the cap after a pass finds too few points.
    pub z_normal_relax: f64,
    /// Upper limit for the relaxed cap.
    pub max_z_normal_cap: f64,
    /// Passes before giving up on a fault.
    pub max_normal_iterations: usize,
    /// Maximum number of low anchor points.
    pub max_low_points: usize,
    /// Detachment footprint expansion per side.
    pub detachment_pad_fraction: f64,
    /// Fault padding smooths once above this many points.
    pub smooth_point_threshold: usize,
    /// Extra depth below the cumulative minimum z the downward extension
    /// must reach, as a fraction of the cumulative z range.
    pub depth_margin_fraction: f64,
    /// Longest downward extension, as a multiple of the fault's extent.
    pub max_extension_factor: f64,
    /// Upper bound on either fault grid dimension.
    pub max_fault_grid_dimension: usize,
}

impl Default for PadParams {
    fn default() -> Self {
        Self {
            max_z_normal: MAX_Z_NORMAL,
            z_normal_relax: Z_NORMAL_RELAX,
            max_z_normal_cap: MAX_Z_NORMAL_CAP,
            max_normal_iterations: MAX_NORMAL_ITERATIONS,
            max_low_points: MAX_LOW_POINTS,
            detachment_pad_fraction: DETACHMENT_PAD_FRACTION,
            smooth_point_threshold: SMOOTH_POINT_THRESHOLD,
            depth_margin_fraction: 0.05,
            max_extension_factor: 10.0,
            max_fault_grid_dimension: 1000,
        }
    }
}

/// Parameters for the bracketed detachment calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BracketParams {
    pub max_smooth_passes: usize,
    pub clamp_fraction: f64,
    pub shift_factor: f64,
    pub age_fraction_deadband: f64,
}

impl Default for BracketParams {
    fn default() -> Self {
        Self {
            max_smooth_passes: MAX_SMOOTH_PASSES,
            clamp_fraction: BRACKET_CLAMP_FRACTION,
            shift_factor: BRACKET_SHIFT_FACTOR,
            age_fraction_deadband: AGE_FRACTION_DEADBAND,
        }
    }
}

/// All parameters of a [`FaultConnect`](crate::FaultConnect) instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectParams {
    pub pad: PadParams,
    pub bracket: BracketParams,
    pub owner_id_policy: OwnerIdPolicy,
}

impl ConnectParams {
    /// Set the intersection line owner id policy.
    pub fn with_owner_id_policy(mut self, policy: OwnerIdPolicy) -> Self {
        self.owner_id_policy = policy;
        self
    }

    /// Set the padding parameters.
    pub fn with_pad(mut self, pad: PadParams) -> Self {
        self.pad = pad;
        self
    }

    /// Set the bracket parameters.
    pub fn with_bracket(mut self, bracket: BracketParams) -> Self {
        self.bracket = bracket;
        self
    }

    /// Reject values the algorithms cannot work with.
    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    pub fn validate(&self) -> ConnectResult<()> {
        let pad = &self.pad;
        if !(pad.max_z_normal > 0.0 && pad.max_z_normal <= 1.0) {
            return Err(invalid("max_z_normal", "must be in (0, 1]"));
        }
        if !(pad.max_z_normal_cap >= pad.max_z_normal && pad.max_z_normal_cap <= 1.0) {
            return Err(invalid("max_z_normal_cap", "must be in [max_z_normal, 1]"));
        }
        if pad.z_normal_relax < 1.0 {
            return Err(invalid("z_normal_relax", "must be at least 1"));
        }
        if pad.max_normal_iterations == 0 {
            return Err(invalid("max_normal_iterations", "must be positive"));
        }
        if pad.max_low_points == 0 {
            return Err(invalid("max_low_points", "must be positive"));
        }
        if !(pad.detachment_pad_fraction >= 0.0) {
            return Err(invalid("detachment_pad_fraction", "must be non-negative"));
        }
        if pad.max_fault_grid_dimension < 2 {
            return Err(invalid("max_fault_grid_dimension", "must be at least 2"));
        }
        let bracket = &self.bracket;
        if bracket.max_smooth_passes == 0 {
            return Err(invalid("max_smooth_passes", "must be positive"));
        }
        if !(bracket.clamp_fraction > 0.0 && bracket.clamp_fraction < 0.5) {
            return Err(invalid("clamp_fraction", "must be in (0, 0.5)"));
        }
        if !(bracket.shift_factor >= 0.0 && bracket.shift_factor < 2.0) {
            return Err(invalid("shift_factor", "must be in [0, 2)"));
        }
        Ok(())
    }
}

fn invalid(name: &'static str, details: &str) -> ConnectError {
    ConnectError::InvalidParams {
        name,
        details: details.to_string(),
    }
}
