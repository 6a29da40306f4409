//! Slice-height sequencing.
//!
//! Heights are millimeters along the slicing axis. A run generates its
//! height sequence once, before any template or render work, and the
//! sequence is immutable from then on.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SliceError};

/// Relative tolerance on the inclusive upper bound, so a step that divides
/// the range exactly still lands on `end` despite float rounding.
const END_TOLERANCE: f64 = 1e-9;

/// Smallest usable step, matching the micrometer precision heights are
/// formatted at; anything finer would collapse distinct heights into the
/// same output path and `-D` value.
const MIN_STEP: f64 = 1e-6;

/// Ceiling on the number of slices a single run may resolve to.
const MAX_SLICES: usize = 1_000_000;

/// How consecutive slice heights are spaced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Spacing {
    /// Fixed distance in mm between consecutive slices.
    Step(f64),
    /// Approximate number of slices; the step is derived from the range.
    ///
    /// The realized count is not exact: when the derived step divides the
    /// range evenly, both endpoints are included and `count + 1` heights
    /// come out.
    Count(usize),
}

impl Spacing {
    /// Build a spacing from optional step and count arguments, rejecting
    /// ambiguous input.
    pub fn from_options(step: Option<f64>, count: Option<usize>) -> Result<Self> {
        match (step, count) {
            (Some(step), None) => Ok(Spacing::Step(step)),
            (None, Some(count)) => Ok(Spacing::Count(count)),
            (Some(_), Some(_)) => Err(SliceError::InvalidConfig(
                "specify either a step or a slice count, not both".into(),
            )),
            (None, None) => Err(SliceError::InvalidConfig(
                "either a step or a slice count is required".into(),
            )),
        }
    }
}

/// Validate the range and spacing and resolve the effective step in mm.
pub(crate) fn resolve_step(start: f64, end: f64, spacing: Spacing) -> Result<f64> {
    if !start.is_finite() || !end.is_finite() {
        return Err(SliceError::InvalidConfig(
            "start and end heights must be finite".into(),
        ));
    }
    if end <= start {
        return Err(SliceError::InvalidConfig(format!(
            "end height {end} must be greater than start height {start}"
        )));
    }

    let step = match spacing {
        Spacing::Step(step) => step,
        Spacing::Count(0) => {
            return Err(SliceError::InvalidConfig(
                "slice count must be at least 1".into(),
            ))
        }
        Spacing::Count(count) => (end - start) / count as f64,
    };
    if !step.is_finite() || step <= 0.0 {
        return Err(SliceError::InvalidConfig(format!(
            "slice step must be positive, got {step}"
        )));
    }
    if step < MIN_STEP {
        return Err(SliceError::InvalidConfig(format!(
            "slice step must be at least {MIN_STEP} mm, got {step}"
        )));
    }
    if (end - start) / step + END_TOLERANCE >= MAX_SLICES as f64 {
        return Err(SliceError::InvalidConfig(format!(
            "range and step resolve to more than {MAX_SLICES} slices"
        )));
    }
    Ok(step)
}

/// Generate the ordered slice heights for the closed range `[start, end]`.
///
/// Heights are `start + i * step` for `i = 0, 1, 2, ..`, bounded by `end`
/// inclusive. [`Spacing::Count`] derives the step as `(end - start) / count`
/// first. The result is strictly increasing and never empty. Steps finer
/// than a micrometer and ranges resolving to more than a million slices are
/// rejected as configuration errors.
pub fn generate_heights(start: f64, end: f64, spacing: Spacing) -> Result<Vec<f64>> {
    let step = resolve_step(start, end, spacing)?;
    let count = ((end - start) / step + END_TOLERANCE).floor() as usize;
    let mut heights: Vec<f64> = (0..=count).map(|i| start + i as f64 * step).collect();
    // The tolerance can land the final height a few ulps past `end`; pin it
    // back so every height stays inside the range.
    if let Some(last) = heights.last_mut() {
        if *last > end {
            *last = end;
        }
    }
    Ok(heights)
}

/// Format a height for file names and renderer arguments.
///
/// The height is rounded to micrometer precision first, so step arithmetic
/// noise never leaks into paths (`0.7`, not `0.7000000000000001`). Whole
/// numbers print without a decimal point (`5`, not `5.0`).
pub fn format_height(height: f64) -> String {
    let rounded = (height * 1e6).round() / 1e6;
    rounded.to_string()
}
