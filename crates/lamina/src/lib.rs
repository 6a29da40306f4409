#![warn(missing_docs)]

//! Parallel cross-section slicing of solid models via an external renderer.
//!
//! lamina turns a 3D OpenSCAD-style model into a stack of 2D cross-section
//! files. It composes a single height-parameterized slicing template,
//! hands the slice height to the renderer as an external variable override,
//! and runs one renderer process per height across a bounded worker pool.
//! Failures are collected per height; one bad slice never aborts the batch.
//!
//! # Example
//!
//! ```ignore
//! use lamina::{slice, SliceConfig, Spacing};
//!
//! let config = SliceConfig {
//!     includes: vec!["wheel.scad".into()],
//!     object_modules: vec!["wheel()".into()],
//!     start: 0.0,
//!     end: 30.0,
//!     spacing: Spacing::Step(5.0),
//!     ..Default::default()
//! };
//!
//! let summary = slice(config)?;
//! println!("{} of {} slices ok", summary.succeeded(), summary.total());
//! ```

pub mod dispatch;
pub mod error;
pub mod heights;
pub mod operation;
pub mod template;

pub use dispatch::{
    CancelPolicy, CancelToken, JobOutcome, RenderDispatcher, SliceJob, SliceResult,
};
pub use error::{Result, SliceError};
pub use heights::{format_height, generate_heights, Spacing};
pub use operation::{slice, SliceSummary, SlicingOperation};
pub use template::{compose_template, HEIGHT_PARAM};

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Placeholder in the output pattern replaced by the formatted slice height.
pub const HEIGHT_TOKEN: &str = "{height}";

/// Parameters of a slicing run.
///
/// `Default` gives a runnable baseline once at least one object or key
/// module is added; [`SliceConfig::validate`] enforces the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SliceConfig {
    /// Modules that contribute solid geometry to the sliced object.
    pub object_modules: Vec<String>,
    /// Modules subtracted from the object, e.g. alignment keys.
    pub key_modules: Vec<String>,
    /// Files imported into the generated template.
    pub includes: Vec<String>,
    /// Height of the first slice, in mm.
    pub start: f64,
    /// Height of the last slice, in mm.
    pub end: f64,
    /// Spacing between consecutive slices.
    pub spacing: Spacing,
    /// Output path pattern; must contain [`HEIGHT_TOKEN`] in its file name
    /// and end in `.<output_format>`.
    pub output_pattern: String,
    /// File extension the renderer emits.
    pub output_format: String,
    /// Renderer command to invoke, resolved via `PATH` if not a path.
    pub renderer_command: String,
    /// Maximum number of renderer processes running at once.
    pub jobs: usize,
    /// Per-job render timeout. `None` waits forever.
    pub job_timeout: Option<Duration>,
    /// Treatment of mid-flight renderers when the run is cancelled.
    pub cancel_policy: CancelPolicy,
    /// Fixed template path; a unique temporary file is used when unset.
    pub template_path: Option<PathBuf>,
    /// Keep the template file after the run instead of removing it.
    pub keep_template: bool,
    /// Return an error from the run when any slice fails.
    pub fail_on_error: bool,
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self {
            object_modules: Vec::new(),
            key_modules: Vec::new(),
            includes: Vec::new(),
            start: 0.0,
            end: 100.0,
            spacing: Spacing::Step(1.0),
            output_pattern: "out/slice_{height}.dxf".to_string(),
            output_format: "dxf".to_string(),
            renderer_command: "openscad".to_string(),
            jobs: 4,
            job_timeout: None,
            cancel_policy: CancelPolicy::Wait,
            template_path: None,
            keep_template: false,
            fail_on_error: false,
        }
    }
}

impl SliceConfig {
    /// Validate the configuration before any filesystem or process work.
    pub fn validate(&self) -> Result<()> {
        heights::resolve_step(self.start, self.end, self.spacing)?;
        if self.object_modules.is_empty() && self.key_modules.is_empty() {
            return Err(SliceError::InvalidConfig(
                "at least one object or key module is required".into(),
            ));
        }
        if self
            .object_modules
            .iter()
            .chain(&self.key_modules)
            .any(|module| module.trim().is_empty())
        {
            return Err(SliceError::InvalidConfig(
                "module references must be non-empty".into(),
            ));
        }
        if self.includes.iter().any(|include| include.trim().is_empty()) {
            return Err(SliceError::InvalidConfig(
                "include references must be non-empty".into(),
            ));
        }
        self.validate_output_pattern()?;
        if self.renderer_command.trim().is_empty() {
            return Err(SliceError::InvalidConfig(
                "renderer command must be non-empty".into(),
            ));
        }
        if self.jobs == 0 {
            return Err(SliceError::InvalidConfig("jobs must be at least 1".into()));
        }
        if self.job_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(SliceError::InvalidConfig(
                "job timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }

    fn validate_output_pattern(&self) -> Result<()> {
        if self.output_format.trim().is_empty() {
            return Err(SliceError::InvalidConfig(
                "output format must be non-empty".into(),
            ));
        }
        let pattern = Path::new(&self.output_pattern);
        let file_name = pattern
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        if !file_name.contains(HEIGHT_TOKEN) {
            return Err(SliceError::InvalidConfig(format!(
                "output pattern must contain the {HEIGHT_TOKEN} placeholder in its file name"
            )));
        }
        if pattern
            .parent()
            .and_then(Path::to_str)
            .is_some_and(|dir| dir.contains(HEIGHT_TOKEN))
        {
            return Err(SliceError::InvalidConfig(format!(
                "the {HEIGHT_TOKEN} placeholder cannot appear in a directory component"
            )));
        }
        if !self
            .output_pattern
            .ends_with(&format!(".{}", self.output_format))
        {
            return Err(SliceError::InvalidConfig(format!(
                "output pattern must end in .{} to match the output format",
                self.output_format
            )));
        }
        Ok(())
    }
}
