//! Slicing orchestration.
//!
//! [`SlicingOperation`] walks one run through its phases in order: validate
//! the configuration, prepare the output directory, write the template,
//! dispatch the render jobs, then clean the template up. Cleanup is best
//! effort; a template that cannot be removed is logged and left behind.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::dispatch::{CancelToken, JobOutcome, RenderDispatcher, SliceJob, SliceResult};
use crate::error::{Result, SliceError};
use crate::heights::{format_height, generate_heights};
use crate::template::compose_template;
use crate::{SliceConfig, HEIGHT_TOKEN};

/// Aggregated results of one slicing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceSummary {
    /// One result per dispatched job, in height order.
    pub results: Vec<SliceResult>,
}

impl SliceSummary {
    /// Total number of jobs dispatched.
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Number of slices that rendered successfully.
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// Number of slices that failed.
    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    /// Number of slices skipped or killed by cancellation.
    pub fn cancelled(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome == JobOutcome::Cancelled)
            .count()
    }

    /// Results of the slices that failed, in height order.
    pub fn failures(&self) -> impl Iterator<Item = &SliceResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, JobOutcome::Failed { .. }))
    }

    /// Did every job render successfully?
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.is_success())
    }
}

/// A configured slicing run.
pub struct SlicingOperation {
    config: SliceConfig,
    template_path: PathBuf,
    cancel: CancelToken,
}

impl SlicingOperation {
    /// Validate `config` and resolve the template path for this run.
    ///
    /// Without a configured path the template goes to a unique file in the
    /// system temp directory, so concurrent runs never clobber each other.
    pub fn new(config: SliceConfig) -> Result<Self> {
        config.validate()?;
        let template_path = config.template_path.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(format!("lamina-{}.scad", uuid::Uuid::new_v4()))
        });
        Ok(Self {
            config,
            template_path,
            cancel: CancelToken::new(),
        })
    }

    /// Token for cancelling this run from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Path the template is written to for the duration of the run.
    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    /// Execute the run and return one result per slice height.
    ///
    /// Individual render failures are logged and aggregated, never raised.
    /// With `fail_on_error` set, a batch containing any failure returns
    /// [`SliceError::SlicesFailed`] once cleanup has finished.
    pub fn run(&self) -> Result<SliceSummary> {
        let config = &self.config;

        let heights = generate_heights(config.start, config.end, config.spacing)?;
        info!("slicing {} heights: {heights:?}", heights.len());

        self.prepare_output_dir()?;
        self.write_template()?;

        let jobs: Vec<SliceJob> = heights
            .iter()
            .map(|&height| SliceJob {
                template: self.template_path.clone(),
                height,
                output: PathBuf::from(
                    config
                        .output_pattern
                        .replace(HEIGHT_TOKEN, &format_height(height)),
                ),
                renderer: config.renderer_command.clone(),
            })
            .collect();

        let dispatcher = RenderDispatcher {
            concurrency: config.jobs,
            job_timeout: config.job_timeout,
            cancel_policy: config.cancel_policy,
        };
        let dispatched = dispatcher.run(&jobs, &self.cancel);
        self.remove_template();
        let results = dispatched?;

        let summary = SliceSummary { results };
        if summary.failed() > 0 {
            warn!("{} of {} slices failed", summary.failed(), summary.total());
            if config.fail_on_error {
                return Err(SliceError::SlicesFailed {
                    failed: summary.failed(),
                    total: summary.total(),
                });
            }
        }
        Ok(summary)
    }

    fn prepare_output_dir(&self) -> Result<()> {
        if let Some(dir) = Path::new(&self.config.output_pattern).parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
                info!("prepared output directory {}", dir.display());
            }
        }
        Ok(())
    }

    fn write_template(&self) -> Result<()> {
        let text = compose_template(
            &self.config.includes,
            &self.config.object_modules,
            &self.config.key_modules,
        )?;
        debug!("template contents:\n{text}");
        fs::write(&self.template_path, &text)?;
        info!("wrote slice template {}", self.template_path.display());
        Ok(())
    }

    fn remove_template(&self) {
        if self.config.keep_template {
            info!("keeping slice template {}", self.template_path.display());
            return;
        }
        match fs::remove_file(&self.template_path) {
            Ok(()) => info!("removed slice template {}", self.template_path.display()),
            Err(e) => warn!(
                "could not remove slice template {}: {e}",
                self.template_path.display()
            ),
        }
    }
}

/// Run a slicing operation in one call.
pub fn slice(config: SliceConfig) -> Result<SliceSummary> {
    SlicingOperation::new(config)?.run()
}
