//! Parallel render dispatch.
//!
//! Each slice height becomes one renderer invocation. Jobs run across a
//! bounded worker pool and never affect one another; a failed render is
//! recorded in the result set rather than raised as an error.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SliceError};
use crate::heights::format_height;
use crate::template::HEIGHT_PARAM;

/// Poll interval while waiting for a renderer process to exit.
const WAIT_POLL: Duration = Duration::from_millis(25);

/// How long after the renderer is gone to keep waiting for its stderr.
const STDERR_GRACE: Duration = Duration::from_millis(250);

/// One renderer invocation: slice a single height out of the shared template.
#[derive(Debug, Clone)]
pub struct SliceJob {
    /// Path of the shared template file, read-only for the whole run.
    pub template: PathBuf,
    /// Height to take the cross-section at, in mm.
    pub height: f64,
    /// File the renderer writes the cross-section to.
    pub output: PathBuf,
    /// Renderer executable or command name.
    pub renderer: String,
}

/// Terminal state of a single slice job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// The renderer exited with status zero.
    Success,
    /// The renderer exited non-zero, failed to launch, or ran past the
    /// per-job timeout.
    Failed {
        /// Renderer stderr, or a description when stderr was empty.
        diagnostic: String,
    },
    /// The job was skipped or its renderer killed after cancellation.
    Cancelled,
}

impl JobOutcome {
    /// Diagnostic text, present only for failed jobs.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            JobOutcome::Failed { diagnostic } => Some(diagnostic),
            _ => None,
        }
    }
}

/// Result of one slice job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceResult {
    /// Height the job sliced at, in mm.
    pub height: f64,
    /// Output path the job rendered to.
    pub output: PathBuf,
    /// How the job ended.
    pub outcome: JobOutcome,
}

impl SliceResult {
    /// Did the renderer complete successfully?
    pub fn is_success(&self) -> bool {
        self.outcome == JobOutcome::Success
    }
}

/// Cooperative cancellation flag shared between a run and its caller.
///
/// Cancellation stops pending jobs from starting; what happens to renderers
/// already running is decided by [`CancelPolicy`]. Clones share one flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Has cancellation been requested?
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What to do with renderers that are mid-flight when the run is cancelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelPolicy {
    /// Let running renderers finish, so no output file is left half written.
    #[default]
    Wait,
    /// Kill running renderers immediately.
    Kill,
}

/// Runs slice jobs across a bounded worker pool.
#[derive(Debug, Clone)]
pub struct RenderDispatcher {
    /// Maximum number of renderer processes running at once.
    pub concurrency: usize,
    /// Kill any renderer that runs longer than this. `None` waits forever.
    pub job_timeout: Option<Duration>,
    /// Treatment of mid-flight renderers on cancellation.
    pub cancel_policy: CancelPolicy,
}

impl Default for RenderDispatcher {
    fn default() -> Self {
        Self {
            concurrency: 4,
            job_timeout: None,
            cancel_policy: CancelPolicy::Wait,
        }
    }
}

impl RenderDispatcher {
    /// Run every job to a terminal state and return one result per job, in
    /// input order.
    ///
    /// Individual render failures land in the results, never in `Err`; the
    /// only error here is failing to build the worker pool itself.
    pub fn run(&self, jobs: &[SliceJob], cancel: &CancelToken) -> Result<Vec<SliceResult>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency.max(1))
            .build()
            .map_err(|e| SliceError::Pool(e.to_string()))?;

        debug!(
            "dispatching {} render jobs across {} workers",
            jobs.len(),
            self.concurrency.max(1)
        );

        let results: Vec<SliceResult> = pool.install(|| {
            jobs.par_iter()
                .map(|job| self.run_job(job, cancel))
                .collect()
        });
        Ok(results)
    }

    fn run_job(&self, job: &SliceJob, cancel: &CancelToken) -> SliceResult {
        let z = format_height(job.height);

        if cancel.is_cancelled() {
            info!("skipping slice at z={z}: run cancelled");
            return SliceResult {
                height: job.height,
                output: job.output.clone(),
                outcome: JobOutcome::Cancelled,
            };
        }

        info!("rendering slice at z={z} -> {}", job.output.display());
        let outcome = self.render(job, &z, cancel);
        match &outcome {
            JobOutcome::Success => info!("completed slice at z={z}"),
            JobOutcome::Failed { diagnostic } => error!("slice at z={z} failed: {diagnostic}"),
            JobOutcome::Cancelled => info!("cancelled slice at z={z}"),
        }

        SliceResult {
            height: job.height,
            output: job.output.clone(),
            outcome,
        }
    }

    fn render(&self, job: &SliceJob, z: &str, cancel: &CancelToken) -> JobOutcome {
        let mut child = match Command::new(&job.renderer)
            .arg(format!("-D{HEIGHT_PARAM}={z}"))
            .arg("-o")
            .arg(&job.output)
            .arg(&job.template)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return JobOutcome::Failed {
                    diagnostic: format!("failed to launch renderer `{}`: {e}", job.renderer),
                }
            }
        };

        // Drain stderr off-thread; a renderer that fills the pipe buffer
        // would otherwise block with nobody reading. The pipe can outlive
        // the child when it spawned background children of its own, so the
        // buffer comes back over a channel with a bounded wait, not a join.
        let stderr = child.stderr.take();
        let (buf_tx, buf_rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut buf);
            }
            let _ = buf_tx.send(buf);
        });

        let waited = self.wait_for_exit(&mut child, cancel);
        let stderr = buf_rx
            .recv_timeout(STDERR_GRACE)
            .map(|buf| String::from_utf8_lossy(&buf).trim().to_string())
            .unwrap_or_default();

        match waited {
            WaitOutcome::Exited(status) if status.success() => JobOutcome::Success,
            WaitOutcome::Exited(status) => JobOutcome::Failed {
                diagnostic: if stderr.is_empty() {
                    format!("renderer exited with {status}")
                } else {
                    stderr
                },
            },
            WaitOutcome::TimedOut => {
                let timeout = self.job_timeout.unwrap_or_default();
                JobOutcome::Failed {
                    diagnostic: format!("renderer timed out after {timeout:?}"),
                }
            }
            WaitOutcome::Cancelled => JobOutcome::Cancelled,
            WaitOutcome::WaitFailed(e) => JobOutcome::Failed {
                diagnostic: format!("failed waiting for renderer: {e}"),
            },
        }
    }

    /// Poll the child until it exits, the deadline passes, or the run is
    /// cancelled under a kill policy.
    fn wait_for_exit(&self, child: &mut Child, cancel: &CancelToken) -> WaitOutcome {
        let deadline = self.job_timeout.map(|timeout| Instant::now() + timeout);
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return WaitOutcome::Exited(status),
                Ok(None) => {}
                Err(e) => {
                    reap(child);
                    return WaitOutcome::WaitFailed(e);
                }
            }
            if cancel.is_cancelled() && self.cancel_policy == CancelPolicy::Kill {
                reap(child);
                return WaitOutcome::Cancelled;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                reap(child);
                return WaitOutcome::TimedOut;
            }
            thread::sleep(WAIT_POLL);
        }
    }
}

enum WaitOutcome {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
    WaitFailed(std::io::Error),
}

/// Kill the child and collect it so no zombie is left behind.
fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
