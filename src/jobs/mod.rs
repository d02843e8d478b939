// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Job descriptors and the recipe that queues them for execution.
//!
//! Workers never run external tools themselves; they describe each tool
//! invocation as a [`JobDescriptor`] and append it to the shared [`Recipe`].
//! Calling [`Recipe::run`] hands the whole queued batch to an
//! [`ExecutionEngine`] in FIFO order and empties the queue. The engine may
//! parallelise jobs within one batch, but a batch never overlaps with the
//! next one: `run` does not return until every submitted job has completed
//! (or one has failed).

mod error;
#[cfg(test)]
mod tests;

pub use error::BatchError;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use indexmap::IndexMap;
use log::{debug, info};
use serde::Serialize;
use serde_json::Value;

/// A single external-tool invocation with fully resolved parameters.
///
/// Descriptors are immutable once constructed. Two descriptors with the same
/// tool and output path are distinct jobs; repeated imaging steps are valid
/// and common.
#[derive(Debug, Clone, Serialize)]
pub struct JobDescriptor {
    /// Identifies the external command or script to run.
    pub tool_id: String,

    /// Tool parameters, in insertion order. Values may be scalars, lists or
    /// nested mappings.
    pub parameters: IndexMap<String, Value>,

    /// The directory the tool may read static inputs from.
    pub input_root: PathBuf,

    /// The directory all of the tool's products land under. Paths inside
    /// `parameters` are relative to this root.
    pub output_root: PathBuf,

    /// Free text for logs and progress reporting.
    pub label: String,
}

/// Executes batches of jobs on behalf of a [`Recipe`].
///
/// The first failing job aborts the batch; nothing queued after it runs.
pub trait ExecutionEngine {
    fn execute(&mut self, batch: &[JobDescriptor]) -> Result<(), BatchError>;
}

/// The ordered queue of work that has been described but not yet executed.
///
/// One `Recipe` is shared by every worker in a pipeline run. Insertion order
/// is submission order. After [`Recipe::run`] returns, successfully or not,
/// the queue is empty; dispatched jobs are never re-submitted.
pub struct Recipe {
    jobs: Vec<JobDescriptor>,
    engine: Box<dyn ExecutionEngine>,
}

impl Recipe {
    pub fn new(engine: Box<dyn ExecutionEngine>) -> Recipe {
        Recipe {
            jobs: vec![],
            engine,
        }
    }

    /// Append a job to the queue.
    pub fn add(
        &mut self,
        tool_id: &str,
        parameters: IndexMap<String, Value>,
        input_root: &Path,
        output_root: &Path,
        label: String,
    ) {
        debug!("Queueing job '{label}' ({tool_id})");
        self.jobs.push(JobDescriptor {
            tool_id: tool_id.to_string(),
            parameters,
            input_root: input_root.to_path_buf(),
            output_root: output_root.to_path_buf(),
            label,
        });
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Hand the queued batch to the execution engine and block until it has
    /// completed or failed. The queue is drained before execution starts, so
    /// a failed batch is never re-submitted.
    pub fn run(&mut self) -> Result<(), BatchError> {
        if self.jobs.is_empty() {
            return Ok(());
        }
        let batch: Vec<JobDescriptor> = self.jobs.drain(..).collect();
        info!("Executing a batch of {} job(s)", batch.len());
        self.engine.execute(&batch)
    }
}

/// Runs each job by handing it to an external runner executable, serialised
/// as JSON on the runner's stdin.
///
/// This keeps the orchestrator agnostic of how jobs are actually executed
/// (containers, a batch scheduler, plain subprocesses); the runner owns that
/// decision. Jobs are executed strictly in order.
pub struct SubprocessEngine {
    runner: PathBuf,
}

impl SubprocessEngine {
    pub fn new<P: AsRef<Path>>(runner: P) -> SubprocessEngine {
        SubprocessEngine {
            runner: runner.as_ref().to_path_buf(),
        }
    }
}

impl ExecutionEngine for SubprocessEngine {
    fn execute(&mut self, batch: &[JobDescriptor]) -> Result<(), BatchError> {
        for job in batch {
            info!("{}", job.label);
            let payload =
                serde_json::to_vec(job).map_err(|source| BatchError::Serialise {
                    label: job.label.clone(),
                    source,
                })?;
            let handoff = |source| BatchError::Handoff {
                label: job.label.clone(),
                source,
            };
            let mut child = Command::new(&self.runner)
                .arg(&job.tool_id)
                .stdin(Stdio::piped())
                .spawn()
                .map_err(handoff)?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(&payload).map_err(handoff)?;
            }
            let status = child.wait().map_err(handoff)?;
            if !status.success() {
                return Err(BatchError::JobFailed {
                    label: job.label.clone(),
                    tool_id: job.tool_id.clone(),
                    status: status.to_string(),
                });
            }
        }
        Ok(())
    }
}
