// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with executing job batches.

use thiserror::Error;

/// A flushed batch failed. These are fatal; the pipeline has no
/// partial-failure recovery for job batches.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Job '{label}' ({tool_id}) failed with {status}")]
    JobFailed {
        label: String,
        tool_id: String,
        status: String,
    },

    #[error("Could not hand job '{label}' to the execution engine: {source}")]
    Handoff {
        label: String,
        source: std::io::Error,
    },

    #[error("Could not serialise job '{label}': {source}")]
    Serialise {
        label: String,
        source: serde_json::Error,
    },
}
