// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with reading observation metadata.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ObsInfoError {
    #[error("Could not read observation metadata from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not parse observation metadata in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Observation metadata in {} has a non-positive integration time ({got})", path.display())]
    BadExposure { got: f64, path: PathBuf },

    #[error("Observation metadata in {} lists no antennas", .0.display())]
    NoAntennas(PathBuf),

    #[error("No scans are recorded for FIELD id '{field_id}'")]
    UnknownField { field_id: String },
}
