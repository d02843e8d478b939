// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with the image-fidelity store.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FidelityError {
    #[error("Could not read fidelity results from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not parse fidelity results in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("The fidelity store has no record for residual image '{key}'")]
    MissingResidual { key: String },

    #[error("The fidelity store has no dynamic range for sky model '{key}'")]
    MissingModelStats { key: String },
}
