// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all self-calibration loop errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoopError {
    #[error(
        "No source catalogue was found at {} after source extraction; either the calibration \
         is bad or the detection thresholds are too stringent",
        path.display()
    )]
    NoSources { path: PathBuf },

    #[error(transparent)]
    Batch(#[from] crate::jobs::BatchError),

    #[error(transparent)]
    Fidelity(#[from] crate::fidelity::FidelityError),

    #[error(transparent)]
    Solint(#[from] crate::solint::SolintError),

    #[error(transparent)]
    ObsInfo(#[from] crate::obsinfo::ObsInfoError),

    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}
