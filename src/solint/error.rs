// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with solution-interval estimation.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SolintError {
    #[error(transparent)]
    Fidelity(#[from] crate::fidelity::FidelityError),

    #[error(transparent)]
    ObsInfo(#[from] crate::obsinfo::ObsInfoError),

    #[error("Residual image '{key}' has a non-positive flux estimate; cannot solve for an interval")]
    DegenerateStats { key: String },
}
