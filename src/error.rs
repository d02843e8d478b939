// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all mkat_selfcal-related errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SelfcalError {
    #[error(transparent)]
    Config(#[from] crate::params::ConfigError),

    #[error(transparent)]
    Loop(#[from] crate::selfcal::LoopError),

    #[error(transparent)]
    Batch(#[from] crate::jobs::BatchError),

    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}
