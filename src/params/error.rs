// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with setting up [super::SelfcalParams].

use std::path::PathBuf;

use itertools::Itertools;
use strum::IntoEnumIterator;
use thiserror::Error;

use crate::convergence::Criterion;
use crate::solint::MatrixType;

lazy_static::lazy_static! {
    static ref VALID_CRITERIA: String = Criterion::iter().join(", ");
    static ref VALID_MATRIX_TYPES: String = MatrixType::iter().join(", ");
    static ref VALID_OUTPUT_MODES: String = super::OutputMode::iter().join(", ");
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read configuration from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not parse configuration in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("No targets were given; there is nothing to self-calibrate")]
    NoTargets,

    #[error("Target '{target}' lists no measurement sets")]
    EmptyMsList { target: String },

    #[error("Unknown convergence criterion '{got}'; valid criteria are: {}", *VALID_CRITERIA)]
    UnknownCriterion { got: String },

    #[error("Unknown gain matrix type '{got}'; valid types are: {}", *VALID_MATRIX_TYPES)]
    UnknownMatrixType { got: String },

    #[error("Unknown output data mode '{got}'; valid modes are: {}", *VALID_OUTPUT_MODES)]
    UnknownOutputMode { got: String },

    #[error("The convergence tolerance must lie strictly between 0 and 1, got {got}")]
    BadTolerance { got: f64 },

    #[error("cal_niter cannot be 0; the loop needs at least one iteration")]
    ZeroCalNiter,

    #[error("The per-iteration option list '{key}' cannot be empty")]
    EmptyOptionList { key: &'static str },
}
