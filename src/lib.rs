// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Self-calibration loop orchestration for radio-interferometry imaging
pipelines.

The heart of this crate is the self-calibration control loop: image the
data, extract a sky model, calibrate against it, assess the residual image,
and keep going until the image quality stops improving. Everything the loop
needs to decide "keep going or stop" lives here; the external tools that do
the actual imaging, source finding, calibration and fidelity assessment are
driven through [`jobs::Recipe`] and an [`jobs::ExecutionEngine`].
 */

pub mod constants;
pub mod convergence;
mod error;
pub mod fidelity;
pub mod jobs;
pub mod obsinfo;
pub mod params;
pub mod selfcal;
pub mod solint;
pub mod state;

pub use error::SelfcalError;
