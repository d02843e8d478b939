// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

The statistical thresholds below are control-policy knobs, not physical
constants; changing any of them changes the convergence behaviour of the
self-calibration loop.
 */

/// The target signal-to-noise ratio for phase-only gain solutions.
pub const PHASE_ONLY_TARGET_SNR: f64 = 3.0;

/// The target signal-to-noise ratio for full amplitude-and-phase gain
/// solutions.
pub const AMP_PHASE_TARGET_SNR: f64 = 8.0;

/// The shortest sensible solution interval for phase-only solves \[seconds\].
pub const PHASE_ONLY_MIN_SOLVE_SECS: f64 = 30.0;

/// The shortest sensible solution interval for full amplitude-and-phase
/// solves \[seconds\].
pub const AMP_PHASE_MIN_SOLVE_SECS: f64 = 30.0 * 60.0;

/// Once this many quality regressions (or stagnation signals) have been
/// counted for a target, its self-calibration loop stops.
pub const MAX_RESET_COUNT: u32 = 2;

/// A dynamic-range ratio below this value is a large jump in image quality;
/// such jumps perturb the higher statistical moments of the residuals, so
/// the skewness and kurtosis criteria are ignored for that comparison.
pub const DR_JUMP_GUARD: f64 = 0.6;

/// Residual skewness at which the skewness criterion carries unit weight.
pub const SKEW_WEIGHT_SCALE: f64 = 0.01;

/// Residual kurtosis at which the kurtosis criterion carries unit weight; a
/// normal distribution (kurtosis 3) then counts for 0.5.
pub const KURT_WEIGHT_SCALE: f64 = 6.0;

/// The mean criterion is weighted against this fraction of the residual
/// noise; a mean deviating from zero by more than 20% of the noise is a
/// problem.
pub const MEAN_NOISE_FRACTION: f64 = 0.2;

/// Residuals with kurtosis/[`KURT_WEIGHT_SCALE`] below this value (and
/// skewness below [`GAUSSIAN_SKEW_LIMIT`]) are treated as Gaussian when
/// weighting the noise criterion.
pub const GAUSSIAN_KURT_LIMIT: f64 = 0.52;

/// See [`GAUSSIAN_KURT_LIMIT`].
pub const GAUSSIAN_SKEW_LIMIT: f64 = 0.01;
