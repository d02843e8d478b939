// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The multi-criterion convergence test for the self-calibration loop.
//!
//! Two successive iterations' residual statistics are turned into five
//! ratios, each weighted onto a comparable scale, and combined into a single
//! weighted mean. A mean close to 1 means the latest iteration bought no
//! real improvement; the iteration counter is rolled back so the previous
//! iteration's products stand as the result, and after two such events the
//! loop stops.


use itertools::Itertools;
use log::{debug, info};
use strum_macros::{Display, EnumIter, EnumString};

use crate::constants::*;
use crate::fidelity::{FidelityError, FidelityStore, ImageKey};
use crate::state::{IterationState, Target};

/// Residual statistics that can take part in the convergence test.
///
/// The string forms match the names used in the fidelity store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Criterion {
    /// Dynamic range; the only criterion that should grow.
    #[strum(serialize = "DR")]
    DynamicRange,

    #[strum(serialize = "SKEW")]
    Skew,

    #[strum(serialize = "KURT")]
    Kurtosis,

    #[strum(serialize = "MEAN")]
    Mean,

    /// The residual noise.
    #[strum(serialize = "STDDEV")]
    StdDev,
}

#[derive(Debug, Clone)]
pub struct ConvergenceSettings {
    /// The criteria that carry weight in the test.
    pub criteria: Vec<Criterion>,

    /// A weighted-mean ratio above `1 - tolerance` counts as convergence.
    pub tolerance: f64,

    /// The iteration budget; evaluation at `max_iterations + 1` stops the
    /// loop unconditionally.
    pub max_iterations: u32,
}

/// Whether the loop should keep iterating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Stop,
}

/// The outcome of one convergence evaluation.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub verdict: Verdict,

    /// True when this round tripped the convergence test; the iteration
    /// counter has already been rolled back when this is set.
    pub converged: bool,

    /// The weighted-mean ratio, when two iterations were compared with at
    /// least one active criterion.
    pub check: Option<f64>,
}

impl Evaluation {
    fn of(verdict: Verdict) -> Evaluation {
        Evaluation {
            verdict,
            converged: false,
            check: None,
        }
    }
}

/// Decide whether `state`'s loop should continue, comparing the latest
/// residual statistics against the previous iteration's.
///
/// No comparison is possible before two iterations exist, so the first
/// iteration always continues (unless the iteration budget is already
/// exhausted). On convergence the iteration counter is rolled back -- by one
/// on the first event, keeping the previous iteration as the result, and by
/// two on the second, which also stops the loop.
pub fn evaluate(
    state: &mut IterationState,
    store: &FidelityStore,
    prefix: &str,
    target: &Target,
    settings: &ConvergenceSettings,
) -> Result<Evaluation, FidelityError> {
    if state.reset_count >= MAX_RESET_COUNT {
        return Ok(Evaluation::of(Verdict::Stop));
    }

    let n = state.iteration;
    let mut check = None;
    if n >= 2 {
        let prev_key = ImageKey {
            prefix,
            field: &target.name,
            iteration: n - 1,
        };
        let cur_key = ImageKey {
            prefix,
            field: &target.name,
            iteration: n,
        };
        let prev = store.residual(&prev_key)?;
        let cur = store.residual(&cur_key)?;

        let active = |c: Criterion| settings.criteria.contains(&c);

        // Dynamic range should grow, so its ratio is inverted relative to
        // the others.
        let dr_ratio = prev.dynamic_range(&prev_key)? / cur.dynamic_range(&cur_key)?;
        let dr_weight = if active(Criterion::DynamicRange) {
            0.8
        } else {
            0.0
        };

        let skew_ratio = cur.skew / prev.skew;
        let mut skew_weight = if active(Criterion::Skew) {
            cur.skew / SKEW_WEIGHT_SCALE
        } else {
            0.0
        };

        let kurt_ratio = cur.kurtosis / prev.kurtosis;
        let mut kurt_weight = if active(Criterion::Kurtosis) {
            cur.kurtosis / KURT_WEIGHT_SCALE
        } else {
            0.0
        };

        let mean_ratio = cur.mean / prev.mean;
        let mean_weight = if active(Criterion::Mean) {
            cur.mean / (cur.std_dev * MEAN_NOISE_FRACTION)
        } else {
            0.0
        };

        // The noise should hold steady when the previous residuals were
        // already Gaussian, and decline when they were not; either way the
        // weight goes to zero as the situation improves.
        let noise_ratio = cur.std_dev / prev.std_dev;
        let noise_weight = if active(Criterion::StdDev) {
            if prev.kurtosis / KURT_WEIGHT_SCALE < GAUSSIAN_KURT_LIMIT
                && prev.skew < GAUSSIAN_SKEW_LIMIT
            {
                (1.0 - noise_ratio).abs()
            } else {
                noise_ratio
            }
        } else {
            0.0
        };

        // A big jump in dynamic range perturbs the higher moments of the
        // residuals; don't let that read as divergence.
        if dr_ratio < DR_JUMP_GUARD {
            skew_weight = 0.0;
            kurt_weight = 0.0;
        }

        let weight_sum = dr_weight + skew_weight + kurt_weight + mean_weight + noise_weight;
        if weight_sum > 0.0 {
            let h = (dr_ratio * dr_weight
                + skew_ratio * skew_weight
                + kurt_ratio * kurt_weight
                + mean_ratio * mean_weight
                + noise_ratio * noise_weight)
                / weight_sum;
            check = Some(h);

            if (1.0 - settings.tolerance) < h {
                info!(
                    "Stopping criteria met: {}",
                    settings.criteria.iter().join(" ")
                );
                info!(
                    "Calculated ratios DR={dr_ratio:.6}, Skew={skew_ratio:.6}, \
                     Kurt={kurt_ratio:.6}, Mean={mean_ratio:.6}, Noise={noise_ratio:.6}"
                );
                info!(
                    "Weights used DR={dr_weight:.6}, Skew={skew_weight:.6}, \
                     Kurt={kurt_weight:.6}, Mean={mean_weight:.6}, Noise={noise_weight:.6}"
                );
                info!("{:.6} < {h:.6}", 1.0 - settings.tolerance);

                // Keep the previous iteration's products as the result; on
                // the second event, undo this iteration and the previous one
                // and stop for good.
                state.reset_count += 1;
                let verdict = if state.reset_count == 1 {
                    state.rollback(1);
                    Verdict::Continue
                } else {
                    state.rollback(2);
                    Verdict::Stop
                };
                return Ok(Evaluation {
                    verdict,
                    converged: true,
                    check,
                });
            }
        } else {
            debug!("No convergence criterion carries weight; skipping the test");
        }
    }

    if n == settings.max_iterations + 1 {
        info!(
            "Number of iterations reached: {}",
            settings.max_iterations
        );
        return Ok(Evaluation {
            verdict: Verdict::Stop,
            converged: false,
            check,
        });
    }

    Ok(Evaluation {
        verdict: Verdict::Continue,
        converged: false,
        check,
    })
}
