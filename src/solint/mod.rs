// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Adaptive solution-interval estimation.
//!
//! The solution interval for a calibration round balances stability (enough
//! data per solve) against temporal resolution (tracking fast gain
//! variations). From the previous round's residual noise and dynamic range
//! we estimate the flux available to calibrate against, then solve for the
//! shortest interval that reaches the target signal-to-noise ratio. When an
//! iteration no longer needs *less* solve time than its predecessor the
//! solutions have stopped improving: a phase-only round escalates to a full
//! amplitude-and-phase solve, and a full round that stagnates (or hits its
//! interval floor) counts towards the loop's reset cap.
//!
//! This is a heuristic control policy, not a closed-form solution. The
//! comparison operators and the escalation order matter; changing either
//! changes the convergence behaviour of the whole loop.

mod error;
#[cfg(test)]
mod tests;

pub use error::SolintError;

use log::debug;
use strum_macros::{Display, EnumIter, EnumString};

use crate::constants::*;
use crate::fidelity::{FidelityStore, ImageKey};
use crate::obsinfo::ObsInfo;
use crate::state::{IterationState, Target, TraceEntry};

/// The class of antenna gain solution being solved for.
///
/// The string forms are CubiCal's solver vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString)]
pub enum MatrixType {
    /// Phase-only gains; corrects timing and atmospheric effects.
    #[strum(serialize = "phase-diag")]
    PhaseDiag,

    /// Full amplitude-and-phase gains.
    #[strum(serialize = "complex-2x2")]
    Complex2x2,
}

impl MatrixType {
    /// The signal-to-noise ratio a solution interval must reach.
    pub fn target_snr(self) -> f64 {
        match self {
            MatrixType::PhaseDiag => PHASE_ONLY_TARGET_SNR,
            MatrixType::Complex2x2 => AMP_PHASE_TARGET_SNR,
        }
    }

    /// The shortest sensible solution interval \[seconds\].
    pub fn min_solve_secs(self) -> f64 {
        match self {
            MatrixType::PhaseDiag => PHASE_ONLY_MIN_SOLVE_SECS,
            MatrixType::Complex2x2 => AMP_PHASE_MIN_SOLVE_SECS,
        }
    }
}

/// What the estimator settled on for one calibration round.
#[derive(Debug, Clone, Copy)]
pub struct SolutionInterval {
    pub matrix_type: MatrixType,

    /// The time solution interval, as a count of correlator dumps.
    pub time_dumps: u64,

    /// The signal-to-noise target the interval was solved for.
    pub snr: f64,
}

/// Estimate the solution interval for the current iteration's calibration
/// round.
///
/// Iteration `n > 1` starts from the matrix type and SNR recorded for
/// iteration `n - 1` in `state.trace`; iteration 1 starts phase-only. The
/// first iteration has no predecessor to compare against, so its previous
/// solve time is defined as one dump longer than its own and no escalation
/// can occur. May bump `state.reset_count` on stagnation.
pub fn estimate(
    state: &mut IterationState,
    store: &FidelityStore,
    obs: &ObsInfo,
    prefix: &str,
    target: &Target,
) -> Result<SolutionInterval, SolintError> {
    let n = state.iteration;
    let (mut matrix_type, mut snr) = match state.previous_trace() {
        Some(TraceEntry { matrix_type, snr }) => (matrix_type, snr),
        None => (MatrixType::PhaseDiag, MatrixType::PhaseDiag.target_snr()),
    };

    let int_time = obs.integration_time();
    let tot_time = obs.total_scan_time(&target.field_id)?;
    let n_ant = obs.num_antennas() as f64;

    let cur_key = ImageKey {
        prefix,
        field: &target.name,
        iteration: n,
    };
    let cur = store.residual(&cur_key)?;
    let noise = cur.std_dev;
    let dr = cur.dynamic_range(&cur_key)?;

    // The flux available to fan the SNR requirement out over.
    let mut flux = dr * noise;
    if !(flux > 0.0) {
        return Err(SolintError::DegenerateStats {
            key: cur_key.residual(),
        });
    }

    // The shortest solve time that reaches `snr`, in dumps.
    let solve = |snr: f64, flux: f64| -> u64 {
        (noise * noise * snr * snr * tot_time * n_ant / (flux * flux * 2.0) / int_time) as u64
    };

    let mut solvetime = solve(snr, flux);
    let prev_solvetime = if n > 1 {
        let prev_key = ImageKey {
            prefix,
            field: &target.name,
            iteration: n - 1,
        };
        let prev_dr = store.residual(&prev_key)?.dynamic_range(&prev_key)?;
        flux = prev_dr * noise;
        solve(snr, flux)
    } else {
        solvetime + 1
    };

    let interval;
    if (solvetime >= prev_solvetime || state.reset_count == 1) && matrix_type == MatrixType::PhaseDiag
    {
        // Phase-only solutions have stopped getting cheaper; go after the
        // amplitudes as well.
        matrix_type = MatrixType::Complex2x2;
        snr = matrix_type.target_snr();
        solvetime = solve(snr, flux);
        interval = solvetime / u64::from(n);
        debug!("Iteration {n}: escalating to {matrix_type} solutions");
    } else if solvetime >= prev_solvetime && matrix_type == MatrixType::Complex2x2 {
        // Already solving for everything and still not improving.
        interval = prev_solvetime / u64::from(n);
        state.reset_count += 1;
        debug!("Iteration {n}: full solutions stagnated; reset count is now {}", state.reset_count);
    } else {
        interval = solvetime / u64::from(n);
    }

    let min_interval = (matrix_type.min_solve_secs() / int_time) as u64;
    let time_dumps = if min_interval > interval {
        if matrix_type == MatrixType::Complex2x2 {
            state.reset_count += 1;
            debug!(
                "Iteration {n}: full solutions hit the interval floor; reset count is now {}",
                state.reset_count
            );
        }
        min_interval
    } else {
        interval
    };

    state.trace.push(TraceEntry { matrix_type, snr });
    debug!(
        "Iteration {n}: {matrix_type} solutions over {time_dumps} dump(s) (SNR target {snr})"
    );
    Ok(SolutionInterval {
        matrix_type,
        time_dumps,
        snr,
    })
}
