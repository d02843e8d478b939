// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The self-calibration loop controller.
//!
//! One [`SelfcalLoop`] drives one target through the image -> extract ->
//! assess -> calibrate cycle until the convergence evaluator stops it, the
//! reset cap is reached, or the iteration budget runs out. Each stage
//! registers its external-tool jobs against the shared [`Recipe`]; only the
//! assessment stage forces the recipe to execute, because the controller
//! must observe the fidelity store before it can pick the next transition.
//! That makes the loop synchronous by construction: iteration `n + 1`'s
//! imaging depends on iteration `n`'s calibration output, and the quality
//! check for iteration `n` depends on its imaging output.

mod error;

pub use error::LoopError;

use indexmap::IndexMap;
use log::{debug, info};
use serde_json::json;

use crate::constants::MAX_RESET_COUNT;
use crate::convergence::{self, Evaluation, Verdict};
use crate::fidelity::FidelityStore;
use crate::jobs::Recipe;
use crate::obsinfo::ObsInfo;
use crate::params::{per_iter, SelfcalParams};
use crate::solint::{self, SolutionInterval};
use crate::state::{IterationState, Target};

macro_rules! job_params {
    ($($key:literal => $value:expr),* $(,)?) => {{
        let mut p: IndexMap<String, serde_json::Value> = IndexMap::new();
        $(p.insert($key.to_string(), json!($value));)*
        p
    }};
}

/// The controller's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Imaging,
    Assessing,
    Calibrating,
    Done,
}

/// Why a target's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The convergence test tripped twice; the rolled-back iteration's
    /// products stand as the result.
    Converged,

    /// The solution intervals stagnated until the reset cap was reached.
    Stagnated,

    /// The iteration budget ran out.
    IterationBudget,
}

/// What a finished loop left behind.
#[derive(Debug, Clone, Copy)]
pub struct LoopOutcome {
    /// The iteration whose products are the result. Rollbacks mean this can
    /// be lower than the number of imaging rounds that ran.
    pub final_iteration: u32,

    pub reset_count: u32,

    pub stop_reason: StopReason,
}

/// Drives the self-calibration loop for one target.
pub struct SelfcalLoop<'a> {
    params: &'a SelfcalParams,
    recipe: &'a mut Recipe,
    target: &'a Target,
    state: IterationState,
    phase: Phase,
}

impl<'a> SelfcalLoop<'a> {
    pub fn new(
        params: &'a SelfcalParams,
        recipe: &'a mut Recipe,
        target: &'a Target,
    ) -> SelfcalLoop<'a> {
        SelfcalLoop {
            params,
            recipe,
            target,
            state: IterationState::new(params.start_at_iter),
            phase: Phase::Init,
        }
    }

    /// Run the loop to completion.
    pub fn run(mut self) -> Result<LoopOutcome, LoopError> {
        info!("Self-calibrating target '{}'", self.target.name);
        let mut stop_reason = StopReason::IterationBudget;

        while self.phase != Phase::Done {
            self.phase = match self.phase {
                Phase::Init => Phase::Imaging,

                Phase::Imaging => {
                    let n = self.state.iteration;
                    info!("Iteration {n}: imaging '{}'", self.target.name);
                    self.ensure_dir(&self.image_dir(n))?;
                    if self.params.image.enable {
                        if self.params.image.mask && n > 1 {
                            self.register_mask_job();
                        }
                        self.register_imaging_job();
                    }
                    Phase::Assessing
                }

                Phase::Assessing => {
                    let eval = self.assess()?;
                    match eval.verdict {
                        Verdict::Continue => Phase::Calibrating,
                        Verdict::Stop => {
                            stop_reason = if eval.converged {
                                StopReason::Converged
                            } else if self.state.reset_count >= MAX_RESET_COUNT {
                                StopReason::Stagnated
                            } else {
                                StopReason::IterationBudget
                            };
                            Phase::Done
                        }
                    }
                }

                Phase::Calibrating => {
                    if self.params.calibrate.enable {
                        self.register_calibration_jobs()?;
                    }
                    if self.state.reset_count >= MAX_RESET_COUNT {
                        // The estimator (or a convergence rollback plus the
                        // estimator) hit the cap during this calibration
                        // round; don't start another image.
                        stop_reason = StopReason::Stagnated;
                        Phase::Done
                    } else {
                        self.state.iteration += 1;
                        Phase::Imaging
                    }
                }

                Phase::Done => Phase::Done,
            };
        }

        // Whatever is still queued (e.g. the final calibration round) runs
        // before the loop hands back.
        self.recipe.run()?;

        let outcome = LoopOutcome {
            final_iteration: self.state.iteration,
            reset_count: self.state.reset_count,
            stop_reason,
        };
        info!(
            "Self-calibration of '{}' stopped at iteration {} ({:?})",
            self.target.name, outcome.final_iteration, outcome.stop_reason
        );
        Ok(outcome)
    }

    /// Register the source-extraction and fidelity-assessment jobs, force
    /// the recipe through, and ask the convergence evaluator what to do
    /// next.
    fn assess(&mut self) -> Result<Evaluation, LoopError> {
        if self.params.extract.enable {
            self.register_extraction_jobs();
            // Execute now so we can check that sources were actually found
            // before anything downstream consumes the catalogue.
            self.recipe.run()?;
            let catalogue = self
                .params
                .output
                .join(self.image_dir(self.state.iteration))
                .join(format!("{}.gaul", self.model_name(self.state.iteration)));
            if !catalogue.is_file() {
                return Err(LoopError::NoSources { path: catalogue });
            }
            self.register_conversion_job();
        }

        if !self.params.assess.enable {
            // Without fidelity assessments the loop just runs out its
            // iteration budget.
            self.recipe.run()?;
            let verdict = if self.state.iteration == self.params.cal_niter + 1 {
                Verdict::Stop
            } else {
                Verdict::Continue
            };
            return Ok(Evaluation {
                verdict,
                converged: false,
                check: None,
            });
        }

        self.register_assessment_job();
        self.recipe.run()?;

        let store = FidelityStore::open(&self.params.output)?;
        let eval = convergence::evaluate(
            &mut self.state,
            &store,
            &self.params.prefix,
            self.target,
            &self.params.convergence,
        )?;
        if let Some(check) = eval.check {
            debug!(
                "Iteration {}: weighted convergence ratio {check:.6}",
                self.state.iteration
            );
        }
        Ok(eval)
    }

    // Naming helpers. All paths inside job parameters are relative to the
    // pipeline output directory.

    fn image_dir(&self, iteration: u32) -> String {
        format!("continuum/image_{iteration}")
    }

    fn image_name(&self, iteration: u32) -> String {
        format!("{}_{}_{}", self.params.prefix, self.target.name, iteration)
    }

    fn model_name(&self, iteration: u32) -> String {
        format!("{}-pybdsf", self.image_name(iteration))
    }

    fn ensure_dir(&self, relative: &str) -> Result<(), LoopError> {
        std::fs::create_dir_all(self.params.output.join(relative))?;
        Ok(())
    }

    fn register_mask_job(&mut self) {
        let n = self.state.iteration;
        let image = &self.params.image;
        let previous = format!(
            "{}/{}{}-image.fits",
            self.image_dir(n - 1),
            self.image_name(n - 1),
            image.mfs_infix()
        );
        let mut parameters = job_params! {
            "image" => previous,
            "output" => format!("{}/{}-mask.fits", self.image_dir(n), self.image_name(n)),
            "dilate" => false,
            "no-negative" => true,
            "boxes" => 1,
        };
        if let Some(sigma) = image.mask_sigma {
            parameters.insert("sigma".to_string(), json!(sigma));
        }
        if let Some(pf) = image.mask_peak_fraction {
            parameters.insert("peak-fraction".to_string(), json!(pf));
        }
        self.recipe.add(
            "cleanmask",
            parameters,
            &self.params.input,
            &self.params.output,
            format!("mask_{n}:: Make mask from the previous image"),
        );
    }

    fn register_imaging_job(&mut self) {
        let n = self.state.iteration;
        let image = &self.params.image;
        let prefix = format!("{}/{}", self.image_dir(n), self.image_name(n));

        let mut parameters = job_params! {
            "msname" => self.target.mslist.iter().collect::<Vec<_>>(),
            "column" => per_iter(&image.columns, n),
            "weight" => &image.weight,
            "npix" => image.npix,
            "padding" => image.padding,
            "scale" => image.cell,
            "prefix" => prefix,
            "niter" => image.niter,
            "nmiter" => image.nmiter,
            "mgain" => image.mgain,
            "pol" => &image.pol,
            "channelsout" => image.nchans,
            "joinchannels" => image.joinchannels,
            "fit-spectral-pol" => image.fit_spectral_pol,
            "local-rms" => image.local_rms,
            "auto-threshold" => per_iter(&image.auto_threshold, n),
            "multiscale" => image.multi_scale,
            "savesourcelist" => image.niter > 0,
        };
        if let Some(taper) = &image.uvtaper {
            parameters.insert("taper-gaussian".to_string(), json!(taper));
        }
        if let Some(scales) = &image.multi_scale_scales {
            parameters.insert("multiscale-scales".to_string(), json!(scales));
        }
        if image.mask && n > 1 {
            parameters.insert(
                "fitsmask".to_string(),
                json!(format!(
                    "{}/{}-mask.fits",
                    self.image_dir(n),
                    self.image_name(n)
                )),
            );
        } else {
            parameters.insert(
                "auto-mask".to_string(),
                json!(per_iter(&image.auto_mask, n)),
            );
        }

        self.recipe.add(
            "wsclean",
            parameters,
            &self.params.input,
            &self.params.output,
            format!("image_{n}:: Image the field"),
        );
    }

    fn register_extraction_jobs(&mut self) {
        let n = self.state.iteration;
        let extract = &self.params.extract;
        let image = format!(
            "{}/{}{}-image.fits",
            self.image_dir(n),
            self.image_name(n),
            self.params.image.mfs_infix()
        );
        let parameters = job_params! {
            "image" => image,
            "thresh_pix" => per_iter(&extract.thresh_pix, n),
            "thresh_isl" => per_iter(&extract.thresh_isl, n),
            "outfile" => format!("{}/{}.gaul", self.image_dir(n), self.model_name(n)),
            "adaptive_rms_box" => extract.local_rms,
            "format" => "ascii",
        };
        self.recipe.add(
            "pybdsf",
            parameters,
            &self.params.input,
            &self.params.output,
            format!("extract_{n}:: Extract sources"),
        );
    }

    fn register_conversion_job(&mut self) {
        let n = self.state.iteration;
        let parameters = job_params! {
            "input-skymodel" => format!("{}/{}.gaul", self.image_dir(n), self.model_name(n)),
            "output-skymodel" => format!("{}/{}.lsm.html", self.image_dir(n), self.model_name(n)),
            "type" => "Gaul",
            "output-type" => "Tigger",
        };
        self.recipe.add(
            "tigger_convert",
            parameters,
            &self.params.input,
            &self.params.output,
            format!("convert_extract_{n}:: Convert the extracted sources to a sky model"),
        );
    }

    fn register_assessment_job(&mut self) {
        let n = self.state.iteration;
        let mut parameters = job_params! {
            "residual-image" => format!(
                "{}/{}{}-residual.fits",
                self.image_dir(n),
                self.image_name(n),
                self.params.image.mfs_infix()
            ),
            "normality-test" => &self.params.assess.normality_model,
            "area-factor" => self.params.assess.area_factor,
            "label" => self.image_name(n),
        };
        if self.params.extract.enable {
            parameters.insert(
                "tigger-model".to_string(),
                json!(format!(
                    "{}/{}.lsm.html",
                    self.image_dir(n),
                    self.model_name(n)
                )),
            );
        } else {
            parameters.insert(
                "restored-image".to_string(),
                json!(format!(
                    "{}/{}{}-image.fits",
                    self.image_dir(n),
                    self.image_name(n),
                    self.params.image.mfs_infix()
                )),
            );
        }
        self.recipe.add(
            "aimfast",
            parameters,
            &self.params.output,
            &self.params.output,
            format!("aimfast_{n}:: Assess image fidelity"),
        );
    }

    /// Register one calibration job per measurement set, with solution
    /// intervals either estimated adaptively or taken from the per-iteration
    /// configuration.
    fn register_calibration_jobs(&mut self) -> Result<(), LoopError> {
        let n = self.state.iteration;
        let cal = &self.params.calibrate;
        self.ensure_dir("continuum/selfcal_products")?;

        let solint = if self.params.adaptive_solint() {
            let obs = ObsInfo::for_ms(&self.params.output, self.target.mslist.first())?;
            let store = FidelityStore::open(&self.params.output)?;
            solint::estimate(
                &mut self.state,
                &store,
                &obs,
                &self.params.prefix,
                self.target,
            )?
        } else {
            SolutionInterval {
                matrix_type: *per_iter(&cal.gain_matrix_type, n),
                time_dumps: *per_iter(&cal.gsols_time, n),
                snr: per_iter(&cal.gain_matrix_type, n).target_snr(),
            }
        };
        let freq_int = *per_iter(&cal.gsols_channel, n);

        let chunk = |sols: u64, configured: u64| -> u64 {
            if sols == 0 || configured == 0 {
                0
            } else {
                sols.max(configured)
            }
        };
        let model = format!(
            "{}/{}.lsm.html",
            self.image_dir(n),
            self.model_name(n)
        );

        for ms in &self.target.mslist {
            let ms_base = ms.strip_suffix(".ms").unwrap_or(ms);
            let parameters = job_params! {
                "data-ms" => ms,
                "data-column" => "DATA",
                "model-list" => &model,
                "data-time-chunk" => chunk(solint.time_dumps, cal.time_chunk),
                "data-freq-chunk" => chunk(freq_int, cal.freq_chunk),
                "dist-ncpu" => cal.ncpu,
                "sol-jones" => "G",
                "out-name" => format!(
                    "continuum/selfcal_products/{}_{ms_base}_{n}_cubical",
                    self.params.prefix
                ),
                "out-mode" => per_iter(&cal.output_data, n).cubical_code(),
                "out-overwrite" => true,
                "weight-column" => &cal.weight_column,
                "g-solvable" => true,
                "g-type" => solint.matrix_type.to_string(),
                "g-time-int" => solint.time_dumps,
                "g-freq-int" => freq_int,
                "g-save-to" => format!(
                    "continuum/selfcal_products/g-gains-{n}-{ms_base}.parmdb"
                ),
                "g-clip-low" => cal.gain_amplitude_clip_low,
                "g-clip-high" => cal.gain_amplitude_clip_high,
                "log-boring" => true,
            };
            self.recipe.add(
                "cubical",
                parameters,
                &self.params.input,
                &self.params.output,
                format!("calibrate_{n}:: Calibrate against the sky model ms={ms}"),
            );
        }
        debug!(
            "Iteration {n}: {} solutions every {} dump(s) / {freq_int} channel(s)",
            solint.matrix_type, solint.time_dumps
        );
        Ok(())
    }
}

/// Self-calibrate every configured target, sequentially, against the shared
/// recipe.
pub fn run_targets(
    params: &SelfcalParams,
    recipe: &mut Recipe,
) -> Result<Vec<(String, LoopOutcome)>, LoopError> {
    let mut outcomes = Vec::with_capacity(params.targets.len());
    for target in &params.targets {
        let outcome = SelfcalLoop::new(params, recipe, target).run()?;
        outcomes.push((target.name.clone(), outcome));
    }
    Ok(outcomes)
}
