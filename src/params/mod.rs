// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Handling of pipeline configuration.
//!
//! Strategy: users describe a run in a YAML file, deserialized into
//! [`SelfcalConfig`] with every recognised option and its default enumerated
//! here. The config is then validated once into [`SelfcalParams`], which is
//! what the rest of the crate works with; downstream code never probes a
//! loosely-typed mapping. Anything wrong with the configuration surfaces as
//! a [`ConfigError`] before a single job is submitted.

mod error;

pub use error::ConfigError;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use itertools::Itertools;
use log::info;
use serde::Deserialize;
use strum_macros::{Display, EnumIter, EnumString};
use vec1::Vec1;

use crate::convergence::{ConvergenceSettings, Criterion};
use crate::solint::MatrixType;
use crate::state::Target;

/// Index a per-iteration option list: when the list runs out, the last entry
/// sticks.
pub fn per_iter<T>(values: &Vec1<T>, iteration: u32) -> &T {
    let i = (iteration as usize)
        .saturating_sub(1)
        .min(values.len() - 1);
    &values[i]
}

/// What the calibration tool writes back into the measurement set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString)]
pub enum OutputMode {
    /// Corrected data.
    #[strum(serialize = "CORR_DATA")]
    CorrectedData,

    /// Corrected residuals.
    #[strum(serialize = "CORR_RES")]
    CorrectedResiduals,
}

impl OutputMode {
    /// CubiCal's `out-mode` code for this mode.
    pub fn cubical_code(self) -> &'static str {
        match self {
            OutputMode::CorrectedData => "sc",
            OutputMode::CorrectedResiduals => "sr",
        }
    }
}

// Raw configuration as it appears in the YAML file. All defaults live here.

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelfcalConfig {
    /// Filename prefix for all pipeline products.
    pub prefix: String,

    /// The directory static inputs (e.g. masks) are read from.
    pub input: PathBuf,

    /// The directory all products land under.
    pub output: PathBuf,

    pub targets: Vec<TargetConfig>,

    /// The iteration the loop starts at.
    #[serde(default = "default_start_at_iter")]
    pub start_at_iter: u32,

    /// The iteration budget for the loop.
    #[serde(default = "default_cal_niter")]
    pub cal_niter: u32,

    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub extract_sources: ExtractConfig,

    #[serde(default)]
    pub calibrate: CalibrateConfig,

    #[serde(default)]
    pub aimfast: AimfastConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub name: String,

    /// The FIELD id this target's scans are recorded under in the
    /// observation metadata.
    #[serde(default = "default_field_id")]
    pub field_id: String,

    /// The measurement sets holding this target's visibilities.
    pub ms: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageConfig {
    #[serde(default = "default_true")]
    pub enable: bool,

    /// Image size in pixels.
    #[serde(default = "default_npix")]
    pub npix: u32,

    #[serde(default = "default_padding")]
    pub padding: f64,

    /// Pixel size \[arcsec\].
    #[serde(default = "default_cell")]
    pub cell: f64,

    /// Imaging weighting scheme; "briggs" is resolved together with
    /// `robust`.
    #[serde(default = "default_weight")]
    pub weight: String,

    #[serde(default)]
    pub robust: f64,

    /// Clean iterations.
    #[serde(default = "default_niter")]
    pub niter: u64,

    /// Major cycles.
    #[serde(default = "default_nmiter")]
    pub nmiter: u32,

    #[serde(default = "default_mgain")]
    pub mgain: f64,

    /// Output channel images; more than one adds an MFS image.
    #[serde(default = "default_nchans")]
    pub nchans: u32,

    #[serde(default = "default_pol")]
    pub pol: String,

    #[serde(default = "default_true")]
    pub joinchannels: bool,

    #[serde(default = "default_fit_spectral_pol")]
    pub fit_spectral_pol: u32,

    /// Gaussian taper \[arcsec\], if any.
    #[serde(default)]
    pub uvtaper: Option<String>,

    #[serde(default)]
    pub multi_scale: bool,

    #[serde(default)]
    pub multi_scale_scales: Option<Vec<u32>>,

    #[serde(default)]
    pub local_rms: bool,

    /// The visibility column imaged at each iteration.
    #[serde(default = "default_columns")]
    pub column: Vec<String>,

    /// Per-iteration clean threshold \[sigma\].
    #[serde(default = "default_auto_threshold")]
    pub auto_threshold: Vec<f64>,

    /// Per-iteration auto-masking threshold \[sigma\], used when no mask
    /// image is made.
    #[serde(default = "default_auto_mask")]
    pub auto_mask: Vec<f64>,

    /// Make a clean mask from the previous iteration's image.
    #[serde(default)]
    pub mask: bool,

    #[serde(default)]
    pub mask_sigma: Option<f64>,

    #[serde(default)]
    pub mask_peak_fraction: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractConfig {
    #[serde(default = "default_true")]
    pub enable: bool,

    /// Per-iteration source-detection threshold \[sigma\].
    #[serde(default = "default_thresh_pix")]
    pub thresh_pix: Vec<f64>,

    /// Per-iteration island threshold \[sigma\].
    #[serde(default = "default_thresh_isl")]
    pub thresh_isl: Vec<f64>,

    #[serde(default)]
    pub local_rms: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalibrateConfig {
    #[serde(default = "default_true")]
    pub enable: bool,

    /// Per-iteration gain matrix type, in CubiCal vocabulary. Ignored when
    /// `two_step` solution-interval estimation is active.
    #[serde(default = "default_gain_matrix_type")]
    pub gain_matrix_type: Vec<String>,

    /// Per-iteration time solution interval \[dumps\]. Ignored when
    /// `two_step` is active.
    #[serde(default = "default_gsols_time")]
    pub gsols_time: Vec<u64>,

    /// Per-iteration frequency solution interval \[channels\].
    #[serde(default = "default_gsols_channel")]
    pub gsols_channel: Vec<u64>,

    /// Per-iteration output visibilities.
    #[serde(default = "default_output_data")]
    pub output_data: Vec<String>,

    /// Derive solution intervals and matrix types adaptively from the
    /// fidelity statistics.
    #[serde(default)]
    pub two_step: bool,

    #[serde(default = "default_time_chunk")]
    pub time_chunk: u64,

    #[serde(default)]
    pub freq_chunk: u64,

    #[serde(default = "default_ncpu")]
    pub ncpu: u32,

    #[serde(default = "default_clip_low")]
    pub gain_amplitude_clip_low: f64,

    #[serde(default = "default_clip_high")]
    pub gain_amplitude_clip_high: f64,

    #[serde(default = "default_weight_column")]
    pub weight_column: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AimfastConfig {
    #[serde(default = "default_true")]
    pub enable: bool,

    /// A weighted-mean ratio above `1 - tolerance` counts as convergence.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// The residual statistics that carry weight in the convergence test.
    #[serde(default = "default_convergence_criteria")]
    pub convergence_criteria: Vec<String>,

    #[serde(default = "default_normality_model")]
    pub normality_model: String,

    #[serde(default = "default_area_factor")]
    pub area_factor: f64,
}

fn default_true() -> bool {
    true
}
fn default_start_at_iter() -> u32 {
    1
}
fn default_cal_niter() -> u32 {
    2
}
fn default_field_id() -> String {
    "0".to_string()
}
fn default_npix() -> u32 {
    1800
}
fn default_padding() -> f64 {
    1.3
}
fn default_cell() -> f64 {
    2.0
}
fn default_weight() -> String {
    "briggs".to_string()
}
fn default_niter() -> u64 {
    120_000
}
fn default_nmiter() -> u32 {
    5
}
fn default_mgain() -> f64 {
    0.9
}
fn default_nchans() -> u32 {
    3
}
fn default_pol() -> String {
    "I".to_string()
}
fn default_fit_spectral_pol() -> u32 {
    2
}
fn default_columns() -> Vec<String> {
    vec!["DATA".to_string(), "CORRECTED_DATA".to_string()]
}
fn default_auto_threshold() -> Vec<f64> {
    vec![0.5]
}
fn default_auto_mask() -> Vec<f64> {
    vec![10.0]
}
fn default_thresh_pix() -> Vec<f64> {
    vec![10.0]
}
fn default_thresh_isl() -> Vec<f64> {
    vec![5.0]
}
fn default_gain_matrix_type() -> Vec<String> {
    vec!["phase-diag".to_string(), "complex-2x2".to_string()]
}
fn default_gsols_time() -> Vec<u64> {
    vec![1]
}
fn default_gsols_channel() -> Vec<u64> {
    vec![0]
}
fn default_output_data() -> Vec<String> {
    vec!["CORR_DATA".to_string()]
}
fn default_time_chunk() -> u64 {
    128
}
fn default_ncpu() -> u32 {
    4
}
fn default_clip_low() -> f64 {
    0.5
}
fn default_clip_high() -> f64 {
    1.5
}
fn default_weight_column() -> String {
    "WEIGHT".to_string()
}
fn default_tolerance() -> f64 {
    0.02
}
fn default_convergence_criteria() -> Vec<String> {
    ["DR", "SKEW", "KURT", "STDDEV", "MEAN"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_normality_model() -> String {
    "normaltest".to_string()
}
fn default_area_factor() -> f64 {
    2.0
}

macro_rules! impl_default_via_serde {
    ($($t:ty),*) => {
        $(impl Default for $t {
            fn default() -> Self {
                // An empty mapping deserializes to all defaults.
                serde_yaml::from_str("{}").expect("all fields have defaults")
            }
        })*
    };
}
impl_default_via_serde!(ImageConfig, ExtractConfig, CalibrateConfig, AimfastConfig);

impl SelfcalConfig {
    pub fn from_path(path: &Path) -> Result<SelfcalConfig, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate the raw configuration into the parameters the rest of the
    /// crate works with.
    pub fn into_params(self) -> Result<SelfcalParams, ConfigError> {
        if self.cal_niter == 0 {
            return Err(ConfigError::ZeroCalNiter);
        }
        if !(self.aimfast.tolerance > 0.0 && self.aimfast.tolerance < 1.0) {
            return Err(ConfigError::BadTolerance {
                got: self.aimfast.tolerance,
            });
        }

        let targets = self
            .targets
            .into_iter()
            .map(|t| {
                let mslist = Vec1::try_from_vec(t.ms).map_err(|_| ConfigError::EmptyMsList {
                    target: t.name.clone(),
                })?;
                Ok(Target {
                    name: t.name,
                    field_id: t.field_id,
                    mslist,
                })
            })
            .collect::<Result<Vec<Target>, ConfigError>>()?;
        let targets = Vec1::try_from_vec(targets).map_err(|_| ConfigError::NoTargets)?;

        let criteria = self
            .aimfast
            .convergence_criteria
            .iter()
            .map(|s| {
                Criterion::from_str(s).map_err(|_| ConfigError::UnknownCriterion { got: s.clone() })
            })
            .collect::<Result<Vec<Criterion>, ConfigError>>()?;

        let gain_matrix_type = nonempty(
            self.calibrate
                .gain_matrix_type
                .iter()
                .map(|s| {
                    MatrixType::from_str(s)
                        .map_err(|_| ConfigError::UnknownMatrixType { got: s.clone() })
                })
                .collect::<Result<Vec<MatrixType>, ConfigError>>()?,
            "calibrate.gain_matrix_type",
        )?;

        let output_data = nonempty(
            self.calibrate
                .output_data
                .iter()
                .map(|s| {
                    OutputMode::from_str(s)
                        .map_err(|_| ConfigError::UnknownOutputMode { got: s.clone() })
                })
                .collect::<Result<Vec<OutputMode>, ConfigError>>()?,
            "calibrate.output_data",
        )?;

        // "briggs" needs its robustness attached before it reaches the
        // imager.
        let weight = if self.image.weight == "briggs" {
            format!("briggs {}", self.image.robust)
        } else {
            self.image.weight
        };

        Ok(SelfcalParams {
            prefix: self.prefix,
            input: self.input,
            output: self.output,
            targets,
            start_at_iter: self.start_at_iter.max(1),
            cal_niter: self.cal_niter,
            image: ImageParams {
                enable: self.image.enable,
                npix: self.image.npix,
                padding: self.image.padding,
                cell: self.image.cell,
                weight,
                niter: self.image.niter,
                nmiter: self.image.nmiter,
                mgain: self.image.mgain,
                nchans: self.image.nchans,
                pol: self.image.pol,
                joinchannels: self.image.joinchannels,
                fit_spectral_pol: self.image.fit_spectral_pol,
                uvtaper: self.image.uvtaper.filter(|t| !t.is_empty()),
                multi_scale: self.image.multi_scale,
                multi_scale_scales: self.image.multi_scale_scales,
                local_rms: self.image.local_rms,
                columns: nonempty(self.image.column, "image.column")?,
                auto_threshold: nonempty(self.image.auto_threshold, "image.auto_threshold")?,
                auto_mask: nonempty(self.image.auto_mask, "image.auto_mask")?,
                mask: self.image.mask,
                mask_sigma: self.image.mask_sigma,
                mask_peak_fraction: self.image.mask_peak_fraction,
            },
            extract: ExtractParams {
                enable: self.extract_sources.enable,
                thresh_pix: nonempty(
                    self.extract_sources.thresh_pix,
                    "extract_sources.thresh_pix",
                )?,
                thresh_isl: nonempty(
                    self.extract_sources.thresh_isl,
                    "extract_sources.thresh_isl",
                )?,
                local_rms: self.extract_sources.local_rms,
            },
            calibrate: CalibrateParams {
                enable: self.calibrate.enable,
                gain_matrix_type,
                gsols_time: nonempty(self.calibrate.gsols_time, "calibrate.gsols_time")?,
                gsols_channel: nonempty(self.calibrate.gsols_channel, "calibrate.gsols_channel")?,
                output_data,
                two_step: self.calibrate.two_step,
                time_chunk: self.calibrate.time_chunk,
                freq_chunk: self.calibrate.freq_chunk,
                ncpu: self.calibrate.ncpu,
                gain_amplitude_clip_low: self.calibrate.gain_amplitude_clip_low,
                gain_amplitude_clip_high: self.calibrate.gain_amplitude_clip_high,
                weight_column: self.calibrate.weight_column,
            },
            assess: AssessParams {
                enable: self.aimfast.enable,
                normality_model: self.aimfast.normality_model,
                area_factor: self.aimfast.area_factor,
            },
            convergence: ConvergenceSettings {
                criteria,
                tolerance: self.aimfast.tolerance,
                max_iterations: self.cal_niter,
            },
        })
    }
}

fn nonempty<T>(values: Vec<T>, key: &'static str) -> Result<Vec1<T>, ConfigError> {
    Vec1::try_from_vec(values).map_err(|_| ConfigError::EmptyOptionList { key })
}

// Validated parameters.

#[derive(Debug, Clone)]
pub struct SelfcalParams {
    pub prefix: String,
    pub input: PathBuf,
    pub output: PathBuf,
    pub targets: Vec1<Target>,
    pub start_at_iter: u32,
    pub cal_niter: u32,
    pub image: ImageParams,
    pub extract: ExtractParams,
    pub calibrate: CalibrateParams,
    pub assess: AssessParams,
    pub convergence: ConvergenceSettings,
}

#[derive(Debug, Clone)]
pub struct ImageParams {
    pub enable: bool,
    pub npix: u32,
    pub padding: f64,
    pub cell: f64,
    /// Fully resolved weighting string (briggs robustness included).
    pub weight: String,
    pub niter: u64,
    pub nmiter: u32,
    pub mgain: f64,
    pub nchans: u32,
    pub pol: String,
    pub joinchannels: bool,
    pub fit_spectral_pol: u32,
    pub uvtaper: Option<String>,
    pub multi_scale: bool,
    pub multi_scale_scales: Option<Vec<u32>>,
    pub local_rms: bool,
    pub columns: Vec1<String>,
    pub auto_threshold: Vec1<f64>,
    pub auto_mask: Vec1<f64>,
    pub mask: bool,
    pub mask_sigma: Option<f64>,
    pub mask_peak_fraction: Option<f64>,
}

impl ImageParams {
    /// The "-MFS" infix present in image names when more than one output
    /// channel is made.
    pub fn mfs_infix(&self) -> &'static str {
        if self.nchans > 1 {
            "-MFS"
        } else {
            ""
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractParams {
    pub enable: bool,
    pub thresh_pix: Vec1<f64>,
    pub thresh_isl: Vec1<f64>,
    pub local_rms: bool,
}

#[derive(Debug, Clone)]
pub struct CalibrateParams {
    pub enable: bool,
    pub gain_matrix_type: Vec1<MatrixType>,
    pub gsols_time: Vec1<u64>,
    pub gsols_channel: Vec1<u64>,
    pub output_data: Vec1<OutputMode>,
    pub two_step: bool,
    pub time_chunk: u64,
    pub freq_chunk: u64,
    pub ncpu: u32,
    pub gain_amplitude_clip_low: f64,
    pub gain_amplitude_clip_high: f64,
    pub weight_column: String,
}

#[derive(Debug, Clone)]
pub struct AssessParams {
    pub enable: bool,
    pub normality_model: String,
    pub area_factor: f64,
}

impl SelfcalParams {
    /// Adaptive solution-interval estimation needs both the two-step
    /// calibration mode and the fidelity assessments it feeds on.
    pub fn adaptive_solint(&self) -> bool {
        self.calibrate.two_step && self.assess.enable
    }

    pub fn log_summary(&self) {
        info!("Products prefixed: {}", self.prefix);
        info!(
            "Targets: {}",
            self.targets.iter().map(|t| t.name.as_str()).join(", ")
        );
        info!(
            "Iterations: starting at {}, budget {}",
            self.start_at_iter, self.cal_niter
        );
        info!(
            "Convergence: tolerance {}, criteria [{}]",
            self.convergence.tolerance,
            self.convergence.criteria.iter().join(", ")
        );
        if self.adaptive_solint() {
            info!("Solution intervals: adaptive (two-step)");
        } else {
            info!(
                "Solution intervals: {:?} dump(s), {:?} channel(s)",
                self.calibrate.gsols_time, self.calibrate.gsols_channel
            );
        }
    }
}
