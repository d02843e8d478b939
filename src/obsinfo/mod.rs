// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Observation metadata extracted from a measurement set.
//!
//! An upstream worker dumps each measurement set's metadata to
//! `<ms>-obsinfo.json`. The solution-interval estimator only needs three
//! things from it: the correlator integration time, the total on-target scan
//! time, and the antenna count. The field names here are a wire contract
//! with that upstream dump and must not be renamed.

mod error;
#[cfg(test)]
mod tests;

pub use error::ObsInfoError;

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ObsInfo {
    /// The correlator integration ("dump") time \[seconds\].
    #[serde(rename = "EXPOSURE")]
    pub exposure: f64,

    /// Scan durations \[seconds\], keyed by FIELD id then scan id.
    #[serde(rename = "SCAN")]
    pub scans: HashMap<String, HashMap<String, f64>>,

    #[serde(rename = "ANT")]
    pub antennas: AntennaTable,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AntennaTable {
    /// One entry per antenna; the length of this array is the antenna count.
    #[serde(rename = "DISH_DIAMETER")]
    pub dish_diameters: Vec<f64>,
}

impl ObsInfo {
    /// Read the metadata dump for `ms` from the pipeline output directory.
    pub fn for_ms(output: &Path, ms: &str) -> Result<ObsInfo, ObsInfoError> {
        let stem = ms.strip_suffix(".ms").unwrap_or(ms);
        ObsInfo::from_path(&output.join(format!("{stem}-obsinfo.json")))
    }

    pub fn from_path(path: &Path) -> Result<ObsInfo, ObsInfoError> {
        let file = File::open(path).map_err(|source| ObsInfoError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let info: ObsInfo = serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            ObsInfoError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        info.validate(path)
    }

    fn validate(self, path: &Path) -> Result<ObsInfo, ObsInfoError> {
        if !(self.exposure > 0.0) {
            return Err(ObsInfoError::BadExposure {
                got: self.exposure,
                path: path.to_path_buf(),
            });
        }
        if self.antennas.dish_diameters.is_empty() {
            return Err(ObsInfoError::NoAntennas(path.to_path_buf()));
        }
        Ok(self)
    }

    pub fn integration_time(&self) -> f64 {
        self.exposure
    }

    /// The total time spent on the field, summed over all of its scans
    /// \[seconds\].
    pub fn total_scan_time(&self, field_id: &str) -> Result<f64, ObsInfoError> {
        let scans = self
            .scans
            .get(field_id)
            .ok_or_else(|| ObsInfoError::UnknownField {
                field_id: field_id.to_string(),
            })?;
        Ok(scans.values().sum())
    }

    pub fn num_antennas(&self) -> usize {
        self.antennas.dish_diameters.len()
    }
}
