// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The image-fidelity store.
//!
//! After every assessment round an external fidelity tool appends the
//! statistics of the latest residual image to a JSON file in the pipeline
//! output directory. The store is keyed by
//! `"<prefix>_<field>_<iteration>-residual"`; each record carries the
//! residual's `SKEW`, `KURT`, `MEAN` and `STDDev`, plus a nested
//! `"<prefix>_<field>_<iteration>-model"` object whose `DR` is the dynamic
//! range achieved with that iteration's sky model. The key and field names
//! are a wire contract with the fidelity tool; do not rename them.
//!
//! Records are only ever appended under new keys, never mutated, and the
//! loop controller only reads the file after a recipe flush, so re-reading
//! the whole file at each synchronisation point is safe.

mod error;
#[cfg(test)]
mod tests;

pub use error::FidelityError;

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

/// The file the external fidelity tool writes into the pipeline output
/// directory.
pub const FIDELITY_RESULTS_FILENAME: &str = "fidelity_results.json";

/// Identifies one iteration's images within the store.
#[derive(Debug, Clone, Copy)]
pub struct ImageKey<'a> {
    pub prefix: &'a str,
    pub field: &'a str,
    pub iteration: u32,
}

impl ImageKey<'_> {
    pub fn residual(&self) -> String {
        format!("{}_{}_{}-residual", self.prefix, self.field, self.iteration)
    }

    pub fn model(&self) -> String {
        format!("{}_{}_{}-model", self.prefix, self.field, self.iteration)
    }
}

/// Statistical descriptors of one residual image.
#[derive(Debug, Clone, Deserialize)]
pub struct ResidualStats {
    #[serde(rename = "SKEW")]
    pub skew: f64,

    #[serde(rename = "KURT")]
    pub kurtosis: f64,

    #[serde(rename = "MEAN")]
    pub mean: f64,

    #[serde(rename = "STDDev")]
    pub std_dev: f64,

    /// Everything else the fidelity tool recorded, including the nested
    /// per-model dynamic-range objects.
    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

impl ResidualStats {
    /// The dynamic range achieved with the named sky model, nested inside
    /// this residual's record under `"<model key>": {"DR": ...}`.
    pub fn dynamic_range(&self, key: &ImageKey) -> Result<f64, FidelityError> {
        let model = key.model();
        self.extra
            .get(&model)
            .and_then(|v| v.get("DR"))
            .and_then(Value::as_f64)
            .ok_or(FidelityError::MissingModelStats { key: model })
    }
}

/// A read-only view of the fidelity results written so far.
#[derive(Debug, Clone)]
pub struct FidelityStore {
    records: HashMap<String, ResidualStats>,
}

impl FidelityStore {
    /// Read the store from the pipeline output directory.
    pub fn open(output: &Path) -> Result<FidelityStore, FidelityError> {
        let path = output.join(FIDELITY_RESULTS_FILENAME);
        let contents = std::fs::read_to_string(&path).map_err(|source| FidelityError::Read {
            path: path.clone(),
            source,
        })?;
        FidelityStore::from_json(&contents)
            .map_err(|source| FidelityError::Parse { path, source })
    }

    /// Parse a store from raw JSON text.
    pub fn from_json(json: &str) -> Result<FidelityStore, serde_json::Error> {
        Ok(FidelityStore {
            records: serde_json::from_str(json)?,
        })
    }

    /// The residual statistics recorded for one iteration's image.
    pub fn residual(&self, key: &ImageKey) -> Result<&ResidualStats, FidelityError> {
        let residual = key.residual();
        self.records
            .get(&residual)
            .ok_or(FidelityError::MissingResidual { key: residual })
    }
}
