// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use indoc::indoc;

use super::*;

// A fidelity_results.json as the external assessment tool writes it. The
// per-model dynamic range is nested inside the residual's record, and tools
// are free to add extra statistics we don't read.
const FIDELITY_JSON: &str = indoc! {r#"
    {
        "mkat_deep2_1-residual": {
            "SKEW": 0.021,
            "KURT": 3.184,
            "MEAN": 0.0013,
            "STDDev": 0.000124,
            "RMS": 0.000131,
            "MAD": 0.00008,
            "mkat_deep2_1-model": {"DR": 1244.7}
        },
        "mkat_deep2_2-residual": {
            "SKEW": 0.017,
            "KURT": 3.071,
            "MEAN": 0.0009,
            "STDDev": 0.000101,
            "mkat_deep2_2-model": {"DR": 1893.2}
        }
    }
"#};

fn key(iteration: u32) -> ImageKey<'static> {
    ImageKey {
        prefix: "mkat",
        field: "deep2",
        iteration,
    }
}

#[test]
fn parse_a_fidelity_store() {
    let store = FidelityStore::from_json(FIDELITY_JSON).unwrap();

    let residual = store.residual(&key(1)).unwrap();
    assert_abs_diff_eq!(residual.skew, 0.021);
    assert_abs_diff_eq!(residual.kurtosis, 3.184);
    assert_abs_diff_eq!(residual.mean, 0.0013);
    assert_abs_diff_eq!(residual.std_dev, 0.000124);
    assert_abs_diff_eq!(residual.dynamic_range(&key(1)).unwrap(), 1244.7);

    let residual = store.residual(&key(2)).unwrap();
    assert_abs_diff_eq!(residual.dynamic_range(&key(2)).unwrap(), 1893.2);
}

#[test]
fn image_keys_follow_the_wire_format() {
    assert_eq!(key(3).residual(), "mkat_deep2_3-residual");
    assert_eq!(key(3).model(), "mkat_deep2_3-model");
}

#[test]
fn a_missing_residual_is_an_error() {
    let store = FidelityStore::from_json(FIDELITY_JSON).unwrap();
    assert!(matches!(
        store.residual(&key(7)),
        Err(FidelityError::MissingResidual { ref key }) if key == "mkat_deep2_7-residual"
    ));
}

#[test]
fn a_missing_model_entry_is_an_error() {
    let store = FidelityStore::from_json(FIDELITY_JSON).unwrap();
    let residual = store.residual(&key(1)).unwrap();
    // Iteration 2's model is not nested inside iteration 1's residual.
    assert!(matches!(
        residual.dynamic_range(&key(2)),
        Err(FidelityError::MissingModelStats { .. })
    ));
}

#[test]
fn reading_from_the_output_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(FIDELITY_RESULTS_FILENAME), FIDELITY_JSON).unwrap();
    let store = FidelityStore::open(dir.path()).unwrap();
    assert!(store.residual(&key(1)).is_ok());

    let empty = tempfile::tempdir().unwrap();
    assert!(matches!(
        FidelityStore::open(empty.path()),
        Err(FidelityError::Read { .. })
    ));
}
