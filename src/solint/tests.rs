// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::collections::HashMap;

use approx::assert_abs_diff_eq;
use serde_json::{json, Value};
use vec1::vec1;

use super::*;
use crate::obsinfo::AntennaTable;

const PREFIX: &str = "mkat";
const FIELD: &str = "deep2";

// All fixtures share 8 s dumps, 20000 s on target and 4 antennas, so the
// solve time for a residual with dynamic range D is
// snr^2 * 20000 * 4 / (2 * D^2 * 8) dumps; the noise cancels out.
fn obs() -> ObsInfo {
    ObsInfo {
        exposure: 8.0,
        scans: HashMap::from([(
            "0".to_string(),
            HashMap::from([("1".to_string(), 12000.0), ("2".to_string(), 8000.0)]),
        )]),
        antennas: AntennaTable {
            dish_diameters: vec![13.5; 4],
        },
    }
}

fn store_with(drs: &[(u32, f64)]) -> FidelityStore {
    let mut root = serde_json::Map::new();
    for (n, dr) in drs {
        let key = ImageKey {
            prefix: PREFIX,
            field: FIELD,
            iteration: *n,
        };
        let mut record = serde_json::Map::new();
        record.insert("SKEW".to_string(), json!(0.01));
        record.insert("KURT".to_string(), json!(3.1));
        record.insert("MEAN".to_string(), json!(0.001));
        record.insert("STDDev".to_string(), json!(0.01));
        record.insert(key.model(), json!({ "DR": dr }));
        root.insert(key.residual(), Value::Object(record));
    }
    FidelityStore::from_json(&Value::Object(root).to_string()).unwrap()
}

fn target() -> Target {
    Target {
        name: FIELD.to_string(),
        field_id: "0".to_string(),
        mslist: vec1!["deep2.ms".to_string()],
    }
}

#[test]
fn the_first_iteration_solves_phase_only_and_never_escalates() {
    let mut state = IterationState::new(1);
    let est = estimate(&mut state, &store_with(&[(1, 10.0)]), &obs(), PREFIX, &target()).unwrap();

    // 3^2 * 20000 * 4 / (2 * 100 * 8) = 450 dumps.
    assert_eq!(est.matrix_type, MatrixType::PhaseDiag);
    assert_eq!(est.time_dumps, 450);
    assert_abs_diff_eq!(est.snr, 3.0);
    assert_eq!(state.reset_count, 0);
    assert_eq!(
        state.trace,
        vec![TraceEntry {
            matrix_type: MatrixType::PhaseDiag,
            snr: 3.0
        }]
    );
}

#[test]
fn a_stagnant_phase_solve_escalates_to_full() {
    let mut state = IterationState::new(2);
    state.trace.push(TraceEntry {
        matrix_type: MatrixType::PhaseDiag,
        snr: 3.0,
    });

    // No dynamic-range improvement between iterations 1 and 2.
    let store = store_with(&[(1, 10.0), (2, 10.0)]);
    let est = estimate(&mut state, &store, &obs(), PREFIX, &target()).unwrap();

    // Escalated: 8^2 * 20000 * 4 / (2 * 100 * 8) = 3200 dumps, spread over
    // iteration 2.
    assert_eq!(est.matrix_type, MatrixType::Complex2x2);
    assert_abs_diff_eq!(est.snr, 8.0);
    assert_eq!(est.time_dumps, 1600);
    assert_eq!(state.reset_count, 0);
    assert_eq!(
        state.trace.last().copied(),
        Some(TraceEntry {
            matrix_type: MatrixType::Complex2x2,
            snr: 8.0
        })
    );
}

#[test]
fn a_stagnant_full_solve_counts_towards_the_reset_cap() {
    let mut state = IterationState::new(3);
    state.trace.push(TraceEntry {
        matrix_type: MatrixType::PhaseDiag,
        snr: 3.0,
    });
    state.trace.push(TraceEntry {
        matrix_type: MatrixType::Complex2x2,
        snr: 8.0,
    });

    let store = store_with(&[(2, 10.0), (3, 10.0)]);
    let est = estimate(&mut state, &store, &obs(), PREFIX, &target()).unwrap();

    // The previous round's solve time (3200 dumps) is reused.
    assert_eq!(est.matrix_type, MatrixType::Complex2x2);
    assert_eq!(est.time_dumps, 3200 / 3);
    assert_eq!(state.reset_count, 1);
}

#[test]
fn phase_only_intervals_are_floored_at_thirty_seconds() {
    let mut state = IterationState::new(2);
    state.trace.push(TraceEntry {
        matrix_type: MatrixType::PhaseDiag,
        snr: 3.0,
    });

    // A tenfold dynamic-range improvement solves in 4 dumps; halved over the
    // iteration that is below the 30 s floor (30 / 8 s = 3 dumps).
    let store = store_with(&[(1, 10.0), (2, 100.0)]);
    let est = estimate(&mut state, &store, &obs(), PREFIX, &target()).unwrap();

    assert_eq!(est.matrix_type, MatrixType::PhaseDiag);
    assert_eq!(est.time_dumps, 3);
    // Hitting the floor on a phase-only solve is not stagnation.
    assert_eq!(state.reset_count, 0);
}

#[test]
fn full_intervals_are_floored_at_thirty_minutes_and_count_as_stagnation() {
    let mut state = IterationState::new(2);
    state.trace.push(TraceEntry {
        matrix_type: MatrixType::Complex2x2,
        snr: 8.0,
    });

    let store = store_with(&[(1, 10.0), (2, 40.0)]);
    let est = estimate(&mut state, &store, &obs(), PREFIX, &target()).unwrap();

    // 8^2 * 20000 * 4 / (2 * 1600 * 8) = 200 dumps, spread over iteration 2
    // is 100, below the 30 min floor (1800 / 8 s = 225 dumps).
    assert_eq!(est.matrix_type, MatrixType::Complex2x2);
    assert_eq!(est.time_dumps, 225);
    assert_eq!(state.reset_count, 1);
}

#[test]
fn a_pending_reset_forces_escalation_even_when_improving() {
    let mut state = IterationState::new(2);
    state.reset_count = 1;
    state.trace.push(TraceEntry {
        matrix_type: MatrixType::PhaseDiag,
        snr: 3.0,
    });

    let store = store_with(&[(1, 10.0), (2, 40.0)]);
    let est = estimate(&mut state, &store, &obs(), PREFIX, &target()).unwrap();

    assert_eq!(est.matrix_type, MatrixType::Complex2x2);
    assert_abs_diff_eq!(est.snr, 8.0);
    assert_eq!(state.reset_count, 1);
}

#[test]
fn a_zero_dynamic_range_is_an_error() {
    let mut state = IterationState::new(1);
    let result = estimate(&mut state, &store_with(&[(1, 0.0)]), &obs(), PREFIX, &target());
    assert!(matches!(result, Err(SolintError::DegenerateStats { .. })));
}

#[test]
fn matrix_types_use_cubical_vocabulary() {
    assert_eq!(MatrixType::PhaseDiag.to_string(), "phase-diag");
    assert_eq!(MatrixType::Complex2x2.to_string(), "complex-2x2");
    assert_abs_diff_eq!(MatrixType::PhaseDiag.min_solve_secs(), 30.0);
    assert_abs_diff_eq!(MatrixType::Complex2x2.min_solve_secs(), 1800.0);
}
