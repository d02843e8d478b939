// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::io::Write;

use approx::assert_abs_diff_eq;
use indoc::indoc;

use super::*;

// The shape of an upstream obsinfo dump, trimmed to the tables we read.
const OBSINFO_JSON: &str = indoc! {r#"
    {
        "EXPOSURE": 7.9966,
        "SCAN": {
            "0": {"3": 1424.0, "9": 1432.0, "15": 1424.0},
            "1": {"5": 299.6}
        },
        "ANT": {
            "DISH_DIAMETER": [13.5, 13.5, 13.5, 13.5],
            "NAME": ["m000", "m001", "m002", "m003"]
        },
        "NCOR": 4
    }
"#};

fn write_obsinfo(dir: &Path, ms: &str, contents: &str) {
    let stem = ms.strip_suffix(".ms").unwrap_or(ms);
    let mut f = std::fs::File::create(dir.join(format!("{stem}-obsinfo.json"))).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
}

#[test]
fn parse_an_obsinfo_dump() {
    let dir = tempfile::tempdir().unwrap();
    write_obsinfo(dir.path(), "1527016443_deep2.ms", OBSINFO_JSON);

    let info = ObsInfo::for_ms(dir.path(), "1527016443_deep2.ms").unwrap();
    assert_abs_diff_eq!(info.integration_time(), 7.9966);
    assert_eq!(info.num_antennas(), 4);
}

#[test]
fn scan_times_are_summed_per_field() {
    let dir = tempfile::tempdir().unwrap();
    write_obsinfo(dir.path(), "deep2.ms", OBSINFO_JSON);
    let info = ObsInfo::for_ms(dir.path(), "deep2.ms").unwrap();

    assert_abs_diff_eq!(info.total_scan_time("0").unwrap(), 4280.0);
    assert_abs_diff_eq!(info.total_scan_time("1").unwrap(), 299.6);
    assert!(matches!(
        info.total_scan_time("2"),
        Err(ObsInfoError::UnknownField { ref field_id }) if field_id == "2"
    ));
}

#[test]
fn a_missing_dump_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = ObsInfo::for_ms(dir.path(), "absent.ms");
    assert!(matches!(result, Err(ObsInfoError::Read { .. })));
}

#[test]
fn an_empty_antenna_table_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    write_obsinfo(
        dir.path(),
        "deep2.ms",
        r#"{"EXPOSURE": 8.0, "SCAN": {"0": {"1": 100.0}}, "ANT": {"DISH_DIAMETER": []}}"#,
    );
    let result = ObsInfo::for_ms(dir.path(), "deep2.ms");
    assert!(matches!(result, Err(ObsInfoError::NoAntennas(_))));
}

#[test]
fn a_non_positive_exposure_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    write_obsinfo(
        dir.path(),
        "deep2.ms",
        r#"{"EXPOSURE": 0.0, "SCAN": {"0": {"1": 100.0}}, "ANT": {"DISH_DIAMETER": [13.5]}}"#,
    );
    let result = ObsInfo::for_ms(dir.path(), "deep2.ms");
    assert!(matches!(result, Err(ObsInfoError::BadExposure { .. })));
}
