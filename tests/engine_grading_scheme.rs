#[path = "../src/engine/mod.rs"]
mod engine;

use engine::scheme::{audit, resolve, GradingScheme};
use engine::GradeSetting;

fn covering_scheme() -> Vec<GradeSetting> {
    vec![
        GradeSetting::new("A", "80-100", "Excellent"),
        GradeSetting::new("B", "70-79", "Very Good"),
        GradeSetting::new("C", "60-69", "Good"),
        GradeSetting::new("D", "50-59", "Fair"),
        GradeSetting::new("F", "0-49", "Fail"),
    ]
}

#[test]
fn every_whole_percentage_resolves_under_a_covering_scheme() {
    let settings = covering_scheme();
    let report = audit(&settings);
    assert!(report.is_clean(), "covering scheme should audit clean: {:?}", report);

    for p in 0..=100 {
        let res = resolve(p as f64, &settings);
        let grade = res
            .grade
            .unwrap_or_else(|| panic!("no grade for {}", p));
        let expected = match p {
            80..=100 => "A",
            70..=79 => "B",
            60..=69 => "C",
            50..=59 => "D",
            _ => "F",
        };
        assert_eq!(grade.grade, expected, "percentage {}", p);
    }
}

#[test]
fn two_row_scheme_leaves_low_scores_unresolved() {
    let settings = vec![
        GradeSetting::new("A", "80-100", ""),
        GradeSetting::new("B", "60-79", ""),
    ];
    assert!(resolve(50.0, &settings).grade.is_none());
    assert_eq!(
        resolve(65.0, &settings).grade.map(|g| g.grade),
        Some("B".to_string())
    );
}

#[test]
fn percentage_in_a_gap_is_not_found() {
    let settings = vec![
        GradeSetting::new("A", "80-100", ""),
        GradeSetting::new("B", "60-79", ""),
        GradeSetting::new("F", "0-49", ""),
    ];
    let res = resolve(50.0, &settings);
    assert!(res.grade.is_none());

    let report = audit(&settings);
    assert_eq!(report.gaps.len(), 1);
    assert_eq!(report.gaps[0].from, 50.0);
    assert_eq!(report.gaps[0].to, 59.0);
}

#[test]
fn overlapping_ranges_resolve_to_the_first_listed_row() {
    let settings = vec![
        GradeSetting::new("A+", "75-100", "Distinction"),
        GradeSetting::new("A", "80-100", "Excellent"),
        GradeSetting::new("B", "0-74", ""),
    ];
    let res = resolve(80.0, &settings);
    assert_eq!(res.grade.expect("grade").grade, "A+");

    let report = audit(&settings);
    assert_eq!(report.overlaps.len(), 1);
    assert!(report
        .notices()
        .iter()
        .any(|n| n.code == "overlapping_grade_ranges"));
}

#[test]
fn malformed_rows_are_skipped_not_fatal() {
    let settings = vec![
        GradeSetting::new("A", "80-100", ""),
        GradeSetting::new("X", "abc", ""),
        GradeSetting::new("Y", "90-80", ""),
        GradeSetting::new("F", "0-79", ""),
    ];
    let scheme = GradingScheme::from_settings(&settings);
    assert_eq!(scheme.bands().len(), 2);
    assert_eq!(scheme.warnings().len(), 2);
    assert!(scheme
        .warnings()
        .iter()
        .all(|n| n.code == "malformed_grade_range"));
    assert_eq!(scheme.resolve(85.0).map(|b| b.grade.as_str()), Some("A"));
    assert_eq!(scheme.resolve(10.0).map(|b| b.grade.as_str()), Some("F"));
}

#[test]
fn out_of_range_input_is_not_found_with_a_warning() {
    let settings = covering_scheme();
    for p in [-1.0, 100.5, f64::NAN] {
        let res = resolve(p, &settings);
        assert!(res.grade.is_none(), "{} should not resolve", p);
    }
    let res = resolve(120.0, &settings);
    assert!(res
        .warnings
        .iter()
        .any(|n| n.code == "percentage_out_of_range"));
}
