use serde_json::json;

use super::model::{Decision, Notice, PromotionCriteria, PromotionDecision, StudentTermSummary};

pub const REASON_AVERAGE: &str = "Average below threshold";
pub const REASON_FAILED_SUBJECTS: &str = "Too many failed subjects";
pub const REASON_ATTENDANCE: &str = "Insufficient attendance";
pub const REASON_INCOMPLETE: &str = "Incomplete academic record";

/// Decides promotion for one student. Every failing rule contributes its
/// reason; a terminal class turns a pass into `Graduate`. A missing
/// attendance record fails the attendance rule.
pub fn evaluate(
    summary: &StudentTermSummary,
    attendance_percent: Option<f64>,
    criteria: &PromotionCriteria,
    is_terminal_class: bool,
) -> PromotionDecision {
    let mut warnings = Vec::new();

    let Some(average) = summary
        .overall_average
        .filter(|_| summary.has_recorded_subjects())
    else {
        return PromotionDecision {
            student_id: summary.student_id.clone(),
            class_id: summary.class_id.clone(),
            decision: Decision::Retain,
            reasons: vec![REASON_INCOMPLETE.to_string()],
            warnings,
        };
    };

    let mut reasons = Vec::new();
    if average < criteria.min_average {
        reasons.push(REASON_AVERAGE.to_string());
    }
    if summary.failed_subject_count > criteria.max_failed_subjects as usize {
        reasons.push(REASON_FAILED_SUBJECTS.to_string());
    }
    match attendance_percent.filter(|p| p.is_finite()) {
        Some(p) if p >= criteria.min_attendance_percent => {}
        Some(_) => reasons.push(REASON_ATTENDANCE.to_string()),
        None => {
            warnings.push(
                Notice::new("attendance_missing", "no attendance recorded for this term")
                    .with_details(json!({ "studentId": summary.student_id })),
            );
            reasons.push(REASON_ATTENDANCE.to_string());
        }
    }

    let decision = if !reasons.is_empty() {
        Decision::Retain
    } else if is_terminal_class {
        Decision::Graduate
    } else {
        Decision::Promote
    };

    PromotionDecision {
        student_id: summary.student_id.clone(),
        class_id: summary.class_id.clone(),
        decision,
        reasons,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criteria() -> PromotionCriteria {
        PromotionCriteria {
            min_average: 50.0,
            max_failed_subjects: 2,
            min_attendance_percent: 90.0,
            fail_threshold: 40.0,
        }
    }

    fn summary(avg: Option<f64>, failed: usize) -> StudentTermSummary {
        StudentTermSummary {
            student_id: "s1".to_string(),
            class_id: "c1".to_string(),
            term_id: "t1".to_string(),
            enrollment_order: 0,
            subject_aggregates: Vec::new(),
            recorded_subject_count: if avg.is_some() { 3 } else { 0 },
            overall_average: avg,
            overall_total: 0.0,
            class_rank: None,
            school_rank: None,
            failed_subject_count: failed,
        }
    }

    #[test]
    fn boundary_values_pass() {
        let d = evaluate(&summary(Some(50.0), 2), Some(90.0), &criteria(), false);
        assert_eq!(d.decision, Decision::Promote);
        assert!(d.reasons.is_empty());
    }

    #[test]
    fn missing_attendance_retains_with_warning() {
        let d = evaluate(&summary(Some(80.0), 0), None, &criteria(), false);
        assert_eq!(d.decision, Decision::Retain);
        assert_eq!(d.reasons, vec![REASON_ATTENDANCE.to_string()]);
        assert_eq!(d.warnings[0].code, "attendance_missing");
    }

    #[test]
    fn incomplete_record_overrides_terminal_flag() {
        let d = evaluate(&summary(None, 0), Some(100.0), &criteria(), true);
        assert_eq!(d.decision, Decision::Retain);
        assert_eq!(d.reasons, vec![REASON_INCOMPLETE.to_string()]);
    }
}
