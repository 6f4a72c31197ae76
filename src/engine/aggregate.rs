use std::collections::{BTreeMap, BTreeSet};

use serde_json::json;
use tracing::debug;

use super::model::{
    round_off_1_decimal, AggregateStatus, AssignmentScore, AuditFlag, EngineSettings, Notice,
    SubjectAggregate,
};
use super::scheme::GradingScheme;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubjectKey {
    pub student_id: String,
    pub subject_id: String,
    pub term_id: String,
}

impl SubjectKey {
    pub fn new(student_id: &str, subject_id: &str, term_id: &str) -> Self {
        Self {
            student_id: student_id.to_string(),
            subject_id: subject_id.to_string(),
            term_id: term_id.to_string(),
        }
    }

    fn matches(&self, row: &AssignmentScore) -> bool {
        row.student_id == self.student_id
            && row.subject_id == self.subject_id
            && row.term_id == self.term_id
    }
}

/// Everything an aggregation needs besides the score rows themselves.
#[derive(Debug, Clone, Copy)]
pub struct AggregateConfig<'a> {
    pub scheme: &'a GradingScheme,
    pub fail_threshold: f64,
    pub settings: &'a EngineSettings,
}

/// Combines one student's scores for one subject and term into a single
/// percentage (`sum(score) / sum(max_score) * 100`) and resolves its grade.
pub fn aggregate(
    key: &SubjectKey,
    scores: &[AssignmentScore],
    cfg: &AggregateConfig<'_>,
) -> SubjectAggregate {
    let mut flags: BTreeSet<AuditFlag> = BTreeSet::new();
    let mut warnings: Vec<Notice> = Vec::new();
    let mut counted = 0_usize;
    let mut excluded = 0_usize;
    let mut sum_score = 0.0_f64;
    let mut sum_max = 0.0_f64;

    for row in scores {
        if !key.matches(row) {
            excluded += 1;
            flags.insert(AuditFlag::MismatchedRow);
            warnings.push(
                Notice::new(
                    "mismatched_score_row",
                    "score row belongs to a different student, subject or term",
                )
                .with_details(row_details(row)),
            );
            continue;
        }
        if !row.max_score.is_finite() || row.max_score <= 0.0 || !row.score.is_finite() {
            excluded += 1;
            flags.insert(AuditFlag::InvalidMaxScore);
            warnings.push(
                Notice::new("invalid_max_score", "score row excluded: max score must be > 0")
                    .with_details(row_details(row)),
            );
            continue;
        }
        if row.score > row.max_score {
            flags.insert(AuditFlag::ScoreExceedsMax);
            warnings.push(
                Notice::new("score_exceeds_max", "score is greater than its max score")
                    .with_details(row_details(row)),
            );
        }
        counted += 1;
        sum_score += row.score;
        sum_max += row.max_score;
    }

    if counted == 0 {
        debug!(
            student_id = %key.student_id,
            subject_id = %key.subject_id,
            "no usable scores recorded"
        );
        return SubjectAggregate {
            student_id: key.student_id.clone(),
            subject_id: key.subject_id.clone(),
            term_id: key.term_id.clone(),
            status: AggregateStatus::NoScoresRecorded,
            percentage: None,
            grade: cfg.settings.sentinel_grade.clone(),
            remark: cfg.settings.no_scores_label.clone(),
            failed: false,
            counted_entries: 0,
            excluded_entries: excluded,
            audit_flags: flags.into_iter().collect(),
            warnings,
        };
    }

    let percentage = round_off_1_decimal((100.0 * sum_score / sum_max).clamp(0.0, 100.0));
    let basis = grade_basis(percentage, cfg);
    let (grade, remark) = match cfg.scheme.resolve(basis) {
        Some(band) => (band.grade.clone(), band.remark.clone()),
        None => {
            warnings.push(
                Notice::new("grade_not_found", "no grade range contains this percentage")
                    .with_details(json!({ "percentage": percentage, "basis": basis })),
            );
            (cfg.settings.sentinel_grade.clone(), String::new())
        }
    };

    SubjectAggregate {
        student_id: key.student_id.clone(),
        subject_id: key.subject_id.clone(),
        term_id: key.term_id.clone(),
        status: AggregateStatus::Scored,
        percentage: Some(percentage),
        grade,
        remark,
        // Judged on the grade-lookup basis.
        failed: basis < cfg.fail_threshold,
        counted_entries: counted,
        excluded_entries: excluded,
        audit_flags: flags.into_iter().collect(),
        warnings,
    }
}

/// Value used for the grade lookup. Whole-number schemes such as `60-79`,
/// `80-100` are looked up by the half-up rounded whole percentage so that
/// 79.5 lands in `80-100` instead of falling between rows.
pub fn grade_basis(percentage: f64, cfg: &AggregateConfig<'_>) -> f64 {
    if cfg.settings.whole_number_grade_basis && cfg.scheme.is_whole_number() {
        (percentage + 0.5).floor().min(100.0)
    } else {
        percentage
    }
}

fn row_details(row: &AssignmentScore) -> serde_json::Value {
    json!({
        "id": row.id,
        "studentId": row.student_id,
        "subjectId": row.subject_id,
        "termId": row.term_id,
        "assignmentTypeId": row.assignment_type_id,
        "score": row.score,
        "maxScore": row.max_score,
    })
}

/// Aggregates every subject of one student in one term. `expected_subjects`
/// (the subjects the class offers) always yield an entry, in the given
/// order; subjects that only appear in the score rows follow, sorted by id.
pub fn aggregate_student_subjects(
    student_id: &str,
    term_id: &str,
    expected_subjects: &[String],
    scores: &[&AssignmentScore],
    cfg: &AggregateConfig<'_>,
) -> Vec<SubjectAggregate> {
    let mut by_subject: BTreeMap<&str, Vec<AssignmentScore>> = BTreeMap::new();
    for row in scores {
        if row.student_id != student_id || row.term_id != term_id {
            continue;
        }
        by_subject
            .entry(row.subject_id.as_str())
            .or_default()
            .push((*row).clone());
    }

    let mut out = Vec::with_capacity(expected_subjects.len().max(by_subject.len()));
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for subject_id in expected_subjects {
        if !seen.insert(subject_id.as_str()) {
            continue;
        }
        let rows = by_subject.get(subject_id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        out.push(aggregate(
            &SubjectKey::new(student_id, subject_id, term_id),
            rows,
            cfg,
        ));
    }
    for (subject_id, rows) in &by_subject {
        if seen.contains(subject_id) {
            continue;
        }
        let mut agg = aggregate(&SubjectKey::new(student_id, subject_id, term_id), rows, cfg);
        if !expected_subjects.is_empty() {
            agg.warnings.push(
                Notice::new(
                    "subject_not_offered",
                    "scores recorded for a subject the class does not offer",
                )
                .with_details(json!({ "subjectId": subject_id })),
            );
        }
        out.push(agg);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::model::GradeSetting;

    fn row(score: f64, max: f64) -> AssignmentScore {
        AssignmentScore {
            id: None,
            student_id: "s1".to_string(),
            subject_id: "math".to_string(),
            class_id: "c1".to_string(),
            term_id: "t1".to_string(),
            assignment_type_id: "test".to_string(),
            score,
            max_score: max,
        }
    }

    fn scheme() -> GradingScheme {
        GradingScheme::from_settings(&[
            GradeSetting::new("A", "80-100", "Excellent"),
            GradeSetting::new("B", "60-79", "Good"),
            GradeSetting::new("F", "0-59", "Fail"),
        ])
    }

    #[test]
    fn sums_scores_over_sum_of_max() {
        let scheme = scheme();
        let settings = EngineSettings::default();
        let cfg = AggregateConfig {
            scheme: &scheme,
            fail_threshold: 40.0,
            settings: &settings,
        };
        let agg = aggregate(
            &SubjectKey::new("s1", "math", "t1"),
            &[row(18.0, 20.0), row(9.0, 10.0)],
            &cfg,
        );
        assert_eq!(agg.percentage, Some(90.0));
        assert_eq!(agg.grade, "A");
        assert_eq!(agg.counted_entries, 2);
        assert!(!agg.failed);
    }

    #[test]
    fn half_point_rounds_into_next_whole_band() {
        let scheme = scheme();
        let settings = EngineSettings::default();
        let cfg = AggregateConfig {
            scheme: &scheme,
            fail_threshold: 40.0,
            settings: &settings,
        };
        let agg = aggregate(&SubjectKey::new("s1", "math", "t1"), &[row(159.0, 200.0)], &cfg);
        assert_eq!(agg.percentage, Some(79.5));
        assert_eq!(agg.grade, "A");
    }

    #[test]
    fn zero_max_rows_are_excluded_with_a_warning() {
        let scheme = scheme();
        let settings = EngineSettings::default();
        let cfg = AggregateConfig {
            scheme: &scheme,
            fail_threshold: 40.0,
            settings: &settings,
        };
        let agg = aggregate(
            &SubjectKey::new("s1", "math", "t1"),
            &[row(5.0, 0.0), row(6.0, 10.0)],
            &cfg,
        );
        assert_eq!(agg.percentage, Some(60.0));
        assert_eq!(agg.excluded_entries, 1);
        assert_eq!(agg.audit_flags, vec![AuditFlag::InvalidMaxScore]);
    }
}
