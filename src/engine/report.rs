use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::json;
use tracing::debug;

use super::aggregate::{aggregate_student_subjects, AggregateConfig};
use super::error::EngineError;
use super::model::{
    AssignmentScore, Notice, PromotionCriteria, PromotionDecision, StudentTermSummary, Term,
};
use super::promotion::evaluate;
use super::ranking::{rank, summarize, RankScope};
use super::scheme::GradingScheme;
use super::snapshot::TermSnapshot;

/// Summaries for every enrolled student of a term, in roster order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermSummaries {
    pub summaries: Vec<StudentTermSummary>,
    /// Problems that belong to the term as a whole (scheme rows, orphan scores).
    pub warnings: Vec<Notice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
    pub display_name: String,
    pub class_name: String,
    pub is_terminal_class: bool,
    #[serde(flatten)]
    pub summary: StudentTermSummary,
    /// Students ranked in the same class / across the term.
    pub class_ranked_count: usize,
    pub school_ranked_count: usize,
    pub attendance_percent: Option<f64>,
    pub decision: PromotionDecision,
    pub snapshot_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermReport {
    pub term: Term,
    pub snapshot_hash: String,
    pub warnings: Vec<Notice>,
    pub students: Vec<StudentReport>,
}

fn criteria_for(snapshot: &TermSnapshot) -> Result<&PromotionCriteria, EngineError> {
    snapshot
        .criteria
        .as_ref()
        .ok_or_else(|| EngineError::MissingCriteria(snapshot.term.academic_year.clone()))
}

/// Runs aggregation for every student of the term; no ranks yet.
pub fn summarize_term(snapshot: &TermSnapshot) -> Result<TermSummaries, EngineError> {
    let criteria = criteria_for(snapshot)?;
    if snapshot.students.is_empty() {
        return Err(EngineError::EmptyRoster(format!("term {}", snapshot.term.id)));
    }

    let scheme = GradingScheme::from_settings(&snapshot.grading_scheme);
    let cfg = AggregateConfig {
        scheme: &scheme,
        fail_threshold: criteria.fail_threshold,
        settings: &snapshot.settings,
    };
    let mut warnings: Vec<Notice> = scheme.warnings().to_vec();

    let mut by_student: HashMap<&str, Vec<&AssignmentScore>> = HashMap::new();
    for row in snapshot.scores.iter().filter(|r| r.term_id == snapshot.term.id) {
        by_student.entry(row.student_id.as_str()).or_default().push(row);
    }

    let mut summaries = Vec::with_capacity(snapshot.students.len());
    for student in &snapshot.students {
        let expected: &[String] = match snapshot.class(&student.class_id) {
            Some(class) => &class.subject_ids,
            None => {
                warnings.push(
                    Notice::new("unknown_class", "student belongs to a class with no configuration")
                        .with_details(json!({
                            "studentId": student.id,
                            "classId": student.class_id,
                        })),
                );
                &[]
            }
        };
        let rows = by_student.remove(student.id.as_str()).unwrap_or_default();
        let aggregates =
            aggregate_student_subjects(&student.id, &snapshot.term.id, expected, &rows, &cfg);
        summaries.push(summarize(student, &snapshot.term.id, aggregates));
    }

    let mut orphans: Vec<&str> = by_student.into_keys().collect();
    orphans.sort_unstable();
    for student_id in orphans {
        warnings.push(
            Notice::new("score_for_unknown_student", "scores recorded for a student not on the roster")
                .with_details(json!({ "studentId": student_id })),
        );
    }

    debug!(
        term_id = %snapshot.term.id,
        students = summaries.len(),
        "summarized term"
    );
    Ok(TermSummaries { summaries, warnings })
}

/// Summaries with both class and school ranks populated.
pub fn rank_term(snapshot: &TermSnapshot) -> Result<TermSummaries, EngineError> {
    let mut out = summarize_term(snapshot)?;
    rank(&mut out.summaries, RankScope::Class)?;
    rank(&mut out.summaries, RankScope::School)?;
    Ok(out)
}

/// Full pipeline for every student in the term.
pub fn compile_term(snapshot: &TermSnapshot) -> Result<TermReport, EngineError> {
    let criteria = criteria_for(snapshot)?.clone();
    let ranked = rank_term(snapshot)?;
    let snapshot_hash = snapshot.fingerprint();

    let mut class_counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut school_count = 0_usize;
    for s in &ranked.summaries {
        if s.class_rank.is_some() {
            *class_counts.entry(s.class_id.as_str()).or_insert(0) += 1;
        }
        if s.school_rank.is_some() {
            school_count += 1;
        }
    }

    let mut students = Vec::with_capacity(ranked.summaries.len());
    for summary in &ranked.summaries {
        let class = snapshot.class(&summary.class_id);
        let is_terminal_class = class.map(|c| c.is_terminal).unwrap_or(false);
        let attendance_percent = snapshot.attendance.get(&summary.student_id).copied();
        let decision = evaluate(summary, attendance_percent, &criteria, is_terminal_class);
        let display_name = snapshot
            .student(&summary.student_id)
            .map(|s| s.display_name.clone())
            .unwrap_or_default();
        students.push(StudentReport {
            display_name,
            class_name: class
                .map(|c| c.name.clone())
                .unwrap_or_else(|| summary.class_id.clone()),
            is_terminal_class,
            class_ranked_count: class_counts
                .get(summary.class_id.as_str())
                .copied()
                .unwrap_or(0),
            school_ranked_count: school_count,
            attendance_percent,
            decision,
            summary: summary.clone(),
            snapshot_hash: snapshot_hash.clone(),
        });
    }

    Ok(TermReport {
        term: snapshot.term.clone(),
        snapshot_hash,
        warnings: ranked.warnings,
        students,
    })
}

/// Reports for one class. School ranks are still computed across the term.
pub fn compile_class(snapshot: &TermSnapshot, class_id: &str) -> Result<TermReport, EngineError> {
    if !snapshot.students.iter().any(|s| s.class_id == class_id) {
        return Err(EngineError::ClassNotFound {
            class_id: class_id.to_string(),
            term_id: snapshot.term.id.clone(),
        });
    }
    let mut report = compile_term(snapshot)?;
    report.students.retain(|r| r.summary.class_id == class_id);
    Ok(report)
}

pub fn compile_student(
    snapshot: &TermSnapshot,
    student_id: &str,
) -> Result<StudentReport, EngineError> {
    let not_found = || EngineError::StudentNotFound {
        student_id: student_id.to_string(),
        term_id: snapshot.term.id.clone(),
    };
    if snapshot.student(student_id).is_none() {
        return Err(not_found());
    }
    compile_term(snapshot)?
        .students
        .into_iter()
        .find(|r| r.summary.student_id == student_id)
        .ok_or_else(not_found)
}
