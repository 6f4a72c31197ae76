use serde::{Deserialize, Serialize};

/// One row of the grading scheme as configured; row order is significant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSetting {
    pub grade: String,
    pub range: String,
    #[serde(default)]
    pub remarks: String,
}

impl GradeSetting {
    pub fn new(grade: &str, range: &str, remarks: &str) -> Self {
        Self {
            grade: grade.to_string(),
            range: range.to_string(),
            remarks: remarks.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentScore {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub student_id: String,
    pub subject_id: String,
    pub class_id: String,
    pub term_id: String,
    pub assignment_type_id: String,
    pub score: f64,
    pub max_score: f64,
}

/// A non-fatal problem attached to a result instead of aborting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Notice {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateStatus {
    Scored,
    NoScoresRecorded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditFlag {
    ScoreExceedsMax,
    InvalidMaxScore,
    MismatchedRow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAggregate {
    pub student_id: String,
    pub subject_id: String,
    pub term_id: String,
    pub status: AggregateStatus,
    /// None when no usable scores were recorded.
    pub percentage: Option<f64>,
    pub grade: String,
    pub remark: String,
    pub failed: bool,
    pub counted_entries: usize,
    pub excluded_entries: usize,
    pub audit_flags: Vec<AuditFlag>,
    pub warnings: Vec<Notice>,
}

impl SubjectAggregate {
    pub fn is_recorded(&self) -> bool {
        self.status == AggregateStatus::Scored
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentTermSummary {
    pub student_id: String,
    pub class_id: String,
    pub term_id: String,
    pub enrollment_order: i64,
    pub subject_aggregates: Vec<SubjectAggregate>,
    pub recorded_subject_count: usize,
    pub overall_average: Option<f64>,
    pub overall_total: f64,
    pub class_rank: Option<u32>,
    pub school_rank: Option<u32>,
    pub failed_subject_count: usize,
}

impl StudentTermSummary {
    pub fn has_recorded_subjects(&self) -> bool {
        self.recorded_subject_count > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionCriteria {
    pub min_average: f64,
    pub max_failed_subjects: u32,
    pub min_attendance_percent: f64,
    pub fail_threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Promote,
    Retain,
    Graduate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionDecision {
    pub student_id: String,
    pub class_id: String,
    pub decision: Decision,
    pub reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Notice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    pub id: String,
    pub name: String,
    pub academic_year: String,
    #[serde(default)]
    pub sort_order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_terminal: bool,
    /// Subjects every student of the class is expected to be graded in.
    #[serde(default)]
    pub subject_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub class_id: String,
    pub display_name: String,
    pub enrollment_order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    pub sentinel_grade: String,
    pub no_scores_label: String,
    /// Look grades up by the whole-number percentage when every scheme bound
    /// is a whole number.
    pub whole_number_grade_basis: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sentinel_grade: "N/A".to_string(),
            no_scores_label: "No Scores Recorded".to_string(),
            whole_number_grade_basis: true,
        }
    }
}

/// Half-up rounding to one decimal: `floor(10x + 0.5) / 10`.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}
