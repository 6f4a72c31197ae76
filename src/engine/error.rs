use thiserror::Error;

/// Structurally invalid requests. Per-student and per-subject data problems
/// never surface here; they are recorded as [`super::model::Notice`]s.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("term not found: {0}")]
    TermNotFound(String),

    #[error("no students to rank for {0}")]
    EmptyRoster(String),

    #[error("student {student_id} is not enrolled in term {term_id}")]
    StudentNotFound { student_id: String, term_id: String },

    #[error("class {class_id} has no students in term {term_id}")]
    ClassNotFound { class_id: String, term_id: String },

    #[error("no promotion criteria configured for academic year {0}")]
    MissingCriteria(String),
}

impl EngineError {
    /// Stable error code used in IPC error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::TermNotFound(_) => "term_not_found",
            EngineError::EmptyRoster(_) => "empty_roster",
            EngineError::StudentNotFound { .. } => "student_not_found",
            EngineError::ClassNotFound { .. } => "class_not_found",
            EngineError::MissingCriteria(_) => "missing_criteria",
        }
    }
}
