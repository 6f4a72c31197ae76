use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;
use tracing::debug;

use crate::config;
use crate::engine::{
    AssignmentScore, ClassInfo, EngineError, GradeSetting, PromotionCriteria, Student, Subject,
    Term, TermSnapshot,
};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("database query failed: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("engine settings could not be read: {0}")]
    Settings(String),
}

impl LoadError {
    pub fn code(&self) -> &'static str {
        match self {
            LoadError::Engine(e) => e.code(),
            LoadError::Db(_) => "db_query_failed",
            LoadError::Settings(_) => "settings_invalid",
        }
    }
}

pub fn load_grading_scheme(conn: &Connection) -> rusqlite::Result<Vec<GradeSetting>> {
    let mut stmt =
        conn.prepare("SELECT grade, range_text, remarks FROM grade_settings ORDER BY position")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(GradeSetting {
                grade: r.get(0)?,
                range: r.get(1)?,
                remarks: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn load_criteria(
    conn: &Connection,
    academic_year: &str,
) -> rusqlite::Result<Option<PromotionCriteria>> {
    conn.query_row(
        "SELECT min_average, max_failed_subjects, min_attendance_percent, fail_threshold
         FROM promotion_criteria
         WHERE academic_year = ?",
        [academic_year],
        |r| {
            Ok(PromotionCriteria {
                min_average: r.get(0)?,
                max_failed_subjects: r.get::<_, i64>(1)?.max(0) as u32,
                min_attendance_percent: r.get(2)?,
                fail_threshold: r.get(3)?,
            })
        },
    )
    .optional()
}

pub fn load_term(conn: &Connection, term_id: &str) -> rusqlite::Result<Option<Term>> {
    conn.query_row(
        "SELECT id, name, academic_year, sort_order FROM terms WHERE id = ?",
        [term_id],
        |r| {
            Ok(Term {
                id: r.get(0)?,
                name: r.get(1)?,
                academic_year: r.get(2)?,
                sort_order: r.get(3)?,
            })
        },
    )
    .optional()
}

pub fn load_classes(conn: &Connection) -> rusqlite::Result<Vec<ClassInfo>> {
    let mut stmt = conn.prepare("SELECT id, name, is_terminal FROM classes ORDER BY sort_order, id")?;
    let mut classes = stmt
        .query_map([], |r| {
            Ok(ClassInfo {
                id: r.get(0)?,
                name: r.get(1)?,
                is_terminal: r.get::<_, i64>(2)? != 0,
                subject_ids: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut subj_stmt = conn.prepare(
        "SELECT subject_id FROM class_subjects WHERE class_id = ? ORDER BY sort_order, subject_id",
    )?;
    for class in &mut classes {
        class.subject_ids = subj_stmt
            .query_map([&class.id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
    }
    Ok(classes)
}

pub fn load_subjects(conn: &Connection) -> rusqlite::Result<Vec<Subject>> {
    let mut stmt = conn.prepare("SELECT id, name FROM subjects ORDER BY sort_order, id")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Subject {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Active students, ordered by enrollment order.
pub fn load_students(conn: &Connection) -> rusqlite::Result<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT id, class_id, last_name, first_name, enrollment_order
         FROM students
         WHERE active = 1
         ORDER BY enrollment_order, id",
    )?;
    let rows = stmt
        .query_map([], |r| {
            let last: String = r.get(2)?;
            let first: String = r.get(3)?;
            Ok(Student {
                id: r.get(0)?,
                class_id: r.get(1)?,
                display_name: format!("{}, {}", last, first),
                enrollment_order: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn load_term_scores(conn: &Connection, term_id: &str) -> rusqlite::Result<Vec<AssignmentScore>> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, subject_id, class_id, term_id, assignment_type_id, score, max_score
         FROM assignment_scores
         WHERE term_id = ?
         ORDER BY student_id, subject_id, assignment_type_id, id",
    )?;
    let rows = stmt
        .query_map([term_id], |r| {
            Ok(AssignmentScore {
                id: Some(r.get(0)?),
                student_id: r.get(1)?,
                subject_id: r.get(2)?,
                class_id: r.get(3)?,
                term_id: r.get(4)?,
                assignment_type_id: r.get(5)?,
                score: r.get(6)?,
                max_score: r.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn load_attendance(conn: &Connection, term_id: &str) -> rusqlite::Result<BTreeMap<String, f64>> {
    let mut stmt = conn.prepare("SELECT student_id, percent FROM attendance WHERE term_id = ?")?;
    let rows = stmt
        .query_map([term_id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?)))?
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(rows)
}

/// Reads every input of a term computation inside one read transaction so
/// the engine sees a single consistent state.
pub fn load_term_snapshot(conn: &Connection, term_id: &str) -> Result<TermSnapshot, LoadError> {
    let tx = conn.unchecked_transaction()?;

    let term = load_term(&tx, term_id)?
        .ok_or_else(|| EngineError::TermNotFound(term_id.to_string()))?;
    let criteria = load_criteria(&tx, &term.academic_year)?;
    let settings =
        config::engine_settings(&tx).map_err(|e| LoadError::Settings(e.to_string()))?;

    let snapshot = TermSnapshot {
        classes: load_classes(&tx)?,
        subjects: load_subjects(&tx)?,
        students: load_students(&tx)?,
        scores: load_term_scores(&tx, term_id)?,
        grading_scheme: load_grading_scheme(&tx)?,
        attendance: load_attendance(&tx, term_id)?,
        criteria,
        settings,
        term,
    };
    tx.commit()?;

    debug!(
        term_id,
        students = snapshot.students.len(),
        scores = snapshot.scores.len(),
        "loaded term snapshot"
    );
    Ok(snapshot)
}
