use crate::ipc::helpers::{
    db_conn, now_rfc3339, optional_str, parse_param, required_str, respond, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

const SCORES_UPSERT_MAX_ROWS: usize = 5000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoreInput {
    id: Option<String>,
    student_id: String,
    subject_id: String,
    /// Defaults to the student's current class.
    class_id: Option<String>,
    term_id: String,
    assignment_type_id: String,
    score: f64,
    max_score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttendanceInput {
    student_id: String,
    percent: f64,
}

fn student_class(conn: &Connection, student_id: &str) -> Result<Option<String>, HandlerErr> {
    Ok(conn
        .query_row(
            "SELECT class_id FROM students WHERE id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()?)
}

fn require_term(conn: &Connection, term_id: &str) -> Result<(), HandlerErr> {
    if store::load_term(conn, term_id)?.is_none() {
        return Err(HandlerErr::new("not_found", "term not found")
            .with_details(json!({ "termId": term_id })));
    }
    Ok(())
}

/// Score-entry validation. Scores above their max are accepted and flagged
/// later by aggregation; only values that cannot be stored are refused.
fn validate_score(row: &ScoreInput, index: usize) -> Result<(), HandlerErr> {
    if !row.score.is_finite() || !row.max_score.is_finite() {
        return Err(HandlerErr::bad_params("score and maxScore must be finite numbers")
            .with_details(json!({ "index": index })));
    }
    if row.score < 0.0 {
        return Err(HandlerErr::bad_params("negative marks are not allowed")
            .with_details(json!({ "index": index, "score": row.score })));
    }
    if row.assignment_type_id.trim().is_empty() {
        return Err(HandlerErr::bad_params("assignmentTypeId must not be blank")
            .with_details(json!({ "index": index })));
    }
    Ok(())
}

fn handle_scores_upsert(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let rows: Vec<ScoreInput> = parse_param(&req.params, "scores")?;
    if rows.is_empty() {
        return Err(HandlerErr::bad_params("scores must not be empty"));
    }
    if rows.len() > SCORES_UPSERT_MAX_ROWS {
        return Err(HandlerErr::bad_params(format!(
            "scores exceeds the limit of {} rows",
            SCORES_UPSERT_MAX_ROWS
        ))
        .with_details(json!({ "count": rows.len() })));
    }

    let tx = conn.unchecked_transaction()?;
    let now = now_rfc3339();
    let mut ids = Vec::with_capacity(rows.len());
    for (i, row) in rows.into_iter().enumerate() {
        validate_score(&row, i)?;
        let Some(current_class) = student_class(&tx, &row.student_id)? else {
            return Err(HandlerErr::new("not_found", "student not found")
                .with_details(json!({ "index": i, "studentId": row.student_id })));
        };
        require_term(&tx, &row.term_id)?;
        let class_id = row.class_id.clone().unwrap_or(current_class);
        let id = row
            .id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        tx.execute(
            "INSERT INTO assignment_scores(
                id, student_id, subject_id, class_id, term_id, assignment_type_id,
                score, max_score, updated_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               student_id = excluded.student_id,
               subject_id = excluded.subject_id,
               class_id = excluded.class_id,
               term_id = excluded.term_id,
               assignment_type_id = excluded.assignment_type_id,
               score = excluded.score,
               max_score = excluded.max_score,
               updated_at = excluded.updated_at",
            (
                &id,
                &row.student_id,
                &row.subject_id,
                &class_id,
                &row.term_id,
                row.assignment_type_id.trim(),
                row.score,
                row.max_score,
                &now,
            ),
        )
        .map_err(|e| {
            HandlerErr::new("db_update_failed", e.to_string())
                .with_details(json!({ "index": i }))
        })?;
        ids.push(id);
    }
    tx.commit()?;
    Ok(json!({ "upserted": ids.len(), "ids": ids }))
}

fn handle_scores_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let term_id = required_str(&req.params, "termId")?;
    let student_id = optional_str(&req.params, "studentId")?;
    let subject_id = optional_str(&req.params, "subjectId")?;

    let scores: Vec<_> = store::load_term_scores(conn, &term_id)?
        .into_iter()
        .filter(|s| student_id.as_deref().map(|v| s.student_id == v).unwrap_or(true))
        .filter(|s| subject_id.as_deref().map(|v| s.subject_id == v).unwrap_or(true))
        .collect();
    Ok(json!({ "scores": scores }))
}

fn handle_scores_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let ids: Vec<String> = parse_param(&req.params, "ids")?;
    if ids.is_empty() {
        return Ok(json!({ "deleted": 0 }));
    }
    let placeholders = std::iter::repeat("?")
        .take(ids.len())
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!("DELETE FROM assignment_scores WHERE id IN ({})", placeholders);
    let bind: Vec<Value> = ids.into_iter().map(Value::Text).collect();
    let deleted = conn
        .execute(&sql, params_from_iter(bind))
        .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
    Ok(json!({ "deleted": deleted }))
}

fn handle_attendance_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let term_id = required_str(&req.params, "termId")?;
    let entries: Vec<AttendanceInput> = parse_param(&req.params, "entries")?;
    require_term(conn, &term_id)?;

    let tx = conn.unchecked_transaction()?;
    for (i, e) in entries.iter().enumerate() {
        if !e.percent.is_finite() || !(0.0..=100.0).contains(&e.percent) {
            return Err(HandlerErr::bad_params("percent must be between 0 and 100")
                .with_details(json!({ "index": i, "percent": e.percent })));
        }
        if student_class(&tx, &e.student_id)?.is_none() {
            return Err(HandlerErr::new("not_found", "student not found")
                .with_details(json!({ "index": i, "studentId": e.student_id })));
        }
        tx.execute(
            "INSERT INTO attendance(student_id, term_id, percent) VALUES(?, ?, ?)
             ON CONFLICT(student_id, term_id) DO UPDATE SET percent = excluded.percent",
            (&e.student_id, &term_id, e.percent),
        )?;
    }
    tx.commit()?;
    Ok(json!({ "updated": entries.len() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "scores.upsert" => handle_scores_upsert(state, req),
        "scores.list" => handle_scores_list(state, req),
        "scores.delete" => handle_scores_delete(state, req),
        "attendance.set" => handle_attendance_set(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
