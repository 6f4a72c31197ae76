use crate::ipc::helpers::{db_conn, now_rfc3339, parse_param, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store;
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

const ROSTER_UPSERT_MAX_ROWS: usize = 2000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TermInput {
    id: Option<String>,
    name: String,
    academic_year: String,
    #[serde(default)]
    sort_order: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassInput {
    id: Option<String>,
    name: String,
    #[serde(default)]
    is_terminal: bool,
    #[serde(default)]
    sort_order: i64,
    /// Replaces the class's subject list when present.
    subject_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubjectInput {
    id: Option<String>,
    name: String,
    #[serde(default)]
    sort_order: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentInput {
    id: Option<String>,
    class_id: String,
    last_name: String,
    first_name: String,
    enrollment_order: Option<i64>,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

fn check_batch_len(len: usize, what: &str) -> Result<(), HandlerErr> {
    if len == 0 {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", what)));
    }
    if len > ROSTER_UPSERT_MAX_ROWS {
        return Err(HandlerErr::bad_params(format!(
            "{} exceeds the limit of {} rows",
            what, ROSTER_UPSERT_MAX_ROWS
        ))
        .with_details(json!({ "count": len })));
    }
    Ok(())
}

fn non_blank(value: &str, field: &str, index: usize) -> Result<String, HandlerErr> {
    let t = value.trim();
    if t.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be blank", field))
            .with_details(json!({ "index": index })));
    }
    Ok(t.to_string())
}

/// Ids end up in export entry names such as `students/<id>.json`.
fn new_or_given_id(id: Option<String>, index: usize) -> Result<String, HandlerErr> {
    let Some(id) = id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) else {
        return Ok(Uuid::new_v4().to_string());
    };
    if id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(HandlerErr::bad_params("id must not contain '/', '\\' or '..'")
            .with_details(json!({ "index": index, "id": id })));
    }
    Ok(id)
}

fn exists(conn: &Connection, table: &str, id: &str) -> Result<bool, HandlerErr> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    Ok(conn
        .query_row(&sql, [id], |r| r.get::<_, i64>(0))
        .optional()?
        .is_some())
}

fn handle_terms_upsert(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let terms: Vec<TermInput> = parse_param(&req.params, "terms")?;
    check_batch_len(terms.len(), "terms")?;

    let tx = conn.unchecked_transaction()?;
    let mut ids = Vec::with_capacity(terms.len());
    for (i, t) in terms.into_iter().enumerate() {
        let name = non_blank(&t.name, "name", i)?;
        let year = non_blank(&t.academic_year, "academicYear", i)?;
        let id = new_or_given_id(t.id, i)?;
        tx.execute(
            "INSERT INTO terms(id, name, academic_year, sort_order) VALUES(?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               academic_year = excluded.academic_year,
               sort_order = excluded.sort_order",
            (&id, &name, &year, t.sort_order),
        )?;
        ids.push(id);
    }
    tx.commit()?;
    Ok(json!({ "ids": ids }))
}

fn handle_subjects_upsert(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let subjects: Vec<SubjectInput> = parse_param(&req.params, "subjects")?;
    check_batch_len(subjects.len(), "subjects")?;

    let tx = conn.unchecked_transaction()?;
    let mut ids = Vec::with_capacity(subjects.len());
    for (i, s) in subjects.into_iter().enumerate() {
        let name = non_blank(&s.name, "name", i)?;
        let id = new_or_given_id(s.id, i)?;
        tx.execute(
            "INSERT INTO subjects(id, name, sort_order) VALUES(?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, sort_order = excluded.sort_order",
            (&id, &name, s.sort_order),
        )?;
        ids.push(id);
    }
    tx.commit()?;
    Ok(json!({ "ids": ids }))
}

fn handle_classes_upsert(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let classes: Vec<ClassInput> = parse_param(&req.params, "classes")?;
    check_batch_len(classes.len(), "classes")?;

    let tx = conn.unchecked_transaction()?;
    let mut ids = Vec::with_capacity(classes.len());
    for (i, c) in classes.into_iter().enumerate() {
        let name = non_blank(&c.name, "name", i)?;
        let id = new_or_given_id(c.id, i)?;
        tx.execute(
            "INSERT INTO classes(id, name, is_terminal, sort_order) VALUES(?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               is_terminal = excluded.is_terminal,
               sort_order = excluded.sort_order",
            (&id, &name, c.is_terminal as i64, c.sort_order),
        )?;

        if let Some(subject_ids) = c.subject_ids {
            for subject_id in &subject_ids {
                if !exists(&tx, "subjects", subject_id)? {
                    return Err(HandlerErr::new("not_found", "subject not found")
                        .with_details(json!({ "index": i, "subjectId": subject_id })));
                }
            }
            tx.execute("DELETE FROM class_subjects WHERE class_id = ?", [&id])?;
            for (pos, subject_id) in subject_ids.iter().enumerate() {
                tx.execute(
                    "INSERT OR IGNORE INTO class_subjects(class_id, subject_id, sort_order)
                     VALUES(?, ?, ?)",
                    (&id, subject_id, pos as i64),
                )?;
            }
        }
        ids.push(id);
    }
    tx.commit()?;
    Ok(json!({ "ids": ids }))
}

fn handle_students_upsert(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let students: Vec<StudentInput> = parse_param(&req.params, "students")?;
    check_batch_len(students.len(), "students")?;

    let tx = conn.unchecked_transaction()?;
    let mut next_order: i64 = tx.query_row(
        "SELECT COALESCE(MAX(enrollment_order) + 1, 0) FROM students",
        [],
        |r| r.get(0),
    )?;
    let now = now_rfc3339();
    let mut ids = Vec::with_capacity(students.len());
    for (i, s) in students.into_iter().enumerate() {
        let last = non_blank(&s.last_name, "lastName", i)?;
        let first = non_blank(&s.first_name, "firstName", i)?;
        if !exists(&tx, "classes", &s.class_id)? {
            return Err(HandlerErr::new("not_found", "class not found")
                .with_details(json!({ "index": i, "classId": s.class_id })));
        }
        let id = new_or_given_id(s.id, i)?;
        let existing_order: Option<i64> = tx
            .query_row(
                "SELECT enrollment_order FROM students WHERE id = ?",
                [&id],
                |r| r.get(0),
            )
            .optional()?;
        // Admission order is kept on update unless explicitly changed.
        let order = match (s.enrollment_order, existing_order) {
            (Some(o), _) => o,
            (None, Some(o)) => o,
            (None, None) => {
                let o = next_order;
                next_order += 1;
                o
            }
        };
        tx.execute(
            "INSERT INTO students(id, class_id, last_name, first_name, enrollment_order, active, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               class_id = excluded.class_id,
               last_name = excluded.last_name,
               first_name = excluded.first_name,
               enrollment_order = excluded.enrollment_order,
               active = excluded.active,
               updated_at = excluded.updated_at",
            (&id, &s.class_id, &last, &first, order, s.active as i64, &now),
        )?;
        ids.push(id);
    }
    tx.commit()?;
    Ok(json!({ "ids": ids }))
}

fn handle_roster_get(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let mut term_stmt =
        conn.prepare("SELECT id, name, academic_year, sort_order FROM terms ORDER BY sort_order, id")?;
    let terms = term_stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "academicYear": r.get::<_, String>(2)?,
                "sortOrder": r.get::<_, i64>(3)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut student_stmt = conn.prepare(
        "SELECT id, class_id, last_name, first_name, enrollment_order, active
         FROM students
         ORDER BY enrollment_order, id",
    )?;
    let students = student_stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "classId": r.get::<_, String>(1)?,
                "lastName": r.get::<_, String>(2)?,
                "firstName": r.get::<_, String>(3)?,
                "enrollmentOrder": r.get::<_, i64>(4)?,
                "active": r.get::<_, i64>(5)? != 0,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(json!({
        "terms": terms,
        "classes": store::load_classes(conn)?,
        "subjects": store::load_subjects(conn)?,
        "students": students,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "terms.upsert" => handle_terms_upsert(state, req),
        "subjects.upsert" => handle_subjects_upsert(state, req),
        "classes.upsert" => handle_classes_upsert(state, req),
        "students.upsert" => handle_students_upsert(state, req),
        "roster.get" => handle_roster_get(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
