use crate::engine::scheme;
use crate::engine::{GradeSetting, PromotionCriteria};
use crate::ipc::helpers::{db_conn, parse_param, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;
use tracing::warn;

const GRADE_SETTINGS_MAX_ROWS: usize = 100;

fn handle_scheme_get(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let settings = store::load_grading_scheme(conn)?;
    let audit = scheme::audit(&settings);
    Ok(json!({
        "settings": settings,
        "audit": audit,
        "warnings": audit.notices(),
    }))
}

/// Replaces the whole scheme. Problems are returned as warnings; with
/// `strict: true`, malformed or overlapping rows refuse the save instead.
fn handle_scheme_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let settings: Vec<GradeSetting> = parse_param(&req.params, "settings")?;
    let strict = req
        .params
        .get("strict")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if settings.len() > GRADE_SETTINGS_MAX_ROWS {
        return Err(HandlerErr::bad_params(format!(
            "settings exceeds the limit of {} rows",
            GRADE_SETTINGS_MAX_ROWS
        )));
    }
    for (i, s) in settings.iter().enumerate() {
        if s.grade.trim().is_empty() {
            return Err(HandlerErr::bad_params("grade must not be blank")
                .with_details(json!({ "index": i })));
        }
    }

    let audit = scheme::audit(&settings);
    if strict && (!audit.malformed.is_empty() || !audit.overlaps.is_empty()) {
        return Err(HandlerErr::new("scheme_rejected", "grading scheme has malformed or overlapping ranges")
            .with_details(json!({ "audit": audit })));
    }
    if !audit.is_clean() {
        warn!(
            malformed = audit.malformed.len(),
            overlaps = audit.overlaps.len(),
            gaps = audit.gaps.len(),
            "saving grading scheme with problems"
        );
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM grade_settings", [])?;
    for (position, s) in settings.iter().enumerate() {
        tx.execute(
            "INSERT INTO grade_settings(position, grade, range_text, remarks) VALUES(?, ?, ?, ?)",
            (position as i64, s.grade.trim(), s.range.trim(), s.remarks.trim()),
        )?;
    }
    tx.commit()?;

    Ok(json!({
        "saved": settings.len(),
        "audit": audit,
        "warnings": audit.notices(),
    }))
}

fn validate_criteria(c: &PromotionCriteria) -> Result<(), HandlerErr> {
    let percents = [
        ("minAverage", c.min_average),
        ("minAttendancePercent", c.min_attendance_percent),
        ("failThreshold", c.fail_threshold),
    ];
    for (field, value) in percents {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(HandlerErr::bad_params(format!("{} must be between 0 and 100", field))
                .with_details(json!({ "field": field, "value": value })));
        }
    }
    Ok(())
}

fn handle_criteria_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let year = required_str(&req.params, "academicYear")?;
    let criteria = store::load_criteria(conn, &year)?;
    Ok(json!({ "academicYear": year, "criteria": criteria }))
}

fn handle_criteria_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let year = required_str(&req.params, "academicYear")?;
    let criteria: PromotionCriteria = parse_param(&req.params, "criteria")?;
    validate_criteria(&criteria)?;
    conn.execute(
        "INSERT INTO promotion_criteria(
            academic_year, min_average, max_failed_subjects, min_attendance_percent, fail_threshold
         ) VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(academic_year) DO UPDATE SET
           min_average = excluded.min_average,
           max_failed_subjects = excluded.max_failed_subjects,
           min_attendance_percent = excluded.min_attendance_percent,
           fail_threshold = excluded.fail_threshold",
        (
            &year,
            criteria.min_average,
            criteria.max_failed_subjects as i64,
            criteria.min_attendance_percent,
            criteria.fail_threshold,
        ),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "academicYear": year, "criteria": criteria }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "gradingScheme.get" => handle_scheme_get(state, req),
        "gradingScheme.set" => handle_scheme_set(state, req),
        "promotionCriteria.get" => handle_criteria_get(state, req),
        "promotionCriteria.set" => handle_criteria_set(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
