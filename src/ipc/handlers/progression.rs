use crate::engine::ranking::RankScope;
use crate::engine::report::{compile_student, rank_term, summarize_term};
use crate::engine::scheme;
use crate::engine::{GradeSetting, StudentTermSummary};
use crate::ipc::helpers::{db_conn, optional_str, parse_param, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;

fn handle_grading_resolve(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(percentage) = req.params.get("percentage").and_then(|v| v.as_f64()) else {
        return Err(HandlerErr::bad_params("percentage must be a number"));
    };
    // An inline scheme lets the editor preview rows before saving them.
    let settings: Vec<GradeSetting> = if req.params.get("settings").is_some() {
        parse_param(&req.params, "settings")?
    } else {
        store::load_grading_scheme(db_conn(state)?)?
    };
    let sentinel = match state.db.as_ref() {
        Some(conn) => crate::config::engine_settings(conn)
            .map(|s| s.sentinel_grade)
            .unwrap_or_else(|_| "N/A".to_string()),
        None => "N/A".to_string(),
    };

    let resolution = scheme::resolve(percentage, &settings);
    let found = resolution.grade.is_some();
    Ok(json!({
        "found": found,
        "grade": resolution.grade.as_ref().map(|g| g.grade.clone()).unwrap_or(sentinel),
        "remark": resolution.grade.as_ref().map(|g| g.remark.clone()).unwrap_or_default(),
        "match": resolution.grade,
        "warnings": resolution.warnings,
    }))
}

fn handle_subject_aggregates(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let term_id = required_str(&req.params, "termId")?;
    let student_id = optional_str(&req.params, "studentId")?;
    let class_id = optional_str(&req.params, "classId")?;

    let snapshot = store::load_term_snapshot(conn, &term_id)?;
    if let Some(sid) = student_id.as_deref() {
        if snapshot.student(sid).is_none() {
            return Err(crate::engine::EngineError::StudentNotFound {
                student_id: sid.to_string(),
                term_id,
            }
            .into());
        }
    }
    let out = summarize_term(&snapshot)?;
    let aggregates: Vec<_> = out
        .summaries
        .into_iter()
        .filter(|s| student_id.as_deref().map(|v| s.student_id == v).unwrap_or(true))
        .filter(|s| class_id.as_deref().map(|v| s.class_id == v).unwrap_or(true))
        .flat_map(|s| s.subject_aggregates)
        .collect();
    Ok(json!({
        "termId": term_id,
        "aggregates": aggregates,
        "warnings": out.warnings,
    }))
}

fn rank_for(s: &StudentTermSummary, scope: RankScope) -> Option<u32> {
    match scope {
        RankScope::Class => s.class_rank,
        RankScope::School => s.school_rank,
    }
}

fn handle_rank(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let term_id = required_str(&req.params, "termId")?;
    let scope_raw = required_str(&req.params, "scope")?;
    let Some(scope) = RankScope::parse(&scope_raw) else {
        return Err(HandlerErr::bad_params("scope must be one of: class, school")
            .with_details(json!({ "scope": scope_raw })));
    };
    let class_id = optional_str(&req.params, "classId")?;

    let snapshot = store::load_term_snapshot(conn, &term_id)?;
    if let Some(cid) = class_id.as_deref() {
        if !snapshot.students.iter().any(|s| s.class_id == cid) {
            return Err(crate::engine::EngineError::ClassNotFound {
                class_id: cid.to_string(),
                term_id,
            }
            .into());
        }
    }
    let ranked = rank_term(&snapshot)?;

    let mut rows: Vec<&StudentTermSummary> = ranked
        .summaries
        .iter()
        .filter(|s| class_id.as_deref().map(|v| s.class_id == v).unwrap_or(true))
        .collect();
    rows.sort_by(|a, b| {
        let ra = rank_for(a, scope).unwrap_or(u32::MAX);
        let rb = rank_for(b, scope).unwrap_or(u32::MAX);
        ra.cmp(&rb)
            .then_with(|| a.class_id.cmp(&b.class_id))
            .then_with(|| a.enrollment_order.cmp(&b.enrollment_order))
    });

    let standings: Vec<serde_json::Value> = rows
        .iter()
        .map(|s| {
            json!({
                "studentId": s.student_id,
                "classId": s.class_id,
                "displayName": snapshot.student(&s.student_id).map(|st| st.display_name.clone()),
                "rank": rank_for(s, scope),
                "overallAverage": s.overall_average,
                "overallTotal": s.overall_total,
                "failedSubjectCount": s.failed_subject_count,
                "recordedSubjectCount": s.recorded_subject_count,
            })
        })
        .collect();
    let excluded: Vec<&str> = rows
        .iter()
        .filter(|s| rank_for(s, scope).is_none())
        .map(|s| s.student_id.as_str())
        .collect();

    Ok(json!({
        "termId": term_id,
        "scope": scope,
        "standings": standings,
        "excluded": excluded,
        "warnings": ranked.warnings,
    }))
}

fn handle_evaluate(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let term_id = required_str(&req.params, "termId")?;
    let student_id = required_str(&req.params, "studentId")?;
    let snapshot = store::load_term_snapshot(conn, &term_id)?;
    let report = compile_student(&snapshot, &student_id)?;
    Ok(json!({
        "termId": term_id,
        "decision": report.decision,
        "overallAverage": report.summary.overall_average,
        "failedSubjectCount": report.summary.failed_subject_count,
        "attendancePercent": report.attendance_percent,
        "isTerminalClass": report.is_terminal_class,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grading.resolve" => handle_grading_resolve(state, req),
        "progression.subjectAggregates" => handle_subject_aggregates(state, req),
        "progression.rank" => handle_rank(state, req),
        "progression.evaluate" => handle_evaluate(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
