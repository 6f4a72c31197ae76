use crate::engine::report::{compile_class, compile_student, compile_term};
use crate::export;
use crate::ipc::helpers::{db_conn, optional_str, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn handle_compile(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let term_id = required_str(&req.params, "termId")?;
    let student_id = required_str(&req.params, "studentId")?;
    let snapshot = store::load_term_snapshot(conn, &term_id)?;
    let report = compile_student(&snapshot, &student_id)?;
    serde_json::to_value(report)
        .map_err(|e| HandlerErr::new("report_failed", e.to_string()))
}

fn handle_compile_class(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let term_id = required_str(&req.params, "termId")?;
    let class_id = required_str(&req.params, "classId")?;
    let snapshot = store::load_term_snapshot(conn, &term_id)?;
    let report = compile_class(&snapshot, &class_id)?;
    serde_json::to_value(report)
        .map_err(|e| HandlerErr::new("report_failed", e.to_string()))
}

fn handle_export_bundle(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let term_id = required_str(&req.params, "termId")?;
    let class_id = optional_str(&req.params, "classId")?;
    let out_path = PathBuf::from(required_str(&req.params, "outPath")?);

    let snapshot = store::load_term_snapshot(conn, &term_id)?;
    let report = match class_id.as_deref() {
        Some(cid) => compile_class(&snapshot, cid)?,
        None => compile_term(&snapshot)?,
    };
    let summary = export::export_report_bundle(&report, class_id.as_deref(), &out_path)
        .map_err(|e| {
            HandlerErr::new("io_failed", format!("{:#}", e))
                .with_details(json!({ "outPath": out_path.to_string_lossy() }))
        })?;
    info!(
        term_id = %term_id,
        students = report.students.len(),
        path = %out_path.to_string_lossy(),
        "exported report bundle"
    );
    Ok(json!({
        "ok": true,
        "path": out_path.to_string_lossy(),
        "students": report.students.len(),
        "bundleFormat": summary.bundle_format,
        "entryCount": summary.entry_count,
        "snapshotHash": summary.snapshot_hash,
    }))
}

fn handle_verify_bundle(
    _state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let in_path = PathBuf::from(required_str(&req.params, "path")?);
    let summary = export::verify_report_bundle(&in_path).map_err(|e| {
        HandlerErr::new("bundle_invalid", format!("{:#}", e))
            .with_details(json!({ "path": in_path.to_string_lossy() }))
    })?;
    Ok(json!({
        "ok": true,
        "bundleFormat": summary.bundle_format,
        "entryCount": summary.entry_count,
        "snapshotHash": summary.snapshot_hash,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "reports.compile" => handle_compile(state, req),
        "reports.compileClass" => handle_compile_class(state, req),
        "reports.exportBundle" => handle_export_bundle(state, req),
        "reports.verifyBundle" => handle_verify_bundle(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
