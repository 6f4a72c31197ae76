use crate::config;
use crate::db;
use crate::ipc::helpers::{db_conn, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_setup_get(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let engine = config::load_engine_section(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    Ok(json!({ "engine": engine }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let section = required_str(&req.params, "section")?;
    if section != "engine" {
        return Err(HandlerErr::bad_params("unknown section")
            .with_details(json!({ "section": section })));
    }
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };

    let mut current = config::load_engine_section(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    config::merge_engine_patch(&mut current, patch).map_err(HandlerErr::bad_params)?;
    db::settings_set_json(conn, config::ENGINE_SECTION_KEY, &current)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "engine": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "setup.get" => handle_setup_get(state, req),
        "setup.update" => handle_setup_update(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
