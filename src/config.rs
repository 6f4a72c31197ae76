use crate::db;
use crate::engine::EngineSettings;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

pub const ENGINE_SECTION_KEY: &str = "setup.engine";

const MAX_LABEL_CHARS: usize = 40;

pub fn default_engine_section() -> Value {
    let d = EngineSettings::default();
    json!({
        "sentinelGrade": d.sentinel_grade,
        "noScoresLabel": d.no_scores_label,
        "wholeNumberGradeBasis": d.whole_number_grade_basis,
    })
}

fn parse_label(v: &Value, key: &str) -> Result<String, String> {
    let Some(s) = v.as_str() else {
        return Err(format!("{} must be a string", key));
    };
    let t = s.trim();
    if t.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    if t.chars().count() > MAX_LABEL_CHARS {
        return Err(format!("{} must be at most {} characters", key, MAX_LABEL_CHARS));
    }
    Ok(t.to_string())
}

pub fn merge_engine_patch(current: &mut Value, patch: &Map<String, Value>) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match k.as_str() {
            "sentinelGrade" | "noScoresLabel" => {
                obj.insert(k.clone(), Value::String(parse_label(v, k)?));
            }
            "wholeNumberGradeBasis" => {
                let Some(b) = v.as_bool() else {
                    return Err(format!("{} must be a boolean", k));
                };
                obj.insert(k.clone(), Value::Bool(b));
            }
            _ => return Err(format!("unknown engine field: {}", k)),
        }
    }
    Ok(())
}

pub fn load_engine_section(conn: &Connection) -> anyhow::Result<Value> {
    let mut current = default_engine_section();
    if let Some(saved) = db::settings_get_json(conn, ENGINE_SECTION_KEY)? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort: a bad historical value must not block computation.
            let _ = merge_engine_patch(&mut current, saved_obj);
        }
    }
    Ok(current)
}

pub fn engine_settings(conn: &Connection) -> anyhow::Result<EngineSettings> {
    let section = load_engine_section(conn)?;
    let defaults = EngineSettings::default();
    Ok(EngineSettings {
        sentinel_grade: section
            .get("sentinelGrade")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or(defaults.sentinel_grade),
        no_scores_label: section
            .get("noScoresLabel")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or(defaults.no_scores_label),
        whole_number_grade_basis: section
            .get("wholeNumberGradeBasis")
            .and_then(|v| v.as_bool())
            .unwrap_or(defaults.whole_number_grade_basis),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_rejects_unknown_and_blank_fields() {
        let mut current = default_engine_section();
        let bad = json!({ "colour": "red" });
        assert!(merge_engine_patch(&mut current, bad.as_object().unwrap()).is_err());
        let blank = json!({ "sentinelGrade": "   " });
        assert!(merge_engine_patch(&mut current, blank.as_object().unwrap()).is_err());
    }

    #[test]
    fn patch_trims_labels() {
        let mut current = default_engine_section();
        let patch = json!({ "sentinelGrade": " -- ", "wholeNumberGradeBasis": false });
        merge_engine_patch(&mut current, patch.as_object().unwrap()).expect("merge");
        assert_eq!(current["sentinelGrade"], "--");
        assert_eq!(current["wholeNumberGradeBasis"], false);
    }
}
