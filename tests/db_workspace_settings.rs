#[path = "../src/db.rs"]
mod db;

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

#[test]
fn settings_round_trip_through_json() {
    let workspace = temp_dir("progressiond-settings");
    let conn = db::open_db(&workspace).expect("open_db");
    assert!(db::settings_get_json(&conn, "setup.engine")
        .expect("get")
        .is_none());
    let value = serde_json::json!({ "sentinelGrade": "--" });
    db::settings_set_json(&conn, "setup.engine", &value).expect("set");
    assert_eq!(
        db::settings_get_json(&conn, "setup.engine").expect("get"),
        Some(value)
    );
    let _ = std::fs::remove_dir_all(workspace);
}
