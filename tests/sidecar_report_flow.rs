use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_progressiond");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn progressiond");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_default()
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

fn seed_school(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) {
    request_ok(
        stdin,
        reader,
        "seed-terms",
        "terms.upsert",
        json!({ "terms": [{ "id": "t1", "name": "First Term", "academicYear": "2025/2026", "sortOrder": 1 }] }),
    );
    request_ok(
        stdin,
        reader,
        "seed-subjects",
        "subjects.upsert",
        json!({ "subjects": [
            { "id": "math", "name": "Mathematics" },
            { "id": "eng", "name": "English" }
        ] }),
    );
    request_ok(
        stdin,
        reader,
        "seed-classes",
        "classes.upsert",
        json!({ "classes": [
            { "id": "jss1", "name": "JSS 1", "subjectIds": ["math", "eng"] },
            { "id": "ss3", "name": "SS 3", "isTerminal": true, "subjectIds": ["math"] }
        ] }),
    );
    request_ok(
        stdin,
        reader,
        "seed-students",
        "students.upsert",
        json!({ "students": [
            { "id": "s1", "classId": "jss1", "lastName": "Adeyemi", "firstName": "Tolu" },
            { "id": "s2", "classId": "jss1", "lastName": "Bello", "firstName": "Ada" },
            { "id": "s3", "classId": "jss1", "lastName": "Chukwu", "firstName": "Obi" },
            { "id": "s4", "classId": "ss3", "lastName": "Danjuma", "firstName": "Sani" }
        ] }),
    );
    request_ok(
        stdin,
        reader,
        "seed-scheme",
        "gradingScheme.set",
        json!({ "settings": [
            { "grade": "A", "range": "80-100", "remarks": "Excellent" },
            { "grade": "B", "range": "60-79", "remarks": "Good" },
            { "grade": "C", "range": "40-59", "remarks": "Fair" },
            { "grade": "F", "range": "0-39", "remarks": "Fail" }
        ] }),
    );
    let scores = request_ok(
        stdin,
        reader,
        "seed-scores",
        "scores.upsert",
        json!({ "scores": [
            { "studentId": "s1", "subjectId": "math", "termId": "t1", "assignmentTypeId": "ca", "score": 18, "maxScore": 20 },
            { "studentId": "s1", "subjectId": "math", "termId": "t1", "assignmentTypeId": "exam", "score": 63, "maxScore": 80 },
            { "studentId": "s1", "subjectId": "eng", "termId": "t1", "assignmentTypeId": "exam", "score": 69, "maxScore": 100 },
            { "studentId": "s2", "subjectId": "math", "termId": "t1", "assignmentTypeId": "exam", "score": 75, "maxScore": 100 },
            { "studentId": "s2", "subjectId": "eng", "termId": "t1", "assignmentTypeId": "exam", "score": 75, "maxScore": 100 },
            { "studentId": "s3", "subjectId": "math", "termId": "t1", "assignmentTypeId": "exam", "score": 30, "maxScore": 100 },
            { "studentId": "s4", "subjectId": "math", "termId": "t1", "assignmentTypeId": "exam", "score": 66, "maxScore": 100 }
        ] }),
    );
    assert_eq!(scores.get("upserted").and_then(|v| v.as_u64()), Some(7));
    request_ok(
        stdin,
        reader,
        "seed-attendance",
        "attendance.set",
        json!({ "termId": "t1", "entries": [
            { "studentId": "s1", "percent": 96 },
            { "studentId": "s2", "percent": 91 },
            { "studentId": "s3", "percent": 62 },
            { "studentId": "s4", "percent": 99 }
        ] }),
    );
}

fn set_criteria(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) {
    request_ok(
        stdin,
        reader,
        "seed-criteria",
        "promotionCriteria.set",
        json!({
            "academicYear": "2025/2026",
            "criteria": {
                "minAverage": 50,
                "maxFailedSubjects": 1,
                "minAttendancePercent": 75,
                "failThreshold": 40
            }
        }),
    );
}

#[test]
fn compile_report_for_one_student_and_one_class() {
    let workspace = temp_dir("progressiond-report-flow");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_school(&mut stdin, &mut reader);

    // Without criteria the term cannot be evaluated.
    let missing = request(
        &mut stdin,
        &mut reader,
        "2",
        "reports.compile",
        json!({ "termId": "t1", "studentId": "s1" }),
    );
    assert_eq!(missing.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(error_code(&missing), Some("missing_criteria"));

    set_criteria(&mut stdin, &mut reader);

    let s1 = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "reports.compile",
        json!({ "termId": "t1", "studentId": "s1" }),
    );
    assert_eq!(s1.get("displayName").and_then(|v| v.as_str()), Some("Adeyemi, Tolu"));
    assert_eq!(s1.get("overallAverage").and_then(|v| v.as_f64()), Some(75.0));
    assert_eq!(s1.get("classRank").and_then(|v| v.as_u64()), Some(1));
    let math = s1
        .get("subjectAggregates")
        .and_then(|v| v.as_array())
        .and_then(|rows| rows.iter().find(|r| r.get("subjectId") == Some(&json!("math"))))
        .cloned()
        .expect("math aggregate");
    // (18 + 63) / (20 + 80) = 81%
    assert_eq!(math.get("percentage").and_then(|v| v.as_f64()), Some(81.0));
    assert_eq!(math.get("grade").and_then(|v| v.as_str()), Some("A"));
    assert_eq!(
        s1.get("decision")
            .and_then(|d| d.get("decision"))
            .and_then(|v| v.as_str()),
        Some("Promote")
    );

    let again = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "reports.compile",
        json!({ "termId": "t1", "studentId": "s1" }),
    );
    assert_eq!(s1, again);

    let class = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "reports.compileClass",
        json!({ "termId": "t1", "classId": "jss1" }),
    );
    let students = class
        .get("students")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(students.len(), 3);
    let ranks: Vec<Option<u64>> = students
        .iter()
        .map(|s| s.get("classRank").and_then(|v| v.as_u64()))
        .collect();
    assert_eq!(ranks, vec![Some(1), Some(1), Some(3)]);
    let s3 = &students[2];
    let eng = s3
        .get("subjectAggregates")
        .and_then(|v| v.as_array())
        .and_then(|rows| rows.iter().find(|r| r.get("subjectId") == Some(&json!("eng"))))
        .cloned()
        .expect("eng aggregate");
    assert_eq!(eng.get("status").and_then(|v| v.as_str()), Some("no_scores_recorded"));
    assert_eq!(eng.get("remark").and_then(|v| v.as_str()), Some("No Scores Recorded"));
    assert_eq!(
        s3.get("decision")
            .and_then(|d| d.get("decision"))
            .and_then(|v| v.as_str()),
        Some("Retain")
    );

    let ss3 = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "progression.evaluate",
        json!({ "termId": "t1", "studentId": "s4" }),
    );
    assert_eq!(
        ss3.get("decision")
            .and_then(|d| d.get("decision"))
            .and_then(|v| v.as_str()),
        Some("Graduate")
    );

    let unknown = request(
        &mut stdin,
        &mut reader,
        "7",
        "reports.compile",
        json!({ "termId": "t1", "studentId": "ghost" }),
    );
    assert_eq!(error_code(&unknown), Some("student_not_found"));

    let school = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "progression.rank",
        json!({ "termId": "t1", "scope": "school" }),
    );
    let order: Vec<&str> = school
        .get("standings")
        .and_then(|v| v.as_array())
        .map(|rows| {
            rows.iter()
                .filter_map(|r| r.get("studentId").and_then(|v| v.as_str()))
                .collect()
        })
        .unwrap_or_default();
    assert_eq!(order, vec!["s1", "s2", "s4", "s3"]);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn export_bundle_carries_checksummed_report_cards() {
    let workspace = temp_dir("progressiond-export");
    let bundle_path = workspace.join("out").join("t1-reports.zip");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_school(&mut stdin, &mut reader);
    set_criteria(&mut stdin, &mut reader);

    let export = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "reports.exportBundle",
        json!({ "termId": "t1", "outPath": bundle_path.to_string_lossy() }),
    );
    assert_eq!(
        export.get("bundleFormat").and_then(|v| v.as_str()),
        Some("progression-reports-v1")
    );
    assert_eq!(export.get("students").and_then(|v| v.as_u64()), Some(4));
    // manifest + term.json + four report cards
    assert_eq!(export.get("entryCount").and_then(|v| v.as_u64()), Some(6));

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest_text = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest_text)
        .expect("read manifest");
    let manifest: serde_json::Value = serde_json::from_str(&manifest_text).expect("manifest json");
    let entries = manifest
        .get("entries")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("entries");
    assert_eq!(entries.len(), 5);
    for entry in &entries {
        let path = entry.get("path").and_then(|v| v.as_str()).expect("path");
        let mut bytes = Vec::new();
        archive
            .by_name(path)
            .expect("listed entry present")
            .read_to_end(&mut bytes)
            .expect("read entry");
        let digest: String = Sha256::digest(&bytes)
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        assert_eq!(entry.get("sha256").and_then(|v| v.as_str()), Some(digest.as_str()));
    }
    let mut card = String::new();
    archive
        .by_name("students/s4.json")
        .expect("s4 card")
        .read_to_string(&mut card)
        .expect("read card");
    assert!(card.contains("Graduate"));

    let verified = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "reports.verifyBundle",
        json!({ "path": bundle_path.to_string_lossy() }),
    );
    assert_eq!(verified.get("entryCount").and_then(|v| v.as_u64()), Some(6));
    assert_eq!(verified.get("snapshotHash"), export.get("snapshotHash"));

    let not_zip = workspace.join("notes.txt");
    std::fs::write(&not_zip, b"plain text").expect("write text file");
    let rejected = request(
        &mut stdin,
        &mut reader,
        "4",
        "reports.verifyBundle",
        json!({ "path": not_zip.to_string_lossy() }),
    );
    assert_eq!(error_code(&rejected), Some("bundle_invalid"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
