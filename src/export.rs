use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::engine::report::TermReport;

const MANIFEST_ENTRY: &str = "manifest.json";
const TERM_ENTRY: &str = "term.json";
pub const BUNDLE_FORMAT_V1: &str = "progression-reports-v1";

/// What was written to, or found in, a report bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub snapshot_hash: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn standings_table(report: &TermReport) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = report
        .students
        .iter()
        .map(|r| {
            json!({
                "studentId": r.summary.student_id,
                "displayName": r.display_name,
                "classId": r.summary.class_id,
                "className": r.class_name,
                "overallAverage": r.summary.overall_average,
                "classRank": r.summary.class_rank,
                "schoolRank": r.summary.school_rank,
                "decision": r.decision.decision,
            })
        })
        .collect();
    json!({
        "term": report.term,
        "snapshotHash": report.snapshot_hash,
        "warnings": report.warnings,
        "standings": rows,
    })
}

/// Writes one JSON report card per student plus a standings table. The
/// manifest lists every entry with its sha256 so renderers can detect a
/// partial or altered bundle.
pub fn export_report_bundle(
    report: &TermReport,
    class_id: Option<&str>,
    out_path: &Path,
) -> anyhow::Result<BundleSummary> {
    let mut entries: Vec<(String, Vec<u8>)> = Vec::with_capacity(report.students.len() + 1);
    entries.push((
        TERM_ENTRY.to_string(),
        serde_json::to_vec_pretty(&standings_table(report)).context("failed to serialize standings")?,
    ));
    for student in &report.students {
        let bytes = serde_json::to_vec_pretty(student).with_context(|| {
            format!("failed to serialize report for {}", student.summary.student_id)
        })?;
        entries.push((format!("students/{}.json", student.summary.student_id), bytes));
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let listed: Vec<serde_json::Value> = entries
        .iter()
        .map(|(name, bytes)| {
            json!({
                "path": name,
                "sha256": sha256_hex(bytes),
                "bytes": bytes.len(),
            })
        })
        .collect();
    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "generatedAt": chrono::Utc::now().to_rfc3339(),
        "termId": report.term.id,
        "classId": class_id,
        "snapshotHash": report.snapshot_hash,
        "entries": listed,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    for (name, bytes) in &entries {
        zip.start_file(name.as_str(), opts)
            .with_context(|| format!("failed to start entry {}", name))?;
        zip.write_all(bytes)
            .with_context(|| format!("failed to write entry {}", name))?;
    }
    zip.finish().context("failed to finalize zip bundle")?;

    Ok(BundleSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: entries.len() + 1,
        snapshot_hash: report.snapshot_hash.clone(),
    })
}

/// Re-reads a bundle and checks every manifest entry against its checksum.
pub fn verify_report_bundle(in_path: &Path) -> anyhow::Result<BundleSummary> {
    if !is_zip_file(in_path)? {
        return Err(anyhow!(
            "not a report bundle: {}",
            in_path.to_string_lossy()
        ));
    }
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let listed = manifest
        .get("entries")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("manifest.json has no entries list"))?;
    for entry in listed {
        let path = entry
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("manifest entry without path"))?;
        let expected = entry
            .get("sha256")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("manifest entry {} without sha256", path))?;
        let mut bytes = Vec::new();
        archive
            .by_name(path)
            .with_context(|| format!("bundle missing {}", path))?
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed to read {}", path))?;
        if sha256_hex(&bytes) != expected {
            return Err(anyhow!("checksum mismatch for {}", path));
        }
    }

    Ok(BundleSummary {
        bundle_format: format.to_string(),
        entry_count: listed.len() + 1,
        snapshot_hash: manifest
            .get("snapshotHash")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
    })
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}
