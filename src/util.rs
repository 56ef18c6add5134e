use std::env;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::model::InputFile;

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn utc_compact_string(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn current_operator() -> String {
    ["USER", "USERNAME"]
        .iter()
        .find_map(|key| env::var(key).ok().filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn ensure_input_file(path: &Path, label: &str) -> Result<()> {
    if !path.exists() {
        bail!("{label} not found: {}", path.display());
    }
    if !path.is_file() {
        bail!("{label} is not a regular file: {}", path.display());
    }
    Ok(())
}

pub fn same_file_path(existing: &Path, candidate: &Path) -> Result<bool> {
    let existing = fs::canonicalize(existing)
        .with_context(|| format!("failed to resolve path: {}", existing.display()))?;

    let candidate = if candidate.exists() {
        fs::canonicalize(candidate)
            .with_context(|| format!("failed to resolve path: {}", candidate.display()))?
    } else {
        let Some(name) = candidate.file_name() else {
            return Ok(false);
        };
        let parent = candidate
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        match fs::canonicalize(parent) {
            Ok(parent) => parent.join(name),
            Err(_) => return Ok(false),
        }
    };

    Ok(existing == candidate)
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];

    loop {
        let count = file
            .read(&mut buf)
            .with_context(|| format!("failed to read file for hashing: {}", path.display()))?;
        if count == 0 {
            break;
        }
        hasher.update(&buf[..count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub fn describe_input(path: &Path) -> Result<InputFile> {
    Ok(InputFile {
        path: path.display().to_string(),
        sha256: sha256_file(path)?,
    })
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }

    let data = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;

    let mut file = File::create(path)
        .with_context(|| format!("failed to create json file: {}", path.display()))?;
    file.write_all(&data)
        .with_context(|| format!("failed to write json file: {}", path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("failed to finalize json file: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_file_hashes_contents() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("ledger.csv");
        fs::write(&path, b"abc").expect("write file");

        assert_eq!(
            sha256_file(&path).expect("hash"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn ensure_input_file_rejects_missing_and_directories() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = ensure_input_file(&dir.path().join("absent.csv"), "ledger")
            .expect_err("missing file should fail");
        assert!(missing.to_string().starts_with("ledger not found"));

        let directory =
            ensure_input_file(dir.path(), "ledger").expect_err("directory should fail");
        assert!(directory.to_string().contains("not a regular file"));
    }

    #[test]
    fn same_file_path_sees_through_dot_segments() {
        let dir = tempfile::tempdir().expect("temp dir");
        let template = dir.path().join("statement.pdf");
        fs::write(&template, b"%PDF-1.5").expect("write file");

        let dotted = dir.path().join(".").join("statement.pdf");
        assert!(same_file_path(&template, &dotted).expect("compare"));

        fs::create_dir(dir.path().join("sub")).expect("create dir");
        let sibling = dir.path().join("sub").join("..").join("statement.pdf");
        assert!(same_file_path(&template, &sibling).expect("compare"));

        let fresh = dir.path().join(".").join("statement_invoices.pdf");
        assert!(!same_file_path(&template, &fresh).expect("compare"));

        let missing_parent = dir.path().join("out").join("statement.pdf");
        assert!(!same_file_path(&template, &missing_parent).expect("compare"));
    }

    #[test]
    fn write_json_pretty_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("reports").join("run.json");

        write_json_pretty(&path, &serde_json::json!({ "annotations": 2 })).expect("write json");

        let raw = fs::read_to_string(&path).expect("read json");
        assert!(raw.ends_with("}\n"));
        assert!(raw.contains("\"annotations\": 2"));
    }

    #[test]
    fn utc_compact_string_formats_run_ids() {
        let ts = DateTime::parse_from_rfc3339("2024-01-31T08:15:00Z")
            .expect("timestamp")
            .with_timezone(&Utc);
        assert_eq!(utc_compact_string(ts), "20240131T081500Z");
    }
}
