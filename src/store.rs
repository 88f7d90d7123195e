use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::collect::watermark::WATERMARK_FILE;
use crate::pr::PullRequestRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access PR data: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to (de)serialize PR data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("PR record has no number in basic_info")]
    MissingNumber,

    #[error("PR data not found: {0}")]
    NotFound(PathBuf),
}

pub fn record_path(dir: &Path, number: u64) -> PathBuf {
    dir.join(format!("{number}.json"))
}

/// Write `record` to `<dir>/<number>.json`, replacing any previous snapshot.
pub fn save(record: &PullRequestRecord, dir: &Path) -> Result<PathBuf, StoreError> {
    let number = record.number().ok_or(StoreError::MissingNumber)?;
    fs::create_dir_all(dir)?;
    let path = record_path(dir, number);
    fs::write(&path, serde_json::to_string_pretty(record)?)?;
    debug!(number, path = %path.display(), "saved PR record");
    Ok(path)
}

fn is_record_file(path: &Path) -> bool {
    let is_json = path.extension().is_some_and(|ext| ext == "json");
    let is_watermark = path.file_name().is_some_and(|name| name == WATERMARK_FILE);
    path.is_file() && is_json && !is_watermark
}

/// Whether `dir` holds at least one per-PR file, without parsing any.
pub fn has_records(dir: &Path) -> bool {
    fs::read_dir(dir).is_ok_and(|entries| {
        entries
            .filter_map(Result::ok)
            .any(|entry| is_record_file(&entry.path()))
    })
}

/// Read every per-PR JSON file directly inside `dir`.
///
/// Files that fail to parse are logged and skipped. The watermark file is
/// not a record and is ignored. Records come back sorted by PR number so
/// everything derived from them is stable across file systems.
#[instrument]
pub fn load_all(dir: &Path) -> Result<Vec<PullRequestRecord>, StoreError> {
    if !dir.is_dir() {
        return Err(StoreError::NotFound(dir.to_path_buf()));
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if is_record_file(&path) {
            paths.push(path);
        }
    }
    info!(files = paths.len(), "found PR data files");

    let mut records = Vec::with_capacity(paths.len());
    for path in paths {
        match read_record(&path) {
            Ok(record) => records.push((path, record)),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable PR file"),
        }
    }
    records.sort_by(|(a_path, a), (b_path, b)| {
        let a_key = a.number().unwrap_or(u64::MAX);
        let b_key = b.number().unwrap_or(u64::MAX);
        a_key.cmp(&b_key).then_with(|| a_path.cmp(b_path))
    });
    Ok(records.into_iter().map(|(_, record)| record).collect())
}

fn read_record(path: &Path) -> Result<PullRequestRecord, StoreError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Load a corpus from either a directory of per-PR files or a single JSON
/// file holding an array of records. Null or malformed array entries are
/// logged and skipped.
pub fn load_corpus(path: &Path) -> Result<Vec<PullRequestRecord>, StoreError> {
    if path.is_dir() {
        return load_all(path);
    }
    if !path.is_file() {
        return Err(StoreError::NotFound(path.to_path_buf()));
    }

    let contents = fs::read_to_string(path)?;
    let entries: Vec<Value> = serde_json::from_str(&contents)?;
    let total = entries.len();
    let records: Vec<PullRequestRecord> = entries
        .into_iter()
        .enumerate()
        .filter(|(_, entry)| !entry.is_null())
        .filter_map(|(i, entry)| match serde_json::from_value(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(index = i, error = %e, "skipping malformed PR entry");
                None
            }
        })
        .collect();
    info!(loaded = records.len(), total, path = %path.display(), "loaded PR data");
    Ok(records)
}
