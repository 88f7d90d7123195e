use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pr::PullRequestRecord;

/// File name of the sync watermark inside the corpus directory.
pub const WATERMARK_FILE: &str = "last_run_info.json";

#[derive(Debug, Error)]
pub enum WatermarkError {
    #[error("Failed to access watermark file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Watermark file is corrupt: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Bookkeeping for the most recent successful sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watermark {
    /// Newest `updated_at` seen; the next incremental run stops at or before it.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub last_updated_at: DateTime<Utc>,
    /// When the sync finished
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub updated_count: usize,
}

impl Watermark {
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(WATERMARK_FILE)
    }

    /// Watermark for a sync that updated `records`, or None when nothing was updated.
    ///
    /// Records without an `updated_at` fall back to `now`.
    pub fn after_sync(records: &[PullRequestRecord], now: DateTime<Utc>) -> Option<Watermark> {
        if records.is_empty() {
            return None;
        }
        let last_updated_at = records
            .iter()
            .filter_map(PullRequestRecord::updated_at)
            .max()
            .unwrap_or(now);
        Some(Watermark {
            last_updated_at,
            timestamp: now,
            updated_count: records.len(),
        })
    }

    /// Read the watermark from `dir`; Ok(None) when the file does not exist.
    pub fn load(dir: &Path) -> Result<Option<Watermark>, WatermarkError> {
        let path = Self::path(dir);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    pub fn save(&self, dir: &Path) -> Result<PathBuf, WatermarkError> {
        fs::create_dir_all(dir)?;
        let path = Self::path(dir);
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

/// RFC 3339, or a naive ISO-8601 timestamp taken as local time.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}
