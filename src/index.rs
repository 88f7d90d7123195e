use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::pr::{diff, PullRequestRecord};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Failed to write index: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize index: {0}")]
    Json(#[from] serde_json::Error),
}

/// Label name → PR numbers, in the order the PRs were first seen.
pub type LabelIndex = BTreeMap<String, Vec<u64>>;

/// Heading title → the pull requests that introduced it, one entry per PR.
pub type SectionIndex = BTreeMap<String, Vec<SectionEntry>>;

/// A pull request contributing a heading, with what the report needs to link it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionEntry {
    pub number: u64,
    pub title: String,
    pub url: String,
    /// First file of the PR in which the heading was added
    pub filename: String,
}

/// Build the label index from scratch.
///
/// Labels come from both the top-level `labels` and `basic_info.labels`.
/// Records without a number are skipped.
pub fn build_label_index(records: &[PullRequestRecord]) -> LabelIndex {
    let mut index = LabelIndex::new();
    for record in records {
        let Some(number) = record.number() else {
            continue;
        };
        for name in record.label_names() {
            let numbers = index.entry(name.to_string()).or_default();
            if !numbers.contains(&number) {
                numbers.push(number);
            }
        }
    }
    index
}

/// Build the section index from scratch, using each record's stored
/// `section_info` when present and re-extracting headings otherwise.
pub fn build_section_index(records: &[PullRequestRecord]) -> SectionIndex {
    let mut index = SectionIndex::new();
    for record in records {
        let Some(number) = record.number() else {
            continue;
        };
        for file in diff::record_sections(record) {
            for heading in &file.sections {
                let entries = index.entry(heading.title.clone()).or_default();
                if entries.iter().any(|entry| entry.number == number) {
                    continue;
                }
                entries.push(SectionEntry {
                    number,
                    title: record.title().to_string(),
                    url: record.html_url().to_string(),
                    filename: file.filename.clone(),
                });
            }
        }
    }
    index
}

/// Longest file stem, in bytes, leaving room for an extension under the
/// usual 255-byte file name limit.
const MAX_FILE_STEM_BYTES: usize = 200;

/// Make a label or heading usable as a file name: path separators and `:`
/// become `_`, and overlong names are cut at a character boundary.
pub fn sanitize_file_name(name: &str) -> String {
    let mut sanitized = name.replace(['/', '\\', ':'], "_");
    if sanitized.len() > MAX_FILE_STEM_BYTES {
        let mut end = MAX_FILE_STEM_BYTES;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized.truncate(end);
    }
    sanitized
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSummary {
    pub labels: usize,
    pub sections: usize,
    /// Index files that could not be written
    pub failed: usize,
}

/// Rebuild `<indexes_dir>/by_label` and `<indexes_dir>/by_section`.
///
/// Both directories are emptied first so no file survives for a label or
/// heading that is gone from the corpus.
#[instrument(skip(records), fields(records = records.len()))]
pub fn write_indexes(
    records: &[PullRequestRecord],
    indexes_dir: &Path,
) -> Result<IndexSummary, IndexError> {
    let label_index = build_label_index(records);
    let section_numbers: BTreeMap<String, Vec<u64>> = build_section_index(records)
        .into_iter()
        .map(|(title, entries)| (title, entries.iter().map(|e| e.number).collect()))
        .collect();

    let failed = write_index_dir(&indexes_dir.join("by_label"), &label_index)?
        + write_index_dir(&indexes_dir.join("by_section"), &section_numbers)?;

    info!(
        labels = label_index.len(),
        sections = section_numbers.len(),
        failed,
        dir = %indexes_dir.display(),
        "wrote indexes"
    );
    Ok(IndexSummary {
        labels: label_index.len(),
        sections: section_numbers.len(),
        failed,
    })
}

/// Recreate `dir` with one `<name>.json` per entry. A file that cannot be
/// written is logged and skipped; the number of such files is returned.
fn write_index_dir(dir: &Path, index: &BTreeMap<String, Vec<u64>>) -> Result<usize, IndexError> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;

    // distinct names can collide once sanitized; merge them
    let mut files: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    for (name, numbers) in index {
        let file_name = sanitize_file_name(name);
        let merged = files.entry(file_name.clone()).or_default();
        if !merged.is_empty() {
            warn!(name = %name, file = %file_name, "index names collide after sanitizing, merging");
        }
        for number in numbers {
            if !merged.contains(number) {
                merged.push(*number);
            }
        }
    }

    let mut failed = 0;
    for (file_name, numbers) in files {
        let path = dir.join(format!("{file_name}.json"));
        if let Err(e) = fs::write(&path, serde_json::to_string_pretty(&numbers)?) {
            warn!(path = %path.display(), error = %e, "failed to write index file, skipping");
            failed += 1;
        }
    }
    Ok(failed)
}
