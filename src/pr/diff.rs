use regex::Regex;
use std::sync::LazyLock;

use super::types::{FileSections, Heading, PullRequestRecord};

/// An added diff line carrying a markdown ATX heading.
static ADDED_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+\s*(#{1,6})\s+(\S.*)$").expect("heading pattern is valid")
});

const MARKDOWN_EXTENSIONS: &[&str] = &[".md", ".markdown"];

/// Extract the markdown headings introduced by a unified diff.
///
/// Only added lines (`+`, optionally followed by whitespace) are considered.
/// Removed lines, context lines and the `+++` file header never match.
/// Headings are returned in diff order and are not deduplicated.
pub fn extract_headings(patch: Option<&str>) -> Vec<Heading> {
    let Some(patch) = patch else {
        return Vec::new();
    };

    patch
        .lines()
        .filter_map(|line| {
            let caps = ADDED_HEADING.captures(line)?;
            let title = caps[2].trim();
            if title.is_empty() {
                return None;
            }
            Some(Heading {
                level: caps[1].len() as u8,
                title: title.to_string(),
            })
        })
        .collect()
}

pub fn is_markdown_file(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    MARKDOWN_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Headings per changed markdown file of a pull request.
///
/// Non-markdown files, files without a patch and files whose patch adds no
/// heading are left out.
pub fn file_sections(record: &PullRequestRecord) -> Vec<FileSections> {
    record
        .files
        .iter()
        .filter(|file| is_markdown_file(&file.filename))
        .filter_map(|file| {
            let patch = file.patch.as_deref().filter(|p| !p.is_empty())?;
            let sections = extract_headings(Some(patch));
            (!sections.is_empty()).then(|| FileSections {
                filename: file.filename.clone(),
                sections,
            })
        })
        .collect()
}

/// Pre-computed `section_info` when the record carries it, otherwise a
/// fresh extraction from its files.
pub fn record_sections(record: &PullRequestRecord) -> Vec<FileSections> {
    match &record.section_info {
        Some(sections) => sections.clone(),
        None => file_sections(record),
    }
}
