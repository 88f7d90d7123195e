use std::path::Path;
use tracing::instrument;

use super::{output, pr_link, ReportError};
use crate::index::{build_section_index, SectionIndex};
use crate::pr::PullRequestRecord;

/// GitHub-style anchor for a heading: lowercase, spaces as dashes, no dots or parentheses.
pub fn anchor_slug(title: &str) -> String {
    title
        .to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| !matches!(c, '.' | '(' | ')'))
        .collect()
}

/// Markdown report grouping pull requests by the headings they added,
/// with a table of contents. Titles are sorted lexicographically.
pub fn render_section_report(index: &SectionIndex) -> String {
    if index.is_empty() {
        return "# Pull Requests by Section\n\nNo sections found in the PR data.\n".to_string();
    }

    let mut md = String::from("# Pull Requests by Section\n\n## Contents\n\n");
    for (title, entries) in index {
        md.push_str(&format!("- [{title}](#{}) ({})\n", anchor_slug(title), entries.len()));
    }
    md.push_str("\n---\n\n");

    for (title, entries) in index {
        md.push_str(&format!("## {title}\n\n"));
        for entry in entries {
            md.push_str(&format!(
                "- {} ({})\n",
                pr_link(entry.number, &entry.url, &entry.title),
                entry.filename
            ));
        }
        md.push('\n');
    }
    md
}

/// Build the section index from `records` and write (or print) the report.
/// Returns the number of distinct sections.
#[instrument(skip(records), fields(records = records.len()))]
pub fn write_section_report(
    records: &[PullRequestRecord],
    output_path: Option<&Path>,
) -> Result<usize, ReportError> {
    if records.is_empty() {
        return Err(ReportError::EmptyCorpus);
    }
    let index = build_section_index(records);
    output(&render_section_report(&index), output_path)?;
    Ok(index.len())
}
