use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use super::{pr_link, write_markdown, ReportError};
use crate::index::sanitize_file_name;
use crate::pr::{PrState, PullRequestRecord};

/// Group name for pull requests without any label.
pub const UNLABELED: &str = "unlabeled";

pub type LabelGroups<'a> = BTreeMap<String, Vec<&'a PullRequestRecord>>;

/// Group records by label name, keeping input order inside each group.
/// Records without labels land in [`UNLABELED`].
pub fn group_by_label(records: &[PullRequestRecord]) -> LabelGroups<'_> {
    let mut groups = LabelGroups::new();
    let mut unlabeled = Vec::new();
    for record in records {
        let names = record.label_names();
        if names.is_empty() {
            unlabeled.push(record);
            continue;
        }
        for name in names {
            groups.entry(name.to_string()).or_default().push(record);
        }
    }
    if !unlabeled.is_empty() {
        groups.entry(UNLABELED.to_string()).or_default().extend(unlabeled);
    }
    groups
}

fn display_name(label: &str) -> &str {
    if label == UNLABELED {
        "Unlabeled"
    } else {
        label
    }
}

/// File stem of a label's report: lowercase, spaces as dashes.
pub fn label_file_stem(label: &str) -> String {
    sanitize_file_name(&label.to_lowercase().replace(' ', "-"))
}

/// Stem of the label index page; no label page may take it.
const INDEX_STEM: &str = "index";

/// Labels in index order: `unlabeled` last, otherwise case-insensitive.
fn ordered_labels<'g>(groups: &'g LabelGroups<'_>) -> Vec<&'g str> {
    let mut labels: Vec<&str> = groups.keys().map(String::as_str).collect();
    labels.sort_by_key(|label| (*label == UNLABELED, label.to_lowercase()));
    labels
}

/// A distinct file stem for every label. Labels whose stems collide after
/// lowercasing or sanitizing, or that would take `index`, get `-2`, `-3`, ...
/// in index order.
pub fn label_file_stems<'g>(groups: &'g LabelGroups<'_>) -> BTreeMap<&'g str, String> {
    let mut taken = BTreeSet::from([INDEX_STEM.to_string()]);
    let mut stems = BTreeMap::new();
    for label in ordered_labels(groups) {
        let base = label_file_stem(label);
        let mut stem = base.clone();
        let mut n = 2;
        while taken.contains(&stem) {
            stem = format!("{base}-{n}");
            n += 1;
        }
        taken.insert(stem.clone());
        stems.insert(label, stem);
    }
    stems
}

/// Markdown page for one label: open PRs first, then closed ones.
pub fn render_label_page(label: &str, prs: &[&PullRequestRecord]) -> String {
    if prs.is_empty() {
        return format!("# {label}\n\nNo pull requests carry this label.\n");
    }

    let mut md = format!("# {}\n\n", display_name(label));
    for (state, heading) in [(PrState::Open, "Open"), (PrState::Closed, "Closed")] {
        let matching: Vec<_> = prs.iter().filter(|pr| pr.state() == Some(state)).collect();
        if matching.is_empty() {
            continue;
        }
        md.push_str(&format!("## {heading} ({})\n\n", matching.len()));
        for pr in matching {
            let number = pr.number().map_or_else(|| "?".to_string(), |n| n.to_string());
            md.push_str(&format!("- {}\n", pr_link(number, pr.html_url(), pr.title())));
        }
        md.push('\n');
    }
    md
}

/// Index page listing every label with its PR count, `unlabeled` last.
pub fn render_label_index(groups: &LabelGroups<'_>) -> String {
    if groups.is_empty() {
        return "# Labels\n\nNo labels found.\n".to_string();
    }

    let stems = label_file_stems(groups);
    let mut md = String::from("# Labels\n\n");
    for label in ordered_labels(groups) {
        md.push_str(&format!(
            "- [{}]({}.md) ({})\n",
            display_name(label),
            stems[label],
            groups[label].len()
        ));
    }
    md
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelReportSummary {
    pub labels: usize,
    pub index_file: PathBuf,
}

/// Write one page per label plus `index.md` into `output_dir`.
#[instrument(skip(records), fields(records = records.len()))]
pub fn write_label_reports(
    records: &[PullRequestRecord],
    output_dir: &Path,
) -> Result<LabelReportSummary, ReportError> {
    if records.is_empty() {
        return Err(ReportError::EmptyCorpus);
    }

    let groups = group_by_label(records);
    let stems = label_file_stems(&groups);
    for (label, prs) in &groups {
        let path = output_dir.join(format!("{}.md", stems[label.as_str()]));
        write_markdown(&path, &render_label_page(label, prs))?;
        info!(label = %label, prs = prs.len(), path = %path.display(), "wrote label report");
    }

    let index_file = output_dir.join(format!("{INDEX_STEM}.md"));
    write_markdown(&index_file, &render_label_index(&groups))?;
    Ok(LabelReportSummary {
        labels: groups.len(),
        index_file,
    })
}
