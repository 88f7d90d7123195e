pub mod labels;
pub mod sections;

use colored::Colorize;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),

    #[error("No PR data to report on")]
    EmptyCorpus,
}

/// Output rendered markdown to the terminal (default) or to a file.
///
/// Parent directories of `output_path` are created as needed.
#[instrument(skip(markdown), fields(bytes = markdown.len()))]
pub fn output(markdown: &str, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing report to terminal");
            print!("{markdown}");
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            write_markdown(path, markdown)
        }
    }
}

fn write_markdown(path: &Path, markdown: &str) -> Result<(), ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, markdown)?;
    Ok(())
}

/// One coloured line summarising what a command produced.
pub fn print_summary(action: &str, count: usize, noun: &str, location: &Path) {
    let count = if count == 0 {
        count.to_string().yellow().bold()
    } else {
        count.to_string().green().bold()
    };
    println!(
        "{} {} {} {} {}",
        "✔".green(),
        action,
        count,
        noun,
        format!("→ {}", location.display()).dimmed()
    );
}

/// `[PR #n](url) title`, the list entry shared by all reports.
pub(crate) fn pr_link(number: impl std::fmt::Display, url: &str, title: &str) -> String {
    format!("[PR #{number}]({url}) {title}")
}
