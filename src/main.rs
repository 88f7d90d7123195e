mod collect;
mod config;
mod github;
mod index;
mod migrate;
mod pr;
mod report;
mod store;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info, info_span, instrument};
use tracing_subscriber::EnvFilter;

use collect::{Collector, Direction, FetchOptions, SortBy, StateFilter, SubResource};

/// PR Collector: mirrors a repository's GitHub Pull Requests into one JSON
/// file per PR, builds label and section indexes, and renders markdown reports.
#[derive(Parser, Debug)]
#[command(name = "pr-collector", version, about)]
struct Cli {
    /// Config file (defaults to .pr-collector.toml in the current directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch new or updated pull requests and store one JSON file per PR
    Collect(CollectArgs),

    /// Rebuild the by-label and by-section indexes from stored PR data
    Index {
        /// Directory of per-PR JSON files (defaults to data.base_dir)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Index root (defaults to data.indexes_dir)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Render one markdown report per label plus an index page
    Labels {
        /// PR data directory or JSON array file (defaults to data.base_dir)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Report directory (defaults to <reports_dir>/labels)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Render a report of the markdown sections each PR added
    Sections {
        /// PR data directory or JSON array file (defaults to data.base_dir)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Report file (defaults to <reports_dir>/sections/section_report.md)
        #[arg(long, conflicts_with = "stdout")]
        output: Option<PathBuf>,

        /// Print the report instead of writing a file
        #[arg(long)]
        stdout: bool,
    },

    /// Split a single JSON array of PR records into per-PR files and build indexes
    Migrate {
        /// Legacy JSON file holding an array of PR records
        #[arg(long)]
        input: PathBuf,

        /// Destination directory (defaults to data.base_dir)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct CollectArgs {
    /// Maximum number of pull requests to fetch (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    limit: usize,

    /// Where to store PR files and run info (defaults to data.base_dir)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = StateFilter::All)]
    state: StateFilter,

    #[arg(long, value_enum, default_value_t = SortBy::Updated)]
    sort: SortBy,

    #[arg(long, value_enum, default_value_t = Direction::Desc)]
    direction: Direction,

    /// Ignore the previous run info and fetch every pull request
    #[arg(long)]
    force_full: bool,

    /// Sub-resources not to fetch (comma separated)
    #[arg(long, value_enum, value_delimiter = ',')]
    skip: Vec<SubResource>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = config::Config::load(cli.config.as_deref())?;
    debug!(owner = %config.github.repo_owner, repo = %config.github.repo_name, "loaded configuration");

    match cli.command {
        Command::Collect(args) => run_collect(&config, args).await?,
        Command::Index { input, output_dir } => {
            let input = input.unwrap_or_else(|| config.data.base_dir.clone());
            let output_dir = output_dir.unwrap_or_else(|| config.data.indexes_dir());
            let _span = info_span!("index", input = %input.display()).entered();

            let records = store::load_all(&input)?;
            let summary = index::write_indexes(&records, &output_dir)?;
            report::print_summary("indexed", summary.labels, "labels", &output_dir.join("by_label"));
            report::print_summary("indexed", summary.sections, "sections", &output_dir.join("by_section"));
        }
        Command::Labels { input, output_dir } => {
            let input = input.unwrap_or_else(|| config.data.base_dir.clone());
            let output_dir = output_dir.unwrap_or_else(|| config.data.reports_dir.join("labels"));
            let _span = info_span!("labels", input = %input.display()).entered();

            let records = store::load_corpus(&input)?;
            let summary = report::labels::write_label_reports(&records, &output_dir)?;
            report::print_summary("wrote", summary.labels, "label reports", &output_dir);
        }
        Command::Sections { input, output, stdout } => {
            let input = input.unwrap_or_else(|| config.data.base_dir.clone());
            let output = if stdout {
                None
            } else {
                Some(output.unwrap_or_else(|| {
                    config.data.reports_dir.join("sections").join("section_report.md")
                }))
            };
            let _span = info_span!("sections", input = %input.display()).entered();

            let records = store::load_corpus(&input)?;
            let sections = report::sections::write_section_report(&records, output.as_deref())?;
            if let Some(output) = &output {
                report::print_summary("reported", sections, "sections", output);
            }
        }
        Command::Migrate { input, output_dir } => {
            let output_dir = output_dir.unwrap_or_else(|| config.data.base_dir.clone());
            let summary = migrate::migrate(&input, &output_dir)?;
            report::print_summary("migrated", summary.saved, "pull requests", &output_dir);
            report::print_summary("indexed", summary.indexes.labels, "labels", &output_dir.join("indexes"));
        }
    }

    Ok(())
}

#[instrument(skip_all, fields(owner = %config.github.repo_owner, repo = %config.github.repo_name))]
async fn run_collect(
    config: &config::Config,
    args: CollectArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    if config.github.repo_owner.is_empty() || config.github.repo_name.is_empty() {
        return Err("github.repo_owner and github.repo_name must be set in the config file".into());
    }
    let store_dir = args.output_dir.unwrap_or_else(|| config.data.base_dir.clone());
    info!(store = %store_dir.display(), force_full = args.force_full, "collecting pull requests");

    let client = github::GithubClient::from_config(config)?;
    let collector = Collector::new(client, config);
    let fetch = FetchOptions {
        limit: (args.limit > 0).then_some(args.limit),
        sort: args.sort,
        direction: args.direction,
        since: None,
        state: args.state,
    };
    let include = collect::DetailOptions::without(&args.skip);

    let outcome = collect::sync(&collector, fetch, &include, &store_dir, args.force_full).await?;
    info!(updated = outcome.updated.len(), "collection finished");
    report::print_summary("updated", outcome.updated.len(), "pull requests", &store_dir);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_collect_args() {
        let cli = Cli::try_parse_from([
            "pr-collector",
            "collect",
            "--limit",
            "5",
            "--state",
            "open",
            "--sort",
            "long-running",
            "--skip",
            "comments,review-comments",
            "--force-full",
        ])
        .unwrap();
        let Command::Collect(args) = cli.command else {
            panic!("expected collect");
        };
        assert_eq!(args.limit, 5);
        assert_eq!(args.state, StateFilter::Open);
        assert_eq!(args.sort, SortBy::LongRunning);
        assert_eq!(args.direction, Direction::Desc);
        assert_eq!(args.skip, vec![SubResource::Comments, SubResource::ReviewComments]);
        assert!(args.force_full);
    }

    #[test]
    fn test_sections_output_conflicts_with_stdout() {
        let result = Cli::try_parse_from([
            "pr-collector",
            "sections",
            "--output",
            "x.md",
            "--stdout",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["pr-collector", "labels", "--config", "alt.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
    }
}
