pub mod watermark;

pub use watermark::Watermark;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::github::{ApiClient, GithubError, RateLimitGuard};
use crate::pr::{diff, BasicInfo, PullRequestRecord, PullSummary};
use crate::store;

/// Items requested per page, for both the listing and the sub-resources.
const PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StateFilter {
    Open,
    Closed,
    #[default]
    All,
}

impl StateFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            StateFilter::Open => "open",
            StateFilter::Closed => "closed",
            StateFilter::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SortBy {
    Created,
    #[default]
    Updated,
    Popularity,
    LongRunning,
}

impl SortBy {
    pub fn as_str(self) -> &'static str {
        match self {
            SortBy::Created => "created",
            SortBy::Updated => "updated",
            SortBy::Popularity => "popularity",
            SortBy::LongRunning => "long-running",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Direction {
    Asc,
    #[default]
    Desc,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

/// Parameters of one paginated listing pass.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Stop once this many pull requests were collected
    pub limit: Option<usize>,
    pub sort: SortBy,
    pub direction: Direction,
    /// Watermark: the first pull request updated at or before it ends the pass
    pub since: Option<DateTime<Utc>>,
    pub state: StateFilter,
}

/// A per-PR sub-resource that can be left out of collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SubResource {
    Labels,
    Comments,
    ReviewComments,
    Commits,
    Files,
}

/// Which sub-resources the assembler requests for each pull request.
#[derive(Debug, Clone, Copy)]
pub struct DetailOptions {
    pub labels: bool,
    pub comments: bool,
    pub review_comments: bool,
    pub commits: bool,
    pub files: bool,
}

impl Default for DetailOptions {
    fn default() -> Self {
        Self {
            labels: true,
            comments: true,
            review_comments: true,
            commits: true,
            files: true,
        }
    }
}

impl DetailOptions {
    /// Everything except the given sub-resources.
    pub fn without(skipped: &[SubResource]) -> Self {
        Self {
            labels: !skipped.contains(&SubResource::Labels),
            comments: !skipped.contains(&SubResource::Comments),
            review_comments: !skipped.contains(&SubResource::ReviewComments),
            commits: !skipped.contains(&SubResource::Commits),
            files: !skipped.contains(&SubResource::Files),
        }
    }
}

/// Fetches pull requests of one repository, strictly one request at a time.
pub struct Collector<C> {
    client: C,
    repo_path: String,
    request_delay: Duration,
    guard: RateLimitGuard,
}

impl<C: ApiClient> Collector<C> {
    pub fn new(client: C, config: &Config) -> Self {
        Self {
            client,
            repo_path: format!(
                "/repos/{}/{}",
                config.github.repo_owner, config.github.repo_name
            ),
            request_delay: config.api.request_delay(),
            guard: RateLimitGuard::from_config(&config.api),
        }
    }

    #[cfg(test)]
    pub fn client(&self) -> &C {
        &self.client
    }

    async fn pause(&self) {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
    }

    /// List pull requests page by page, newest first by default.
    ///
    /// Paging stops at the first pull request not newer than `options.since`
    /// (it and everything after it are dropped), once `options.limit` is
    /// reached, on an empty page, or on a failed page. Whatever was
    /// collected before a failure is returned.
    #[instrument(skip(self, options), fields(state = options.state.as_str(), since = ?options.since, limit = ?options.limit))]
    pub async fn fetch_pull_requests(&self, options: &FetchOptions) -> Vec<PullSummary> {
        let path = format!("{}/pulls", self.repo_path);
        let mut collected: Vec<PullSummary> = Vec::new();
        let mut page: u32 = 1;

        loop {
            let params = [
                ("state", options.state.as_str().to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
                ("sort", options.sort.as_str().to_string()),
                ("direction", options.direction.as_str().to_string()),
            ];
            let fetched = self.client.get_json(&path, &params).await;
            let summaries: Vec<PullSummary> = match fetched.and_then(|v| decode(&path, v)) {
                Ok(summaries) => summaries,
                Err(e) => {
                    error!(page, error = %e, "failed to fetch pull request page, stopping");
                    break;
                }
            };
            if summaries.is_empty() {
                debug!(page, "empty page, listing exhausted");
                break;
            }

            let mut reached_synced = false;
            for summary in summaries {
                if options.since.is_some_and(|since| summary.updated_at <= since) {
                    info!(number = summary.number, "reached previously synced pull request");
                    reached_synced = true;
                    break;
                }
                collected.push(summary);
            }

            if let Some(limit) = options.limit {
                if collected.len() >= limit {
                    collected.truncate(limit);
                    break;
                }
            }
            if reached_synced {
                break;
            }

            page += 1;
            self.pause().await;
        }

        collected
    }

    /// Gather a pull request and its sub-resources into one record.
    ///
    /// Ok(None) when the pull request does not exist. A failing
    /// sub-resource is logged and stored as an empty collection.
    #[instrument(skip(self, include))]
    pub async fn assemble(
        &self,
        number: u64,
        include: &DetailOptions,
    ) -> Result<Option<PullRequestRecord>, GithubError> {
        let pull_path = format!("{}/pulls/{number}", self.repo_path);
        let issue_path = format!("{}/issues/{number}", self.repo_path);

        let basic_info: BasicInfo = match self.client.get_json(&pull_path, &[]).await {
            Ok(Value::Null) => return Ok(None),
            Ok(value) => decode(&pull_path, value)?,
            Err(e) if e.is_not_found() => {
                warn!(number, "pull request does not exist");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let mut record = PullRequestRecord::from_basic_info(basic_info);
        record.basic_info.number.get_or_insert(number);

        if include.labels {
            record.labels = self.sub_resource(number, "labels", &format!("{issue_path}/labels")).await;
        }
        if include.comments {
            record.comments = self.sub_resource(number, "comments", &format!("{issue_path}/comments")).await;
        }
        if include.review_comments {
            record.review_comments = self
                .sub_resource(number, "review comments", &format!("{pull_path}/comments"))
                .await;
        }
        if include.commits {
            record.commits = self.sub_resource(number, "commits", &format!("{pull_path}/commits")).await;
        }
        if include.files {
            record.files = self.sub_resource(number, "files", &format!("{pull_path}/files")).await;
            record.section_info = Some(diff::file_sections(&record));
        }

        Ok(Some(record))
    }

    async fn sub_resource<T: DeserializeOwned>(&self, number: u64, resource: &str, path: &str) -> Vec<T> {
        let params = [("per_page", PER_PAGE.to_string())];
        match self.client.get_json(path, &params).await.and_then(|v| decode(path, v)) {
            Ok(items) => items,
            Err(e) => {
                error!(number, resource, error = %e, "failed to fetch sub-resource, storing it empty");
                Vec::new()
            }
        }
    }

    /// One sync pass: rate-limit guard, listing, then assemble and save each
    /// pull request in listing order. Returns the records that were saved.
    #[instrument(skip_all, fields(store = %store_dir.display()))]
    pub async fn update(
        &self,
        fetch: &FetchOptions,
        include: &DetailOptions,
        store_dir: &Path,
    ) -> Vec<PullRequestRecord> {
        self.guard.check(&self.client).await;

        info!("fetching latest pull requests");
        let summaries = self.fetch_pull_requests(fetch).await;
        info!(count = summaries.len(), "pull requests to update");
        if summaries.is_empty() {
            return Vec::new();
        }

        let mut updated = Vec::with_capacity(summaries.len());
        for (i, summary) in summaries.iter().enumerate() {
            let number = summary.number;
            match self.assemble(number, include).await {
                Ok(Some(record)) => match store::save(&record, store_dir) {
                    Ok(path) => {
                        info!(number, progress = %format!("{}/{}", i + 1, summaries.len()), path = %path.display(), "saved pull request");
                        updated.push(record);
                    }
                    Err(e) => error!(number, error = %e, "failed to save pull request"),
                },
                Ok(None) => {}
                Err(e) => error!(number, error = %e, "failed to process pull request"),
            }
            self.pause().await;
        }
        updated
    }
}

fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T, GithubError> {
    serde_json::from_value(value).map_err(|source| GithubError::Decode {
        url: path.to_string(),
        source,
    })
}

/// Result of [`sync`].
#[derive(Debug)]
pub struct SyncOutcome {
    pub updated: Vec<PullRequestRecord>,
    /// Set when at least one pull request was updated and the watermark was rewritten
    pub watermark: Option<Watermark>,
}

/// Decide where an incremental pass starts.
///
/// A missing or unreadable watermark means a full fetch; both are logged.
pub fn resolve_since(store_dir: &Path, force_full: bool) -> Option<DateTime<Utc>> {
    if force_full {
        info!("--force-full given, fetching all pull requests");
        return None;
    }
    match Watermark::load(store_dir) {
        Ok(Some(watermark)) => {
            info!(since = %watermark.last_updated_at, "incremental update from previous run");
            Some(watermark.last_updated_at)
        }
        Ok(None) => {
            if store::has_records(store_dir) {
                warn!(dir = %store_dir.display(), "PR data exists but no previous run info, fetching everything");
            } else {
                info!("no previous run info, fetching everything");
            }
            None
        }
        Err(e) => {
            warn!(error = %e, "previous run info is unreadable, fetching everything");
            None
        }
    }
}

/// Watermark-driven sync: resolve the starting point, run [`Collector::update`]
/// and persist a new watermark when anything was updated.
pub async fn sync<C: ApiClient>(
    collector: &Collector<C>,
    mut fetch: FetchOptions,
    include: &DetailOptions,
    store_dir: &Path,
    force_full: bool,
) -> Result<SyncOutcome, watermark::WatermarkError> {
    fetch.since = resolve_since(store_dir, force_full);
    let updated = collector.update(&fetch, include, store_dir).await;

    let watermark = Watermark::after_sync(&updated, Utc::now());
    if let Some(watermark) = &watermark {
        let path = watermark.save(store_dir)?;
        info!(path = %path.display(), updated = watermark.updated_count, "saved run info");
    }
    Ok(SyncOutcome { updated, watermark })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::testing::ScriptedClient;
    use serde_json::json;

    const PULLS: &str = "/repos/o/r/pulls";

    fn config() -> Config {
        let mut config = Config::default();
        config.github.repo_owner = "o".to_string();
        config.github.repo_name = "r".to_string();
        config.api.request_delay = 0.0;
        config.api.rate_limit_wait = false;
        config
    }

    fn summary(number: u64, updated_at: &str) -> Value {
        json!({"number": number, "updated_at": updated_at, "title": format!("PR {number}")})
    }

    /// Five pull requests T5..T1, newest first.
    fn descending_page() -> Value {
        json!([
            summary(5, "2024-01-05T00:00:00Z"),
            summary(4, "2024-01-04T00:00:00Z"),
            summary(3, "2024-01-03T00:00:00Z"),
            summary(2, "2024-01-02T00:00:00Z"),
            summary(1, "2024-01-01T00:00:00Z"),
        ])
    }

    fn numbers(summaries: &[PullSummary]) -> Vec<u64> {
        summaries.iter().map(|s| s.number).collect()
    }

    fn basic_info(number: u64) -> Value {
        json!({
            "number": number,
            "title": format!("PR {number}"),
            "html_url": format!("https://github.com/o/r/pull/{number}"),
            "state": "open",
            "updated_at": "2024-01-05T00:00:00Z",
            "labels": [{"name": "nested"}]
        })
    }

    fn with_details(client: ScriptedClient, number: u64) -> ScriptedClient {
        client
            .respond(&format!("{PULLS}/{number}"), basic_info(number))
            .respond(&format!("/repos/o/r/issues/{number}/labels"), json!([{"name": "docs"}]))
            .respond(&format!("/repos/o/r/issues/{number}/comments"), json!([{"id": 1}]))
            .respond(&format!("{PULLS}/{number}/comments"), json!([]))
            .respond(&format!("{PULLS}/{number}/commits"), json!([{"sha": "abc"}]))
            .respond(
                &format!("{PULLS}/{number}/files"),
                json!([{"filename": "README.md", "patch": "+## Added\n"}]),
            )
    }

    #[tokio::test]
    async fn test_fetch_stops_at_watermark() {
        let client = ScriptedClient::new().respond(PULLS, descending_page());
        let collector = Collector::new(client, &config());
        let options = FetchOptions {
            since: Some("2024-01-03T00:00:00Z".parse().unwrap()),
            ..FetchOptions::default()
        };

        let result = collector.fetch_pull_requests(&options).await;
        assert_eq!(numbers(&result), vec![5, 4]);
        assert_eq!(collector.client().call_count(PULLS), 1);
    }

    #[tokio::test]
    async fn test_fetch_respects_limit() {
        let client = ScriptedClient::new().respond(PULLS, descending_page());
        let collector = Collector::new(client, &config());
        let options = FetchOptions {
            limit: Some(2),
            ..FetchOptions::default()
        };

        let result = collector.fetch_pull_requests(&options).await;
        assert_eq!(numbers(&result), vec![5, 4]);
        assert_eq!(collector.client().call_count(PULLS), 1);
    }

    #[tokio::test]
    async fn test_limit_applies_after_watermark_cutoff() {
        let client = ScriptedClient::new().respond(PULLS, descending_page());
        let collector = Collector::new(client, &config());
        let options = FetchOptions {
            limit: Some(1),
            since: Some("2024-01-02T00:00:00Z".parse().unwrap()),
            ..FetchOptions::default()
        };

        let result = collector.fetch_pull_requests(&options).await;
        assert_eq!(numbers(&result), vec![5]);
    }

    #[tokio::test]
    async fn test_fetch_pages_until_empty_and_sends_params() {
        let client = ScriptedClient::new()
            .respond(PULLS, json!([summary(9, "2024-02-02T00:00:00Z")]))
            .respond(PULLS, json!([summary(8, "2024-02-01T00:00:00Z")]))
            .respond(PULLS, json!([]));
        let collector = Collector::new(client, &config());
        let options = FetchOptions {
            state: StateFilter::Closed,
            ..FetchOptions::default()
        };

        let result = collector.fetch_pull_requests(&options).await;
        assert_eq!(numbers(&result), vec![9, 8]);

        let calls = collector.client().calls();
        assert_eq!(calls.len(), 3);
        let (_, params) = &calls[2];
        let param = |key: &str| params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
        assert_eq!(param("page"), Some("3"));
        assert_eq!(param("state"), Some("closed"));
        assert_eq!(param("sort"), Some("updated"));
        assert_eq!(param("direction"), Some("desc"));
        assert_eq!(param("per_page"), Some("100"));
    }

    #[tokio::test]
    async fn test_fetch_failure_returns_partial_results() {
        let client = ScriptedClient::new()
            .respond(PULLS, json!([summary(9, "2024-02-02T00:00:00Z")]))
            .fail(PULLS, 500);
        let collector = Collector::new(client, &config());

        let result = collector.fetch_pull_requests(&FetchOptions::default()).await;
        assert_eq!(numbers(&result), vec![9]);
    }

    #[tokio::test]
    async fn test_fetch_undecodable_page_stops() {
        let client = ScriptedClient::new().respond(PULLS, json!({"message": "weird"}));
        let collector = Collector::new(client, &config());
        assert!(collector.fetch_pull_requests(&FetchOptions::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_assemble_collects_all_sub_resources() {
        let client = with_details(ScriptedClient::new(), 7);
        let collector = Collector::new(client, &config());

        let record = collector
            .assemble(7, &DetailOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.number(), Some(7));
        assert_eq!(record.state(), Some(crate::pr::PrState::Open));
        assert_eq!(record.label_names(), vec!["docs", "nested"]);
        assert_eq!(record.comments.len(), 1);
        assert_eq!(record.commits.len(), 1);
        assert_eq!(record.files.len(), 1);
        let sections = record.section_info.unwrap();
        assert_eq!(sections[0].sections[0].title, "Added");
        assert_eq!(collector.client().calls().len(), 6);
    }

    #[tokio::test]
    async fn test_assemble_tolerates_sub_resource_failures() {
        let client = ScriptedClient::new()
            .respond(&format!("{PULLS}/7"), basic_info(7))
            .fail("/repos/o/r/issues/7/labels", 500)
            .respond("/repos/o/r/issues/7/comments", json!([{"id": 1}]))
            .fail(&format!("{PULLS}/7/comments"), 403)
            .respond(&format!("{PULLS}/7/commits"), json!({"not": "a list"}))
            .respond(&format!("{PULLS}/7/files"), json!([]));
        let collector = Collector::new(client, &config());

        let record = collector
            .assemble(7, &DetailOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert!(record.labels.is_empty());
        assert_eq!(record.comments.len(), 1);
        assert!(record.review_comments.is_empty());
        assert!(record.commits.is_empty());
        assert_eq!(record.section_info, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_assemble_skips_missing_pull_request() {
        let client = ScriptedClient::new().fail(&format!("{PULLS}/404"), 404);
        let collector = Collector::new(client, &config());
        let result = collector.assemble(404, &DetailOptions::default()).await.unwrap();
        assert!(result.is_none());
        assert_eq!(collector.client().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_assemble_null_basic_info() {
        let client = ScriptedClient::new().respond(&format!("{PULLS}/3"), Value::Null);
        let collector = Collector::new(client, &config());
        assert!(collector.assemble(3, &DetailOptions::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_assemble_propagates_basic_info_failure() {
        let client = ScriptedClient::new().fail(&format!("{PULLS}/3"), 401);
        let collector = Collector::new(client, &config());
        assert!(collector.assemble(3, &DetailOptions::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_assemble_respects_detail_options() {
        let client = ScriptedClient::new().respond(&format!("{PULLS}/3"), basic_info(3));
        let collector = Collector::new(client, &config());
        let include = DetailOptions::without(&[
            SubResource::Labels,
            SubResource::Comments,
            SubResource::ReviewComments,
            SubResource::Commits,
            SubResource::Files,
        ]);
        let record = collector.assemble(3, &include).await.unwrap().unwrap();
        assert!(record.section_info.is_none());
        assert_eq!(collector.client().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_saves_records_and_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new().respond(
            PULLS,
            json!([summary(7, "2024-01-05T00:00:00Z"), summary(8, "2024-01-04T00:00:00Z")]),
        );
        let client = with_details(client, 7).fail(&format!("{PULLS}/8"), 404);
        let collector = Collector::new(client, &config());

        let outcome = sync(&collector, FetchOptions::default(), &DetailOptions::default(), dir.path(), false)
            .await
            .unwrap();
        assert_eq!(outcome.updated.len(), 1);
        assert!(dir.path().join("7.json").exists());
        assert!(!dir.path().join("8.json").exists());

        let watermark = Watermark::load(dir.path()).unwrap().unwrap();
        assert_eq!(watermark.updated_count, 1);
        assert_eq!(watermark.last_updated_at, "2024-01-05T00:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[tokio::test]
    async fn test_sync_uses_existing_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let since: DateTime<Utc> = "2024-01-04T00:00:00Z".parse().unwrap();
        Watermark {
            last_updated_at: since,
            timestamp: since,
            updated_count: 3,
        }
        .save(dir.path())
        .unwrap();

        let client = ScriptedClient::new().respond(PULLS, descending_page());
        let client = with_details(client, 5);
        let collector = Collector::new(client, &config());

        let outcome = sync(&collector, FetchOptions::default(), &DetailOptions::default(), dir.path(), false)
            .await
            .unwrap();
        let numbers: Vec<_> = outcome.updated.iter().filter_map(PullRequestRecord::number).collect();
        assert_eq!(numbers, vec![5]);
    }

    #[tokio::test]
    async fn test_sync_without_updates_keeps_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new().respond(PULLS, json!([]));
        let collector = Collector::new(client, &config());

        let outcome = sync(&collector, FetchOptions::default(), &DetailOptions::default(), dir.path(), true)
            .await
            .unwrap();
        assert!(outcome.updated.is_empty());
        assert!(outcome.watermark.is_none());
        assert!(Watermark::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_resolve_since() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_since(dir.path(), false).is_none());

        std::fs::write(Watermark::path(dir.path()), "garbage").unwrap();
        assert!(resolve_since(dir.path(), false).is_none());

        let since: DateTime<Utc> = "2024-01-04T00:00:00Z".parse().unwrap();
        Watermark {
            last_updated_at: since,
            timestamp: since,
            updated_count: 1,
        }
        .save(dir.path())
        .unwrap();
        assert_eq!(resolve_since(dir.path(), false), Some(since));
        assert!(resolve_since(dir.path(), true).is_none());
    }
}
