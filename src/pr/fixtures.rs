//! Record builders shared by the unit tests.

use serde_json::{json, Map};

use super::types::{BasicInfo, ChangedFile, Label, PrState, PullRequestRecord};

pub fn markdown_file(filename: &str, patch: &str) -> ChangedFile {
    ChangedFile {
        filename: filename.to_string(),
        patch: Some(patch.to_string()),
        extra: Map::new(),
    }
}

/// A minimal record with top-level labels.
pub fn record(number: u64, state: PrState, labels: &[&str]) -> PullRequestRecord {
    let mut record = PullRequestRecord::from_basic_info(BasicInfo {
        number: Some(number),
        title: Some(format!("PR {number}")),
        html_url: Some(format!("https://github.com/o/r/pull/{number}")),
        state: Some(state),
        ..BasicInfo::default()
    });
    record.labels = labels.iter().map(|name| Label::named(name)).collect();
    record
}

/// A fully populated record shaped like a real collection result.
pub fn sample_record(number: u64) -> PullRequestRecord {
    let mut record = PullRequestRecord::from_basic_info(BasicInfo {
        number: Some(number),
        title: Some("テスト用PR".to_string()),
        html_url: Some(format!("https://github.com/o/r/pull/{number}")),
        state: Some(PrState::Open),
        updated_at: Some("2023-01-02T00:00:00Z".parse().unwrap()),
        labels: vec![Label::named("test-label")],
        extra: Map::from_iter([("draft".to_string(), json!(false))]),
    });
    record.labels = vec![Label::named("test-label")];
    record.comments = vec![json!({"id": 1, "body": "テストコメントです。"})];
    record.commits = vec![json!({"sha": "abc123"})];
    record.files = vec![markdown_file("test.md", "+## 新しいセクション\n")];
    record
}
