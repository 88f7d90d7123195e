use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Open/closed state of a pull request as reported by the GitHub API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrState::Open => write!(f, "open"),
            PrState::Closed => write!(f, "closed"),
        }
    }
}

/// One entry of the paginated pull request listing.
/// Only the fields the fetcher needs are typed; the rest is kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullSummary {
    pub number: u64,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A label attached to a pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
impl Label {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            extra: Map::new(),
        }
    }
}

/// The raw pull request object from `GET /pulls/{number}`.
/// Typed accessors cover what indexing and reporting read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PrState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A changed file from `GET /pulls/{number}/files`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedFile {
    #[serde(default)]
    pub filename: String,
    /// Unified diff text; GitHub omits it for binary or very large files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A markdown heading introduced by an added diff line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// Number of leading `#` characters (1..=6)
    pub level: u8,
    pub title: String,
}

/// Headings extracted from one markdown file of a pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSections {
    pub filename: String,
    pub sections: Vec<Heading>,
}

/// Everything collected for one pull request; persisted as `<number>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    pub basic_info: BasicInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PrState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub comments: Vec<Value>,
    #[serde(default)]
    pub review_comments: Vec<Value>,
    #[serde(default)]
    pub commits: Vec<Value>,
    #[serde(default)]
    pub files: Vec<ChangedFile>,
    /// Headings pre-computed at collection time. Older records lack it or
    /// carry it in another shape; either way it reads as None.
    #[serde(
        default,
        deserialize_with = "lenient_section_info",
        skip_serializing_if = "Option::is_none"
    )]
    pub section_info: Option<Vec<FileSections>>,
}

fn lenient_section_info<'de, D>(deserializer: D) -> Result<Option<Vec<FileSections>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| serde_json::from_value(value).ok()))
}

impl PullRequestRecord {
    /// Start a record from the basic info, with every sub-resource empty.
    pub fn from_basic_info(basic_info: BasicInfo) -> Self {
        Self {
            state: basic_info.state,
            updated_at: basic_info.updated_at,
            basic_info,
            labels: Vec::new(),
            comments: Vec::new(),
            review_comments: Vec::new(),
            commits: Vec::new(),
            files: Vec::new(),
            section_info: None,
        }
    }

    pub fn number(&self) -> Option<u64> {
        self.basic_info.number
    }

    pub fn title(&self) -> &str {
        self.basic_info.title.as_deref().unwrap_or("Untitled")
    }

    pub fn html_url(&self) -> &str {
        self.basic_info.html_url.as_deref().unwrap_or("#")
    }

    /// Top-level state, falling back to the one inside `basic_info`.
    pub fn state(&self) -> Option<PrState> {
        self.state.or(self.basic_info.state)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.basic_info.updated_at)
    }

    /// Label names from the top-level `labels` followed by those nested in
    /// `basic_info`, first occurrence wins.
    pub fn label_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for label in self.labels.iter().chain(&self.basic_info.labels) {
            if let Some(name) = label.name.as_deref().filter(|n| !n.is_empty()) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}
