pub mod diff;
pub mod types;

pub use types::{
    BasicInfo, FileSections, Heading, Label, PrState, PullRequestRecord, PullSummary,
};

#[cfg(test)]
pub mod fixtures;
