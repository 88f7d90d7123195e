//! Convert a legacy single-file PR dump (a JSON array of records) into the
//! per-PR layout, then build the indexes next to it.

use std::path::Path;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::index::{self, IndexError, IndexSummary};
use crate::store::{self, StoreError};

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("Failed to load legacy PR data: {0}")]
    Load(#[from] StoreError),

    #[error("Failed to build indexes: {0}")]
    Index(#[from] IndexError),

    #[error("{0} contains no PR records")]
    Empty(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationSummary {
    pub loaded: usize,
    pub saved: usize,
    pub indexes: IndexSummary,
}

#[instrument(skip_all, fields(input = %input.display(), output = %output_dir.display()))]
pub fn migrate(input: &Path, output_dir: &Path) -> Result<MigrationSummary, MigrateError> {
    let records = store::load_corpus(input)?;
    if records.is_empty() {
        return Err(MigrateError::Empty(input.display().to_string()));
    }

    let mut saved = 0;
    for record in &records {
        match store::save(record, output_dir) {
            Ok(_) => saved += 1,
            Err(e) => warn!(number = ?record.number(), error = %e, "skipping PR during migration"),
        }
    }
    info!(saved, loaded = records.len(), "migrated PR records");

    let indexes = index::write_indexes(&records, &output_dir.join("indexes"))?;
    Ok(MigrationSummary {
        loaded: records.len(),
        saved,
        indexes,
    })
}
