//! Work Catalog Resolver
//!
//! The catalog is the universe of capturable lesson cards. The pipeline only
//! ever reads from it: once per orchestrator iteration for the full listing,
//! and by id when retrying entries from the error log.

pub mod sqlite;
pub mod static_catalog;
pub mod types;

use std::future::Future;
use std::path::PathBuf;

pub use sqlite::{CatalogQuery, SqliteCatalog};
pub use static_catalog::StaticCatalog;
pub use types::WorkItem;

/// Errors raised while resolving the catalog. Always fatal for a run.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to read catalog file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed catalog line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("invalid catalog identifier '{0}'")]
    InvalidIdentifier(String),
}

/// Source of work items
///
/// Implementations must only return items whose locator fields are both
/// present; rows missing either locator are not capturable.
pub trait WorkCatalog: Send + Sync + 'static {
    /// All eligible items, ordered by id
    fn fetch_items(&self) -> impl Future<Output = Result<Vec<WorkItem>, CatalogError>> + Send;

    /// Eligible items among `ids`, ordered by id. Unknown ids are omitted.
    fn fetch_by_ids(
        &self,
        ids: &[i64],
    ) -> impl Future<Output = Result<Vec<WorkItem>, CatalogError>> + Send;
}

/// Catalog chosen at runtime by the binary
pub enum CatalogSource {
    Sqlite(SqliteCatalog),
    Static(StaticCatalog),
}

impl WorkCatalog for CatalogSource {
    async fn fetch_items(&self) -> Result<Vec<WorkItem>, CatalogError> {
        match self {
            Self::Sqlite(catalog) => catalog.fetch_items().await,
            Self::Static(catalog) => catalog.fetch_items().await,
        }
    }

    async fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<WorkItem>, CatalogError> {
        match self {
            Self::Sqlite(catalog) => catalog.fetch_by_ids(ids).await,
            Self::Static(catalog) => catalog.fetch_by_ids(ids).await,
        }
    }
}
