//! SQLite-backed catalog of lesson cards.
//!
//! The card table is owned by another system; this module only issues
//! read-only `SELECT`s against it. Table and column names come from
//! configuration, so they are validated as plain identifiers before being
//! spliced into SQL.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};

use super::{CatalogError, WorkCatalog, WorkItem};
use crate::utils::DEFAULT_CATALOG_PAGE_SIZE;

/// SQLite caps bound parameters per statement; stay well below it
const ID_CHUNK_SIZE: usize = 500;

/// Names of the table and columns holding card locators
#[derive(Debug, Clone)]
pub struct CatalogQuery {
    pub table: String,
    pub id_column: String,
    pub group_column: String,
    pub order_column: String,
    pub page_size: usize,
}

impl Default for CatalogQuery {
    fn default() -> Self {
        Self {
            table: "cards_structure".to_string(),
            id_column: "card_id".to_string(),
            group_column: "gz_id".to_string(),
            order_column: "card_order".to_string(),
            page_size: DEFAULT_CATALOG_PAGE_SIZE,
        }
    }
}

impl CatalogQuery {
    fn validate(&self) -> Result<(), CatalogError> {
        for name in [&self.table, &self.id_column, &self.group_column, &self.order_column] {
            if !is_identifier(name) {
                return Err(CatalogError::InvalidIdentifier(name.clone()));
            }
        }
        Ok(())
    }

    fn select_clause(&self) -> String {
        format!(
            "SELECT {id} AS id, CAST({group} AS TEXT) AS group_locator, \
             CAST({order} AS TEXT) AS order_in_group FROM {table} \
             WHERE {group} IS NOT NULL AND {order} IS NOT NULL",
            id = self.id_column,
            group = self.group_column,
            order = self.order_column,
            table = self.table,
        )
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, FromRow)]
struct CatalogRow {
    id: i64,
    group_locator: String,
    order_in_group: String,
}

impl From<CatalogRow> for WorkItem {
    fn from(row: CatalogRow) -> Self {
        WorkItem::new(row.id, row.group_locator, row.order_in_group)
    }
}

/// Read-only catalog over an existing SQLite database
#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
    query: CatalogQuery,
}

impl SqliteCatalog {
    /// Open the database at `path` read-only.
    pub async fn open(path: &Path, query: CatalogQuery) -> Result<Self, CatalogError> {
        query.validate()?;

        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;

        log::debug!("Opened catalog database {}", path.display());
        Ok(Self { pool, query })
    }

    /// Wrap an existing pool (tests build an in-memory database this way)
    pub fn from_pool(pool: SqlitePool, query: CatalogQuery) -> Result<Self, CatalogError> {
        query.validate()?;
        Ok(Self { pool, query })
    }
}

impl WorkCatalog for SqliteCatalog {
    async fn fetch_items(&self) -> Result<Vec<WorkItem>, CatalogError> {
        let sql = format!(
            "{} ORDER BY {} LIMIT ? OFFSET ?",
            self.query.select_clause(),
            self.query.id_column
        );
        let page_size = self.query.page_size.max(1);

        let mut items = Vec::new();
        let mut offset = 0usize;
        loop {
            let rows: Vec<CatalogRow> = sqlx::query_as(&sql)
                .bind(page_size as i64)
                .bind(offset as i64)
                .fetch_all(&self.pool)
                .await?;

            let fetched = rows.len();
            items.extend(rows.into_iter().map(WorkItem::from));
            if fetched < page_size {
                break;
            }
            offset += fetched;
        }

        log::debug!("Catalog returned {} eligible items", items.len());
        Ok(items)
    }

    async fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<WorkItem>, CatalogError> {
        let mut items = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(ID_CHUNK_SIZE) {
            let placeholders: Vec<&str> = chunk.iter().map(|_| "?").collect();
            let sql = format!(
                "{} AND {} IN ({})",
                self.query.select_clause(),
                self.query.id_column,
                placeholders.join(", ")
            );

            let mut query = sqlx::query_as::<_, CatalogRow>(&sql);
            for id in chunk {
                query = query.bind(*id);
            }

            let rows = query.fetch_all(&self.pool).await?;
            items.extend(rows.into_iter().map(WorkItem::from));
        }

        items.sort_by_key(|item| item.id);
        items.dedup_by_key(|item| item.id);
        Ok(items)
    }
}
