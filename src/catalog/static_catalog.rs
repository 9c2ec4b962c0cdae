//! In-memory catalog, optionally loaded from a plain text file.
//!
//! File format: one `id,group,order` triple per line. Blank lines and lines
//! starting with `#` are ignored.

use std::path::Path;

use super::{CatalogError, WorkCatalog, WorkItem};

#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    items: Vec<WorkItem>,
}

impl StaticCatalog {
    /// Build from items; rows with an empty locator are dropped.
    #[must_use]
    pub fn new(items: Vec<WorkItem>) -> Self {
        let mut items: Vec<WorkItem> = items
            .into_iter()
            .filter(|item| !item.group_locator.is_empty() && !item.order_in_group.is_empty())
            .collect();
        items.sort_by_key(|item| item.id);
        items.dedup_by_key(|item| item.id);
        Self { items }
    }

    pub async fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CatalogError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, CatalogError> {
        let mut items = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.splitn(3, ',').map(str::trim);
            let (Some(id), Some(group), Some(order)) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(CatalogError::Parse {
                    line: index + 1,
                    message: "expected id,group,order".to_string(),
                });
            };

            let id = id.parse::<i64>().map_err(|e| CatalogError::Parse {
                line: index + 1,
                message: format!("invalid id '{id}': {e}"),
            })?;
            items.push(WorkItem::new(id, group, order));
        }

        Ok(Self::new(items))
    }

    #[must_use]
    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }
}

impl WorkCatalog for StaticCatalog {
    async fn fetch_items(&self) -> Result<Vec<WorkItem>, CatalogError> {
        Ok(self.items.clone())
    }

    async fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<WorkItem>, CatalogError> {
        Ok(self
            .items
            .iter()
            .filter(|item| ids.contains(&item.id))
            .cloned()
            .collect())
    }
}
