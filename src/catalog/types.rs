//! Work item types produced by the catalog resolver

use serde::{Deserialize, Serialize};
use url::Url;

/// One capturable lesson card
///
/// Immutable for the duration of a run. The target URL is derived from the
/// locator fields on demand and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: i64,
    pub group_locator: String,
    pub order_in_group: String,
}

impl WorkItem {
    #[must_use]
    pub fn new(id: i64, group_locator: impl Into<String>, order_in_group: impl Into<String>) -> Self {
        Self {
            id,
            group_locator: group_locator.into(),
            order_in_group: order_in_group.into(),
        }
    }

    /// Public lesson page for this card:
    /// `{base}/classroom/public-lesson/{group}/run/{order}/`
    #[must_use]
    pub fn target_url(&self, base_url: &str) -> String {
        format!(
            "{}/classroom/public-lesson/{}/run/{}/",
            base_url.trim_end_matches('/'),
            self.group_locator,
            self.order_in_group
        )
    }

    /// Rebuild an item from a previously recorded target URL.
    ///
    /// Used when the error log names an id the catalog no longer returns.
    /// The locators are the path segments around the `run` segment.
    #[must_use]
    pub fn from_target_url(id: i64, target_url: &str) -> Option<Self> {
        let url = Url::parse(target_url).ok()?;
        let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();

        let run_pos = segments.iter().rposition(|s| *s == "run")?;
        if run_pos == 0 || run_pos + 1 >= segments.len() {
            return None;
        }

        Some(Self::new(id, segments[run_pos - 1], segments[run_pos + 1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_url_follows_template() {
        let item = WorkItem::new(42, "g1", "3");
        assert_eq!(
            item.target_url("https://education.yandex.ru/"),
            "https://education.yandex.ru/classroom/public-lesson/g1/run/3/"
        );
    }

    #[test]
    fn from_target_url_recovers_locators() {
        let url = "https://education.yandex.ru/classroom/public-lesson/abc-123/run/7/";
        let item = WorkItem::from_target_url(9, url).unwrap();
        assert_eq!(item, WorkItem::new(9, "abc-123", "7"));
        assert_eq!(item.target_url("https://education.yandex.ru"), url);
    }

    #[test]
    fn from_target_url_rejects_unrelated_paths() {
        assert!(WorkItem::from_target_url(1, "https://example.com/run/").is_none());
        assert!(WorkItem::from_target_url(1, "https://example.com/a/b/c/").is_none());
        assert!(WorkItem::from_target_url(1, "not a url").is_none());
    }
}
