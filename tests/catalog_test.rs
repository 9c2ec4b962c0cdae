//! Catalog resolution from SQLite and from text files

use std::path::Path;

use lesson_capture::catalog::CatalogError;
use lesson_capture::{CatalogQuery, SqliteCatalog, StaticCatalog, WorkCatalog, WorkItem};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tempfile::TempDir;

async fn seeded_pool(path: &Path) -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    sqlx::query(
        "CREATE TABLE cards_structure (card_id INTEGER PRIMARY KEY, gz_id TEXT, card_order INTEGER)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let rows: &[(i64, Option<&str>, Option<i64>)] = &[
        (5, Some("g-b"), Some(2)),
        (1, Some("g-a"), Some(1)),
        (3, None, Some(4)),
        (2, Some("g-a"), Some(2)),
        (7, Some("g-c"), None),
        (4, Some("g-b"), Some(1)),
        (6, Some("g-c"), Some(9)),
    ];
    for (id, group, order) in rows {
        sqlx::query("INSERT INTO cards_structure (card_id, gz_id, card_order) VALUES (?, ?, ?)")
            .bind(*id)
            .bind(*group)
            .bind(*order)
            .execute(&pool)
            .await
            .unwrap();
    }
    pool
}

#[tokio::test]
async fn test_sqlite_catalog_pages_through_eligible_rows() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("cards.sqlite");
    seeded_pool(&db).await.close().await;

    let query = CatalogQuery {
        page_size: 2,
        ..CatalogQuery::default()
    };
    let catalog = SqliteCatalog::open(&db, query).await.unwrap();
    let items = catalog.fetch_items().await.unwrap();

    let ids: Vec<i64> = items.iter().map(|item| item.id).collect();
    assert_eq!(ids, vec![1, 2, 4, 5, 6]);
    assert_eq!(items[0], WorkItem::new(1, "g-a", "1"));
    assert_eq!(
        items[4].target_url("https://education.yandex.ru"),
        "https://education.yandex.ru/classroom/public-lesson/g-c/run/9/"
    );
}

#[tokio::test]
async fn test_sqlite_catalog_fetch_by_ids_skips_ineligible() {
    let dir = TempDir::new().unwrap();
    let pool = seeded_pool(&dir.path().join("cards.sqlite")).await;
    let catalog = SqliteCatalog::from_pool(pool, CatalogQuery::default()).unwrap();

    let items = catalog.fetch_by_ids(&[6, 3, 1, 6, 42]).await.unwrap();
    let ids: Vec<i64> = items.iter().map(|item| item.id).collect();
    assert_eq!(ids, vec![1, 6]);

    assert!(catalog.fetch_by_ids(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sqlite_catalog_rejects_unsafe_identifiers() {
    let dir = TempDir::new().unwrap();
    let pool = seeded_pool(&dir.path().join("cards.sqlite")).await;
    let query = CatalogQuery {
        table: "cards; DROP TABLE cards_structure".to_string(),
        ..CatalogQuery::default()
    };

    let result = SqliteCatalog::from_pool(pool, query);
    assert!(matches!(result, Err(CatalogError::InvalidIdentifier(_))));
}

#[tokio::test]
async fn test_static_catalog_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cards.csv");
    std::fs::write(
        &path,
        "# id,group,order\n3,g-x,2\n\n1,g-y,1\n3,g-x,2\n",
    )
    .unwrap();

    let catalog = StaticCatalog::from_file(&path).await.unwrap();
    let ids: Vec<i64> = catalog
        .fetch_items()
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.id)
        .collect();
    assert_eq!(ids, vec![1, 3]);

    let picked = catalog.fetch_by_ids(&[3]).await.unwrap();
    assert_eq!(picked, vec![WorkItem::new(3, "g-x", "2")]);
}

#[tokio::test]
async fn test_static_catalog_reports_bad_line() {
    let err = StaticCatalog::parse("1,g,1\nnot-an-id,g,2\n").unwrap_err();
    assert!(matches!(err, CatalogError::Parse { line: 2, .. }), "{err:?}");
}

#[tokio::test]
async fn test_missing_catalog_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let result = StaticCatalog::from_file(&dir.path().join("absent.csv")).await;
    assert!(matches!(result, Err(CatalogError::Io { .. })));
}
