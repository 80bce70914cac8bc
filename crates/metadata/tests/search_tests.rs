//! Integration tests for search, grouped counts and the index view.

mod common;

use common::{TestMetadata, sample_file};
use r2index_core::config::SearchConfig;
use r2index_core::{FileCreate, FileFilter, FileRecord, FileUpdate, GroupField, Pagination, SearchQuery};
use r2index_metadata::{ErrorKind, FileRepo, SearchOutcome, SearchRepo, Session};
use sqlx::{Pool, Sqlite};

struct Fixture {
    a: FileRecord,
    b: FileRecord,
    c: FileRecord,
    d: FileRecord,
}

/// Four records with distinct, known `updated` stamps: d > c > b > a.
async fn seed(session: &Session<'_>, pool: &Pool<Sqlite>) -> Fixture {
    let a = session
        .create_file(&FileCreate {
            tags: vec!["stable".to_string(), "linux".to_string()],
            ..sample_file("/pkg/a", "a.zip", "1.0.0")
        })
        .await
        .expect("Create a failed");
    let b = session
        .create_file(&FileCreate {
            tags: vec!["linux".to_string()],
            ..sample_file("/pkg/a", "a.tar", "1.0.0")
        })
        .await
        .expect("Create b failed");
    let c = session
        .create_file(&FileCreate {
            category: "docs".to_string(),
            entity: "globex".to_string(),
            tags: vec!["stable".to_string()],
            ..sample_file("/docs", "manual.pdf", "3")
        })
        .await
        .expect("Create c failed");
    let c = session
        .update_file(
            &c.id,
            &FileUpdate {
                deprecated: Some(true),
                ..Default::default()
            },
        )
        .await
        .expect("Deprecate c failed");
    let d = session
        .create_file(&FileCreate {
            entity: "initech".to_string(),
            ..sample_file("/pkg/b", "b.zip", "1.0.0")
        })
        .await
        .expect("Create d failed");

    for (i, id) in [&a.id, &b.id, &c.id, &d.id].into_iter().enumerate() {
        sqlx::query("UPDATE files SET updated = ? WHERE id = ?")
            .bind(1_000 + i as i64)
            .bind(id)
            .execute(pool)
            .await
            .expect("Failed to pin updated");
    }

    Fixture { a, b, c, d }
}

fn ids(records: &[FileRecord]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

fn all() -> Pagination {
    Pagination::new(1000, 0)
}

#[tokio::test]
async fn test_duplicate_create_then_search_by_extension() {
    let metadata = TestMetadata::new().await.expect("Failed to create metadata");
    let session = metadata.store.open_session(None);

    let a = session
        .create_file(&sample_file("/pkg/a", "a.zip", "1.0.0"))
        .await
        .expect("Create failed");
    let err = session
        .create_file(&sample_file("/pkg/a", "a.zip", "1.0.0"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let filter = FileFilter {
        extension: Some("zip".to_string()),
        ..Default::default()
    };
    let page = session.search(&filter, all()).await.expect("Search failed");
    assert_eq!(page.total, 1);
    assert_eq!(page.records, vec![a]);
}

#[tokio::test]
async fn test_filters_are_conjunctive() {
    let metadata = TestMetadata::new().await.expect("Failed to create metadata");
    let session = metadata.store.open_session(None);
    let f = seed(&session, metadata.pool()).await;

    let filter = FileFilter {
        category: Some("software".to_string()),
        extension: Some("zip".to_string()),
        ..Default::default()
    };
    let page = session.search(&filter, all()).await.unwrap();
    assert_eq!(ids(&page.records), vec![f.d.id.as_str(), f.a.id.as_str()]);
    assert_eq!(page.total, 2);

    let filter = FileFilter {
        entity: Some("acme".to_string()),
        ..filter
    };
    let page = session.search(&filter, all()).await.unwrap();
    assert_eq!(ids(&page.records), vec![f.a.id.as_str()]);

    let filter = FileFilter {
        media_type: Some("application/pdf".to_string()),
        ..Default::default()
    };
    let page = session.search(&filter, all()).await.unwrap();
    assert_eq!(ids(&page.records), vec![f.c.id.as_str()]);
}

#[tokio::test]
async fn test_tag_filter_requires_every_tag() {
    let metadata = TestMetadata::new().await.expect("Failed to create metadata");
    let session = metadata.store.open_session(None);
    let f = seed(&session, metadata.pool()).await;

    let with_tags = |tags: &[&str]| FileFilter {
        tags: tags.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    };

    let page = session.search(&with_tags(&["stable"]), all()).await.unwrap();
    assert_eq!(ids(&page.records), vec![f.c.id.as_str(), f.a.id.as_str()]);

    let page = session
        .search(&with_tags(&["stable", "linux"]), all())
        .await
        .unwrap();
    assert_eq!(ids(&page.records), vec![f.a.id.as_str()]);
    assert_eq!(page.total, 1);
    assert_eq!(page.records[0].tags.len(), 2, "records carry all their tags");

    let page = session
        .search(&with_tags(&["linux", "missing"]), all())
        .await
        .unwrap();
    assert!(page.records.is_empty());
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn test_deprecated_filter() {
    let metadata = TestMetadata::new().await.expect("Failed to create metadata");
    let session = metadata.store.open_session(None);
    let f = seed(&session, metadata.pool()).await;

    let deprecated = FileFilter {
        deprecated: Some(true),
        ..Default::default()
    };
    let page = session.search(&deprecated, all()).await.unwrap();
    assert_eq!(ids(&page.records), vec![f.c.id.as_str()]);

    let current = FileFilter {
        deprecated: Some(false),
        ..Default::default()
    };
    let page = session.search(&current, all()).await.unwrap();
    assert_eq!(page.total, 3);
    assert!(page.records.iter().all(|r| !r.deprecated));
}

#[tokio::test]
async fn test_pagination_keeps_unpaginated_total() {
    let metadata = TestMetadata::new().await.expect("Failed to create metadata");
    let session = metadata.store.open_session(None);
    let f = seed(&session, metadata.pool()).await;
    let filter = FileFilter::default();

    let first = session
        .search(&filter, Pagination::new(2, 0))
        .await
        .unwrap();
    assert_eq!(first.total, 4);
    assert_eq!(ids(&first.records), vec![f.d.id.as_str(), f.c.id.as_str()]);

    let second = session
        .search(&filter, Pagination::new(2, 2))
        .await
        .unwrap();
    assert_eq!(second.total, 4);
    assert_eq!(ids(&second.records), vec![f.b.id.as_str(), f.a.id.as_str()]);

    let past_end = session
        .search(&filter, Pagination::new(2, 10))
        .await
        .unwrap();
    assert_eq!(past_end.total, 4);
    assert!(past_end.records.is_empty());
}

#[tokio::test]
async fn test_equal_timestamps_tie_break_on_id() {
    let metadata = TestMetadata::new().await.expect("Failed to create metadata");
    let session = metadata.store.open_session(None);
    seed(&session, metadata.pool()).await;

    sqlx::query("UPDATE files SET updated = 5000")
        .execute(metadata.pool())
        .await
        .unwrap();

    let page = session.search(&FileFilter::default(), all()).await.unwrap();
    let mut sorted = ids(&page.records);
    sorted.sort();
    assert_eq!(ids(&page.records), sorted);
}

#[tokio::test]
async fn test_grouped_counts_sum_to_total() {
    let metadata = TestMetadata::new().await.expect("Failed to create metadata");
    let session = metadata.store.open_session(None);
    seed(&session, metadata.pool()).await;

    let grouped = session
        .search_grouped(&FileFilter::default(), GroupField::Category)
        .await
        .unwrap();
    assert_eq!(grouped.group_by, GroupField::Category);
    assert_eq!(grouped.total, 4);
    let groups: Vec<(&str, u64)> = grouped
        .groups
        .iter()
        .map(|g| (g.value.as_str(), g.count))
        .collect();
    assert_eq!(groups, vec![("software", 3), ("docs", 1)]);
    assert_eq!(
        grouped.groups.iter().map(|g| g.count).sum::<u64>(),
        grouped.total
    );

    let linux = FileFilter {
        tags: ["linux".to_string()].into_iter().collect(),
        ..Default::default()
    };
    let grouped = session
        .search_grouped(&linux, GroupField::Extension)
        .await
        .unwrap();
    let groups: Vec<(&str, u64)> = grouped
        .groups
        .iter()
        .map(|g| (g.value.as_str(), g.count))
        .collect();
    assert_eq!(groups, vec![("tar", 1), ("zip", 1)]);
    assert_eq!(grouped.total, 2);
}

#[tokio::test]
async fn test_group_by_deprecated() {
    let metadata = TestMetadata::new().await.expect("Failed to create metadata");
    let session = metadata.store.open_session(None);
    seed(&session, metadata.pool()).await;

    let grouped = session
        .search_grouped(&FileFilter::default(), GroupField::Deprecated)
        .await
        .unwrap();
    let groups: Vec<(&str, u64)> = grouped
        .groups
        .iter()
        .map(|g| (g.value.as_str(), g.count))
        .collect();
    assert_eq!(groups, vec![("false", 3), ("true", 1)]);
}

#[tokio::test]
async fn test_query_rejects_group_field_outside_allow_list() {
    let metadata = TestMetadata::new().await.expect("Failed to create metadata");
    let session = metadata.store.open_session(None);
    seed(&session, metadata.pool()).await;

    for field in ["name", "remote_path", "category; DROP TABLE files"] {
        let query = SearchQuery {
            group_by: Some(field.to_string()),
            ..Default::default()
        };
        let err = session
            .query(&query, &SearchConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidGroupField, "{field}");
    }

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
        .fetch_one(metadata.pool())
        .await
        .unwrap();
    assert_eq!(count, 4);
}

#[tokio::test]
async fn test_query_dispatches_page_or_groups() {
    let metadata = TestMetadata::new().await.expect("Failed to create metadata");
    let session = metadata.store.open_session(None);
    let f = seed(&session, metadata.pool()).await;

    let query = SearchQuery {
        extension: Some("zip".to_string()),
        limit: Some("1".to_string()),
        ..Default::default()
    };
    match session.query(&query, &SearchConfig::default()).await.unwrap() {
        SearchOutcome::Page(page) => {
            assert_eq!(page.total, 2);
            assert_eq!(ids(&page.records), vec![f.d.id.as_str()]);
        }
        other => panic!("expected a page, got {other:?}"),
    }

    let query = SearchQuery {
        deprecated: Some("false".to_string()),
        tags: Some("linux, stable".to_string()),
        group_by: Some("entity".to_string()),
        ..Default::default()
    };
    match session.query(&query, &SearchConfig::default()).await.unwrap() {
        SearchOutcome::Grouped(grouped) => {
            assert_eq!(grouped.total, 1);
            assert_eq!(grouped.groups[0].value, "acme");
        }
        other => panic!("expected groups, got {other:?}"),
    }

    let query = SearchQuery {
        deprecated: Some("maybe".to_string()),
        ..Default::default()
    };
    let err = session
        .query(&query, &SearchConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_index_nests_by_category_and_entity() {
    let metadata = TestMetadata::new().await.expect("Failed to create metadata");
    let session = metadata.store.open_session(None);
    let f = seed(&session, metadata.pool()).await;

    let index = session.index(&FileFilter::default()).await.unwrap();
    assert_eq!(index.total, 4);
    assert_eq!(
        index.categories.keys().collect::<Vec<_>>(),
        vec!["docs", "software"]
    );
    let software = &index.categories["software"];
    assert_eq!(software.keys().collect::<Vec<_>>(), vec!["acme", "initech"]);
    assert_eq!(
        ids(&software["acme"]),
        vec![f.b.id.as_str(), f.a.id.as_str()]
    );
    assert_eq!(ids(&index.categories["docs"]["globex"]), vec![f.c.id.as_str()]);

    let filtered = session
        .index(&FileFilter {
            deprecated: Some(false),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(filtered.total, 3);
    assert!(!filtered.categories.contains_key("docs"));
}
