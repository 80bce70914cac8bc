//! Integration tests for bookmark-driven read routing.

mod common;

use common::{ReplicatedMetadata, TestMetadata, sample_file};
use r2index_core::{Bookmark, FileFilter, Pagination};
use r2index_metadata::{Consistency, ErrorKind, FileRepo, MetadataSession, SearchRepo, TagRepo};

#[tokio::test]
async fn test_empty_store_session_has_no_bookmark() {
    let metadata = TestMetadata::new().await.expect("Failed to create metadata");
    let session = metadata.store.open_session(None);

    let page = session
        .search(&FileFilter::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);
    assert_eq!(session.bookmark(), None);
}

#[tokio::test]
async fn test_each_write_advances_the_bookmark() {
    let metadata = TestMetadata::new().await.expect("Failed to create metadata");
    let session = metadata.store.open_session(None);

    let file = session
        .create_file(&sample_file("/pkg/a", "a.zip", "1.0.0"))
        .await
        .unwrap();
    let first = session.bookmark().expect("write should yield a bookmark");

    session
        .add_tags(&file.id, &["stable".to_string()])
        .await
        .unwrap();
    let second = session.bookmark().expect("write should yield a bookmark");
    assert!(second > first);

    // A failed write changes nothing and does not move the checkpoint.
    let err = session
        .create_file(&sample_file("/pkg/a", "a.zip", "1.0.0"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(session.bookmark(), Some(second));
}

#[tokio::test]
async fn test_bookmark_gives_read_your_writes_over_lagging_replica() {
    let metadata = ReplicatedMetadata::new()
        .await
        .expect("Failed to create replicated metadata");

    let writer = metadata.store.open_session(None);
    let file = writer
        .create_file(&sample_file("/pkg/a", "a.zip", "1.0.0"))
        .await
        .unwrap();
    let token = writer.bookmark().expect("write should yield a bookmark").to_string();

    let reader = metadata.store.open_session(Some(&token));
    assert!(matches!(reader.consistency(), Consistency::AtLeast(_)));
    let fetched = reader.get_file(&file.id).await.expect("write must be visible");
    assert_eq!(fetched, file);
    assert_eq!(reader.bookmark().map(|b| b.to_string()), Some(token));

    let page = reader
        .search(&FileFilter::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn test_same_session_reads_its_own_write() {
    let metadata = ReplicatedMetadata::new()
        .await
        .expect("Failed to create replicated metadata");
    let session = metadata.store.open_session(None);

    let file = session
        .create_file(&sample_file("/pkg/a", "a.zip", "1.0.0"))
        .await
        .unwrap();
    let fetched = session.get_file(&file.id).await.expect("write must be visible");
    assert_eq!(fetched.id, file.id);
}

#[tokio::test]
async fn test_unconstrained_session_may_read_stale_replica() {
    let metadata = ReplicatedMetadata::new()
        .await
        .expect("Failed to create replicated metadata");

    let writer = metadata.store.open_session(None);
    let file = writer
        .create_file(&sample_file("/pkg/a", "a.zip", "1.0.0"))
        .await
        .unwrap();

    let reader = metadata.store.open_session(None);
    assert_eq!(reader.consistency(), Consistency::Unconstrained);
    let err = reader.get_file(&file.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound, "replica has not seen the write");
    assert_eq!(reader.bookmark(), None);
}

#[tokio::test]
async fn test_invalid_bookmark_starts_unconstrained() {
    let metadata = ReplicatedMetadata::new()
        .await
        .expect("Failed to create replicated metadata");

    let writer = metadata.store.open_session(None);
    let file = writer
        .create_file(&sample_file("/pkg/a", "a.zip", "1.0.0"))
        .await
        .unwrap();

    let reader = metadata.store.open_session(Some("not-a-bookmark"));
    assert_eq!(reader.consistency(), Consistency::Unconstrained);
    assert!(reader.get_file(&file.id).await.is_err());
}

#[tokio::test]
async fn test_primary_consistency_reads_primary_first() {
    let metadata = ReplicatedMetadata::new()
        .await
        .expect("Failed to create replicated metadata");

    let writer = metadata.store.open_session(None);
    let file = writer
        .create_file(&sample_file("/pkg/a", "a.zip", "1.0.0"))
        .await
        .unwrap();

    let reader = metadata.store.open_session_with(Consistency::Primary);
    reader.get_file(&file.id).await.expect("primary has the write");
    assert_eq!(reader.bookmark(), writer.bookmark());

    // Reads stay monotonic: the stale replica is skipped from now on.
    reader
        .get_file(&file.id)
        .await
        .expect("later reads must not go backwards");
}

#[tokio::test]
async fn test_bookmark_ahead_of_every_node_falls_back_to_primary() {
    let metadata = ReplicatedMetadata::new()
        .await
        .expect("Failed to create replicated metadata");
    let writer = metadata.store.open_session(None);
    let file = writer
        .create_file(&sample_file("/pkg/a", "a.zip", "1.0.0"))
        .await
        .unwrap();

    let future = Bookmark::from_seq(1_000).to_string();
    let reader = metadata.store.open_session(Some(&future));
    let fetched = reader.get_file(&file.id).await.expect("primary serves the read");
    assert_eq!(fetched.id, file.id);
    assert_eq!(reader.bookmark(), Some(Bookmark::from_seq(1_000)));
}

#[tokio::test]
async fn test_fresh_replica_serves_unconstrained_reads() {
    let seed = [sample_file("/pkg/a", "a.zip", "1.0.0")];
    let metadata = ReplicatedMetadata::seeded(&seed)
        .await
        .expect("Failed to create replicated metadata");

    let lag = metadata.store.replica_lag().await.unwrap();
    assert_eq!(lag.len(), 1);
    assert_eq!(lag[0].lag, 0);

    let reader = metadata.store.open_session(None);
    let page = reader
        .search(&FileFilter::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(reader.bookmark(), Some(Bookmark::from_seq(1)));

    let writer = metadata.store.open_session(None);
    writer
        .create_file(&sample_file("/pkg/a", "a.zip", "2.0.0"))
        .await
        .unwrap();
    let lag = metadata.store.replica_lag().await.unwrap();
    assert_eq!(lag[0].seq, 1);
    assert_eq!(lag[0].lag, 1);
}

#[tokio::test]
async fn test_snapshot_refuses_existing_target() {
    let metadata = ReplicatedMetadata::new()
        .await
        .expect("Failed to create replicated metadata");

    assert!(metadata.replica_path.exists());
    let err = metadata
        .store
        .snapshot_into(&metadata.replica_path)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already exists"));
}

#[tokio::test]
async fn test_sessions_usable_as_trait_objects() {
    let metadata = TestMetadata::new().await.expect("Failed to create metadata");
    let session = metadata.store.open_session(None);
    let dynamic: &dyn MetadataSession = &session;

    let file = dynamic
        .create_file(&sample_file("/pkg/a", "a.zip", "1.0.0"))
        .await
        .unwrap();
    assert!(dynamic.get_tags(&file.id).await.unwrap().is_empty());
    assert_eq!(MetadataSession::bookmark(dynamic), Some(Bookmark::from_seq(1)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reads_stay_monotonic_across_sessions() {
    // The replica stops at one record while the primary keeps taking writes.
    let seed = [sample_file("/pkg/a", "a.zip", "0")];
    let metadata = ReplicatedMetadata::seeded(&seed)
        .await
        .expect("Failed to create replicated metadata");

    let writes = async {
        let writer = metadata.store.open_session(None);
        for version in 1..=20 {
            writer
                .create_file(&sample_file("/pkg/a", "a.zip", &version.to_string()))
                .await
                .unwrap();
            tokio::task::yield_now().await;
        }
    };

    let reads = async {
        let mut token: Option<String> = None;
        let mut last_total = 0;
        for _ in 0..40 {
            let session = match &token {
                Some(token) => metadata.store.open_session(Some(token)),
                None => metadata.store.open_session_with(Consistency::Primary),
            };
            let page = session
                .search(&FileFilter::default(), Pagination::new(1, 0))
                .await
                .unwrap();
            let bookmark = session.bookmark().expect("read should yield a bookmark");

            // Every commit here is one create, so a snapshot at seq N holds N records.
            assert_eq!(page.total, bookmark.seq(), "bookmark must cover what was read");
            assert!(page.total >= last_total, "a later session saw fewer records");
            last_total = page.total;
            token = Some(bookmark.to_string());
            tokio::task::yield_now().await;
        }
        last_total
    };

    let ((), last_total) = tokio::join!(writes, reads);
    assert!(last_total >= 1);

    let session = metadata.store.open_session_with(Consistency::Primary);
    let page = session
        .search(&FileFilter::default(), Pagination::new(1, 0))
        .await
        .unwrap();
    assert_eq!(page.total, 21);
}
