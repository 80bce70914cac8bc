//! Causally consistent sessions over the replicated store.
//!
//! A session is scoped to one logical operation of one client. It starts from
//! the client's bookmark (if any), routes reads to any node that is at least
//! as fresh as everything the session has already observed, sends writes to
//! the primary, and finally exports the bookmark the client should present
//! next time.
//!
//! Freshness is tracked as a high-water mark of commit sequences:
//! - it starts at the bookmark's sequence (or 0 when unconstrained)
//! - every read raises it to the sequence its snapshot was taken at
//! - every write raises it to the sequence the write committed at
//!
//! Because a node's sequence only grows, routing reads to nodes at or above
//! the mark gives read-your-writes and monotonic reads within the session.

use crate::error::MetadataResult;
use crate::repos::{FileRepo, SearchRepo, TagRepo};
use crate::store::{Node, SqliteStore};
use r2index_core::Bookmark;
use sqlx::{Sqlite, Transaction};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// How fresh a session's reads must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    /// Any replica may serve reads, however stale.
    Unconstrained,
    /// The first read is served by the primary.
    Primary,
    /// Every read must observe at least this checkpoint.
    AtLeast(Bookmark),
}

impl Consistency {
    /// Derive the requirement from a client-presented token.
    ///
    /// A missing or unparseable token starts an unconstrained session.
    pub fn from_token(token: Option<&str>) -> Self {
        let Some(raw) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            return Self::Unconstrained;
        };
        match raw.parse::<Bookmark>() {
            Ok(bookmark) => {
                tracing::debug!(%bookmark, "Session constrained by bookmark");
                Self::AtLeast(bookmark)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unparseable bookmark, session starts unconstrained");
                Self::Unconstrained
            }
        }
    }
}

/// A short-lived, causally consistent view of the store.
pub struct Session<'a> {
    store: &'a SqliteStore,
    consistency: Consistency,
    observed: AtomicU64,
    first_read_done: AtomicBool,
}

impl<'a> Session<'a> {
    pub(crate) fn new(store: &'a SqliteStore, consistency: Consistency) -> Self {
        let observed = match consistency {
            Consistency::AtLeast(bookmark) => bookmark.seq(),
            Consistency::Unconstrained | Consistency::Primary => 0,
        };
        Self {
            store,
            consistency,
            observed: AtomicU64::new(observed),
            first_read_done: AtomicBool::new(false),
        }
    }

    pub fn consistency(&self) -> Consistency {
        self.consistency
    }

    /// The checkpoint to hand back to the client, if the session observed one.
    pub fn bookmark(&self) -> Option<Bookmark> {
        let seq = self.observed.load(Ordering::Acquire);
        (seq > 0).then(|| Bookmark::from_seq(seq))
    }

    fn observe(&self, seq: u64) {
        self.observed.fetch_max(seq, Ordering::AcqRel);
    }

    /// Open a read transaction on a node fresh enough for this session.
    ///
    /// The node's sequence is read inside the returned transaction, so the
    /// checkpoint recorded here covers everything the caller reads from it.
    pub(crate) async fn begin_read(&self) -> MetadataResult<Transaction<'static, Sqlite>> {
        let required = self.observed.load(Ordering::Acquire);
        let first_read = !self.first_read_done.swap(true, Ordering::AcqRel);
        let primary_first = first_read && self.consistency == Consistency::Primary;

        if !primary_first {
            for node in self.store.replicas_in_rotation() {
                let (tx, seq) = match node.begin_snapshot().await {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        tracing::warn!(node = %node.name, error = %e, "Replica unavailable, skipping");
                        continue;
                    }
                };
                if seq >= required {
                    tracing::debug!(node = %node.name, seq, required, "Read routed to replica");
                    self.observe(seq);
                    return Ok(tx);
                }
                tracing::debug!(node = %node.name, seq, required, "Replica behind session, skipping");
            }
        }

        let primary: &Node = self.store.primary();
        let (tx, seq) = primary.begin_snapshot().await?;
        if seq < required {
            // Bookmark from elsewhere (or a rolled-back primary); the primary
            // is still the freshest state available.
            tracing::warn!(seq, required, "Bookmark is ahead of the primary");
        }
        tracing::debug!(node = %primary.name, seq, required, "Read routed to primary");
        self.observe(seq);
        Ok(tx)
    }

    /// Start a write transaction on the primary.
    ///
    /// `BEGIN IMMEDIATE` takes the write lock up front, so concurrent writers
    /// wait on the busy timeout instead of failing a lock upgrade.
    pub(crate) async fn begin_write(&self) -> MetadataResult<Transaction<'static, Sqlite>> {
        Ok(self.store.primary().pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Advance the commit sequence inside `tx`, commit, and record the new
    /// checkpoint on the session.
    pub(crate) async fn commit_write(&self, mut tx: Transaction<'static, Sqlite>) -> MetadataResult<u64> {
        let seq: i64 =
            sqlx::query_scalar("UPDATE commit_log SET seq = seq + 1 WHERE id = 1 RETURNING seq")
                .fetch_one(&mut *tx)
                .await?;
        tx.commit().await?;

        let seq = u64::try_from(seq).unwrap_or(0);
        self.observe(seq);
        Ok(seq)
    }
}

/// Every repository a session serves, plus its exported bookmark.
pub trait MetadataSession: FileRepo + TagRepo + SearchRepo {
    /// Checkpoint to hand back to the client after the operation.
    fn bookmark(&self) -> Option<Bookmark>;
}

impl MetadataSession for Session<'_> {
    fn bookmark(&self) -> Option<Bookmark> {
        Session::bookmark(self)
    }
}
