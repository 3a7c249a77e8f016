//! Natural-key upsert of fetched candidates.
//!
//! A pass runs inside one store transaction. Candidates are looked up by url:
//! unknown urls are inserted with defaults, known ones receive a
//! prefer-new-if-present merge. The resulting events are only handed out
//! once the transaction has committed, so subscribers never see a change
//! that was rolled back.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use newswire_core::{Candidate, ChangeEvent, NewRecord, Record, RecordPatch, TaskSummary};
use newswire_store::{RecordStore, RecordTx, StoreError};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("url '{0}' conflicted on insert but is not visible for update")]
    Vanished(String),
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// One `Created` or `Updated` per accepted candidate, in fetch order.
    pub changes: Vec<ChangeEvent>,
    pub summary: TaskSummary,
}

impl Reconciliation {
    /// Result of a pass that changed nothing.
    pub fn empty() -> Self {
        Self {
            changes: Vec::new(),
            summary: TaskSummary {
                timestamp: Utc::now(),
                count: 0,
            },
        }
    }

    /// The changes followed by exactly one `TaskCompleted`.
    pub fn events(&self) -> Vec<ChangeEvent> {
        let mut events = Vec::with_capacity(self.changes.len() + 1);
        events.extend(self.changes.iter().cloned());
        events.push(ChangeEvent::TaskCompleted(self.summary));
        events
    }
}

pub struct Reconciler {
    store: Arc<dyn RecordStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Merge `candidates` into the store.
    ///
    /// Records missing from the batch are left alone. On error nothing is
    /// committed and the whole batch can be retried.
    pub async fn reconcile(&self, candidates: &[Candidate]) -> Result<Reconciliation, ReconcileError> {
        let mut tx = self.store.begin().await?;
        let mut changes = Vec::with_capacity(candidates.len());
        let mut skipped = 0usize;

        for candidate in candidates {
            let Some(url) = candidate.natural_key() else {
                skipped += 1;
                continue;
            };
            if let Err(e) = candidate.validate() {
                warn!(error = %e, "dropping malformed candidate");
                skipped += 1;
                continue;
            }
            let change = match tx.find_by_url(url).await? {
                Some(existing) => ChangeEvent::Updated(merge(tx.as_mut(), &existing, candidate).await?),
                None => upsert(tx.as_mut(), url, candidate).await?,
            };
            changes.push(change);
        }

        tx.commit().await?;

        let summary = TaskSummary {
            timestamp: Utc::now(),
            count: changes.len() as u64,
        };
        info!(
            count = summary.count,
            created = changes.iter().filter(|c| matches!(c, ChangeEvent::Created(_))).count(),
            skipped,
            "reconciliation committed"
        );
        Ok(Reconciliation { changes, summary })
    }
}

async fn merge(
    tx: &mut dyn RecordTx,
    existing: &Record,
    candidate: &Candidate,
) -> Result<Record, ReconcileError> {
    let patch = RecordPatch::prefer_present(candidate);
    Ok(tx.update_fields(existing.id, patch).await?)
}

/// Insert, or fall back to the merge path if a concurrent writer claimed the
/// url first.
async fn upsert(
    tx: &mut dyn RecordTx,
    url: &str,
    candidate: &Candidate,
) -> Result<ChangeEvent, ReconcileError> {
    let Some(new) = NewRecord::from_candidate(candidate) else {
        return Err(ReconcileError::Vanished(url.to_string()));
    };
    match tx.insert(new).await {
        Ok(record) => Ok(ChangeEvent::Created(record)),
        Err(StoreError::Conflict(_)) => {
            debug!(url, "insert conflicted, merging into existing record");
            let existing = tx
                .find_by_url(url)
                .await?
                .ok_or_else(|| ReconcileError::Vanished(url.to_string()))?;
            Ok(ChangeEvent::Updated(merge(tx, &existing, candidate).await?))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newswire_store::MemoryStore;

    fn reconciler() -> (Reconciler, MemoryStore) {
        let store = MemoryStore::new();
        (Reconciler::new(Arc::new(store.clone())), store)
    }

    #[tokio::test]
    async fn test_new_urls_are_created_with_defaults() {
        let (reconciler, store) = reconciler();
        let candidate = Candidate {
            url: Some("u1".into()),
            ..Candidate::default()
        };

        let result = reconciler.reconcile(&[candidate]).await.unwrap();
        assert_eq!(result.summary.count, 1);
        match &result.changes[0] {
            ChangeEvent::Created(record) => assert_eq!(record.title, "Untitled"),
            other => panic!("expected created, got {other:?}"),
        }
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_prefer_new_if_present_merge() {
        let (reconciler, store) = reconciler();
        let first = Candidate {
            comments: Some(5),
            ..Candidate::new("u1", "A")
        };
        reconciler.reconcile(&[first]).await.unwrap();

        let second = Candidate {
            comments: Some(7),
            ..Candidate::new("u1", "")
        };
        let result = reconciler.reconcile(&[second]).await.unwrap();
        match &result.changes[0] {
            ChangeEvent::Updated(record) => {
                assert_eq!(record.title, "A");
                assert_eq!(record.comments, Some(7));
            }
            other => panic!("expected updated, got {other:?}"),
        }
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let (reconciler, store) = reconciler();
        let batch = vec![Candidate::new("u1", "A"), Candidate::new("u2", "B")];

        reconciler.reconcile(&batch).await.unwrap();
        let before = store.list(10, 0).await.unwrap();
        let again = reconciler.reconcile(&batch).await.unwrap();
        let after = store.list(10, 0).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        assert!(again.changes.iter().all(|c| matches!(c, ChangeEvent::Updated(_))));
        for (b, a) in before.iter().zip(&after) {
            assert_eq!(b.id, a.id);
            assert_eq!(b.title, a.title);
            assert!(a.updated_at >= b.updated_at);
        }
    }

    #[tokio::test]
    async fn test_urlless_candidates_are_skipped() {
        let (reconciler, store) = reconciler();
        let batch = vec![
            Candidate::default(),
            Candidate::new("   ", "blank"),
            Candidate::new("u1", "A"),
        ];
        let result = reconciler.reconcile(&batch).await.unwrap();
        assert_eq!(result.summary.count, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_urls_in_one_batch_last_wins() {
        let (reconciler, store) = reconciler();
        let batch = vec![Candidate::new("u1", "first"), Candidate::new("u1", "second")];
        let result = reconciler.reconcile(&batch).await.unwrap();

        assert_eq!(result.summary.count, 2);
        assert!(matches!(result.changes[0], ChangeEvent::Created(_)));
        assert!(matches!(result.changes[1], ChangeEvent::Updated(_)));
        let stored = store.find_by_url("u1").await.unwrap().unwrap();
        assert_eq!(stored.title, "second");
    }

    #[tokio::test]
    async fn test_empty_batch_is_non_destructive() {
        let (reconciler, store) = reconciler();
        reconciler.reconcile(&[Candidate::new("u1", "A")]).await.unwrap();

        let result = reconciler.reconcile(&[]).await.unwrap();
        assert_eq!(result.summary.count, 0);
        assert_eq!(result.events().len(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_oversized_candidate_is_dropped_not_fatal() {
        let (reconciler, store) = reconciler();
        let batch = vec![
            Candidate::new("u1", "x".repeat(newswire_core::MAX_TEXT_LEN + 1)),
            Candidate::new("u2", "B"),
        ];
        let result = reconciler.reconcile(&batch).await.unwrap();
        assert_eq!(result.summary.count, 1);
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.find_by_url("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_padded_url_matches_existing_record() {
        let (reconciler, store) = reconciler();
        let created = store
            .insert(NewRecord {
                url: " u1 ".into(),
                title: "api".into(),
                country: None,
                published_text: None,
                comments: None,
            })
            .await
            .unwrap();

        let result = reconciler
            .reconcile(&[Candidate::new(" u1 ", "fetched")])
            .await
            .unwrap();
        match &result.changes[0] {
            ChangeEvent::Updated(record) => {
                assert_eq!(record.id, created.id);
                assert_eq!(record.title, "fetched");
            }
            other => panic!("expected updated, got {other:?}"),
        }
        assert_eq!(store.count().await.unwrap(), 1);
    }

    /// A batch that loses the uniqueness race on its first insert: the url
    /// looks free, the insert conflicts, and the row only shows up on the
    /// second lookup.
    struct RacingTx {
        lookups: usize,
        winner: Record,
        committed: Arc<std::sync::Mutex<bool>>,
    }

    #[async_trait::async_trait]
    impl RecordTx for RacingTx {
        async fn find_by_url(&mut self, _url: &str) -> Result<Option<Record>, StoreError> {
            self.lookups += 1;
            Ok((self.lookups > 1).then(|| self.winner.clone()))
        }

        async fn insert(&mut self, new: NewRecord) -> Result<Record, StoreError> {
            Err(StoreError::Conflict(new.url))
        }

        async fn update_fields(
            &mut self,
            id: newswire_core::RecordId,
            patch: RecordPatch,
        ) -> Result<Record, StoreError> {
            assert_eq!(id, self.winner.id);
            self.winner.apply(&patch, Utc::now());
            Ok(self.winner.clone())
        }

        async fn commit(self: Box<Self>) -> Result<(), StoreError> {
            *self.committed.lock().unwrap() = true;
            Ok(())
        }
    }

    struct RacingStore {
        winner: Record,
        committed: Arc<std::sync::Mutex<bool>>,
    }

    #[async_trait::async_trait]
    impl RecordStore for RacingStore {
        fn backend(&self) -> &'static str {
            "racing"
        }
        async fn find_by_url(&self, _url: &str) -> Result<Option<Record>, StoreError> {
            Err(StoreError::Unavailable("batch only".into()))
        }
        async fn find_by_id(&self, _id: newswire_core::RecordId) -> Result<Option<Record>, StoreError> {
            Err(StoreError::Unavailable("batch only".into()))
        }
        async fn insert(&self, _new: NewRecord) -> Result<Record, StoreError> {
            Err(StoreError::Unavailable("batch only".into()))
        }
        async fn update_fields(
            &self,
            _id: newswire_core::RecordId,
            _patch: RecordPatch,
        ) -> Result<Record, StoreError> {
            Err(StoreError::Unavailable("batch only".into()))
        }
        async fn delete(&self, _id: newswire_core::RecordId) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("batch only".into()))
        }
        async fn list(&self, _limit: i64, _offset: i64) -> Result<Vec<Record>, StoreError> {
            Err(StoreError::Unavailable("batch only".into()))
        }
        async fn count(&self) -> Result<i64, StoreError> {
            Err(StoreError::Unavailable("batch only".into()))
        }
        async fn close(&self) {}
        async fn begin(&self) -> Result<Box<dyn RecordTx>, StoreError> {
            Ok(Box::new(RacingTx {
                lookups: 0,
                winner: self.winner.clone(),
                committed: self.committed.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn test_insert_conflict_becomes_update() {
        let now = Utc::now();
        let winner = Record {
            id: 7,
            url: "u1".into(),
            title: "peer".into(),
            country: None,
            published_text: None,
            comments: Some(1),
            created_at: now,
            updated_at: now,
        };
        let committed = Arc::new(std::sync::Mutex::new(false));
        let reconciler = Reconciler::new(Arc::new(RacingStore {
            winner,
            committed: committed.clone(),
        }));

        let candidate = Candidate {
            comments: Some(9),
            ..Candidate::new("u1", "")
        };
        let result = reconciler.reconcile(&[candidate]).await.unwrap();

        assert_eq!(result.summary.count, 1);
        match &result.changes[0] {
            ChangeEvent::Updated(record) => {
                assert_eq!(record.id, 7);
                assert_eq!(record.title, "peer");
                assert_eq!(record.comments, Some(9));
            }
            other => panic!("expected updated, got {other:?}"),
        }
        assert!(*committed.lock().unwrap());
    }

    #[test]
    fn test_events_end_with_one_task_completed() {
        let result = Reconciliation::empty();
        let events = result.events();
        assert_eq!(events, vec![ChangeEvent::TaskCompleted(result.summary)]);
    }
}
