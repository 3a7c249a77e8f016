//! In-process record store.
//!
//! One async mutex guards the whole table. A write batch holds the lock for
//! its lifetime and works on a staged copy, so concurrent batches are
//! serialized and an abandoned batch leaves no trace.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use newswire_core::{NewRecord, Record, RecordId, RecordPatch};

use crate::error::StoreError;
use crate::traits::{RecordStore, RecordTx};

#[derive(Debug, Clone, Default)]
struct Table {
    rows: BTreeMap<RecordId, Record>,
    by_url: HashMap<String, RecordId>,
    next_id: RecordId,
}

impl Table {
    fn find_by_url(&self, url: &str) -> Option<Record> {
        self.by_url.get(url).and_then(|id| self.rows.get(id)).cloned()
    }

    fn insert(&mut self, new: NewRecord) -> Result<Record, StoreError> {
        let new = new.normalized()?;
        if self.by_url.contains_key(&new.url) {
            return Err(StoreError::Conflict(new.url));
        }
        self.next_id += 1;
        let now = Utc::now();
        let record = Record {
            id: self.next_id,
            url: new.url,
            title: new.title,
            country: new.country,
            published_text: new.published_text,
            comments: new.comments,
            created_at: now,
            updated_at: now,
        };
        self.by_url.insert(record.url.clone(), record.id);
        self.rows.insert(record.id, record.clone());
        Ok(record)
    }

    fn update(&mut self, id: RecordId, patch: RecordPatch) -> Result<Record, StoreError> {
        let patch = patch.normalized()?;
        if let Some(url) = &patch.url {
            if matches!(self.by_url.get(url), Some(owner) if *owner != id) {
                return Err(StoreError::Conflict(url.clone()));
            }
        }
        let record = self.rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let old_url = record.url.clone();
        record.apply(&patch, Utc::now());
        if record.url != old_url {
            self.by_url.remove(&old_url);
            self.by_url.insert(record.url.clone(), id);
        }
        Ok(record.clone())
    }

    fn delete(&mut self, id: RecordId) -> Result<(), StoreError> {
        let record = self.rows.remove(&id).ok_or(StoreError::NotFound(id))?;
        self.by_url.remove(&record.url);
        Ok(())
    }
}

/// In-memory [`RecordStore`]. Cloning shares the same table.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    table: Arc<Mutex<Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.table.lock().await.find_by_url(url))
    }

    async fn find_by_id(&self, id: RecordId) -> Result<Option<Record>, StoreError> {
        Ok(self.table.lock().await.rows.get(&id).cloned())
    }

    async fn insert(&self, new: NewRecord) -> Result<Record, StoreError> {
        self.table.lock().await.insert(new)
    }

    async fn update_fields(&self, id: RecordId, patch: RecordPatch) -> Result<Record, StoreError> {
        self.table.lock().await.update(id, patch)
    }

    async fn delete(&self, id: RecordId) -> Result<(), StoreError> {
        self.table.lock().await.delete(id)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Record>, StoreError> {
        let table = self.table.lock().await;
        Ok(table
            .rows
            .values()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(self.table.lock().await.rows.len() as i64)
    }

    async fn close(&self) {}

    async fn begin(&self) -> Result<Box<dyn RecordTx>, StoreError> {
        let guard = self.table.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx { guard, staged }))
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<Table>,
    staged: Table,
}

#[async_trait]
impl RecordTx for MemoryTx {
    async fn find_by_url(&mut self, url: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.staged.find_by_url(url))
    }

    async fn insert(&mut self, new: NewRecord) -> Result<Record, StoreError> {
        self.staged.insert(new)
    }

    async fn update_fields(
        &mut self,
        id: RecordId,
        patch: RecordPatch,
    ) -> Result<Record, StoreError> {
        self.staged.update(id, patch)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}
