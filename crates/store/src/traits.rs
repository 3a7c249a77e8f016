//! Store trait definitions.

use async_trait::async_trait;

use newswire_core::{NewRecord, Record, RecordId, RecordPatch};

use crate::error::StoreError;

/// Durable table of records keyed by id and by unique url.
///
/// Every call may fail with a transient I/O error. Inserting a url that
/// already exists fails with [`StoreError::Conflict`]; addressing a missing
/// id fails with [`StoreError::NotFound`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short backend name for health reporting ("memory", "postgres").
    fn backend(&self) -> &'static str;

    async fn find_by_url(&self, url: &str) -> Result<Option<Record>, StoreError>;

    async fn find_by_id(&self, id: RecordId) -> Result<Option<Record>, StoreError>;

    async fn insert(&self, new: NewRecord) -> Result<Record, StoreError>;

    /// Apply the non-`None` fields of `patch` and bump `updated_at`.
    async fn update_fields(&self, id: RecordId, patch: RecordPatch) -> Result<Record, StoreError>;

    async fn delete(&self, id: RecordId) -> Result<(), StoreError>;

    /// Page through records, newest id first.
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Record>, StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;

    /// Release connections. Called once on shutdown; later calls may fail.
    async fn close(&self);

    /// Open a write batch. Nothing is visible to other callers until
    /// [`RecordTx::commit`]; dropping the batch discards it.
    async fn begin(&self) -> Result<Box<dyn RecordTx>, StoreError>;
}

/// A single all-or-nothing write batch.
#[async_trait]
pub trait RecordTx: Send {
    async fn find_by_url(&mut self, url: &str) -> Result<Option<Record>, StoreError>;

    async fn insert(&mut self, new: NewRecord) -> Result<Record, StoreError>;

    async fn update_fields(
        &mut self,
        id: RecordId,
        patch: RecordPatch,
    ) -> Result<Record, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
