//! The surface the undo engine (C8) drives to actually perform changes
//! (§4.8 "coordinating multiple asynchronous change requests against the
//! store"). On the wire this would be the same `Create-/Modify-/DeleteItem`
//! commands any other client issues through `pim-protocol`; the engine is
//! deliberately decoupled from the transport so it can be exercised with an
//! in-memory double in tests, the same way `pim-server`'s handlers are
//! decoupled from `Store` (§10.6).
//!
//! Atomic grouping (§4.8 Multi entries, §7 `Rolledback`) is expressed as an
//! explicit begin/commit/rollback bracket around a batch of calls, mirroring
//! how the server would wrap one atomic operation in a single transaction.
//! A backend with no real transactional semantics of its own may leave the
//! default no-op implementations in place.

use async_trait::async_trait;

use pim_model::{AtomicOperationId, CollectionId, ItemId, PimItem};

use crate::error::BackendError;

#[async_trait]
pub trait ChangeBackend: Send + Sync {
    async fn create_item(&self, collection: CollectionId, draft: PimItem) -> Result<PimItem, BackendError>;
    async fn modify_item(&self, item: PimItem) -> Result<PimItem, BackendError>;
    async fn delete_item(&self, id: ItemId) -> Result<(), BackendError>;

    async fn begin_atomic(&self, _op: AtomicOperationId) -> Result<(), BackendError> {
        Ok(())
    }

    async fn commit_atomic(&self, _op: AtomicOperationId) -> Result<(), BackendError> {
        Ok(())
    }

    /// Undoes every effect of the operations issued since the matching
    /// `begin_atomic` (§4.8 "the atomic operation is rolled back by the
    /// store"). A backend with no transaction of its own can leave this as
    /// a no-op only if its individual calls are already side-effect-free on
    /// failure; a real implementation must actually compensate.
    async fn rollback_atomic(&self, _op: AtomicOperationId) -> Result<(), BackendError> {
        Ok(())
    }
}
