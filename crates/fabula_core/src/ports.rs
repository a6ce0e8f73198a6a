//! crates/fabula_core/src/ports.rs
//!
//! Defines the persistence contract (trait) for the application's core logic.
//! The trait forms the boundary of the hexagonal architecture, allowing the
//! core to be independent of the concrete document store behind it.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::EntityId;

//=========================================================================================
// Collections, Documents and Store Errors
//=========================================================================================

/// The named collections the platform persists entities in.
pub mod collections {
    pub const USERS: &str = "users";
    pub const STORIES: &str = "stories";
    pub const PARAGRAPHS: &str = "paragraphs";
    pub const CLASSES: &str = "classes";
}

/// A schemaless record as held by the store. Entities are (de)serialized
/// into this shape at the registry boundary.
pub type Document = serde_json::Map<String, Value>;

/// Errors raised by a store backend.
///
/// Backends map their native failures into these two cases; everything
/// domain-shaped lives in [`crate::error::CoreError`] instead.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("document encoding error: {0}")]
    Codec(String),
}

/// A convenience type alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

//=========================================================================================
// The DocumentStore Port
//=========================================================================================

/// Document-level persistence over named collections.
///
/// Every operation is atomic with respect to a single document; there is no
/// cross-document atomicity. Multi-document consistency is the caller's
/// responsibility and is handled by explicit step ordering in the cascade
/// and finalization services.
///
/// Mutating operations return the post-image of the touched document (or a
/// modification indicator) so callers can observe exactly what committed.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point lookup by id. `Ok(None)` when the document is absent.
    async fn find_by_id(&self, collection: &str, id: EntityId) -> StoreResult<Option<Document>>;

    /// Full scan of a collection, in insertion order.
    async fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>>;

    /// Filtered scan: all documents whose `field` equals `value`.
    async fn find_where(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<Vec<Document>>;

    /// Inserts a document, assigning a fresh `id` and stamping `created_at`.
    /// Returns the stored post-image.
    async fn insert(&self, collection: &str, doc: Document) -> StoreResult<Document>;

    /// Merges `changes` into the document (set semantics) and stamps
    /// `updated_at`. Returns the post-image, or `None` if no document
    /// matched.
    async fn update_by_id(
        &self,
        collection: &str,
        id: EntityId,
        changes: Document,
    ) -> StoreResult<Option<Document>>;

    /// Removes a document and returns it, or `None` if it was absent.
    async fn delete_by_id(&self, collection: &str, id: EntityId)
        -> StoreResult<Option<Document>>;

    /// Appends `value` to the array field of one document, creating the
    /// field if missing. Returns the post-image, or `None` if no document
    /// matched.
    async fn push_by_id(
        &self,
        collection: &str,
        id: EntityId,
        field: &str,
        value: Value,
    ) -> StoreResult<Option<Document>>;

    /// Removes every occurrence of `value` from the array field of one
    /// document. `Ok(false)` when the document is absent or the value was
    /// not present.
    async fn pull_by_id(
        &self,
        collection: &str,
        id: EntityId,
        field: &str,
        value: &Value,
    ) -> StoreResult<bool>;

    /// Removes `value` from the array field of every document in the
    /// collection that contains it. Returns the number of documents
    /// modified.
    async fn pull_everywhere(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<u64>;

    /// Positional nested append: within the document's `array_field`, finds
    /// the first element whose `key_field` equals `key` and appends `value`
    /// to that element's `inner_field` array. `Ok(false)` when the document
    /// or a matching element is absent.
    #[allow(clippy::too_many_arguments)]
    async fn push_to_entry(
        &self,
        collection: &str,
        id: EntityId,
        array_field: &str,
        key_field: &str,
        key: &Value,
        inner_field: &str,
        value: Value,
    ) -> StoreResult<bool>;
}
