//! crates/fabula_core/src/error.rs
//!
//! The error taxonomy shared by the registry, the cascade service and the
//! finalization engine. Partial-failure variants are distinguishable so a
//! caller always knows whether a primary mutation committed before the
//! failure occurred.

use crate::domain::EntityId;
use crate::ports::StoreError;

/// Errors produced by the core services.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The input was not a well-formed identifier. Rejected before any
    /// store call, so no side effect has happened.
    #[error("malformed identifier: '{0}'")]
    InvalidIdentifier(String),

    /// A referenced entity does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: EntityId },

    /// A required field was absent or blank on create.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A partial update carried no fields at all.
    #[error("no fields to update")]
    EmptyUpdate,

    /// A story with zero paragraphs cannot be finalized.
    #[error("story {0} has no paragraphs to finalize")]
    EmptyStory(EntityId),

    /// The archive append of a finalize failed. Nothing was written; the
    /// story is still active and the call is safe to retry.
    #[error("could not archive story {story_id} into class {class_id}: {reason}")]
    ArchiveFailed {
        class_id: EntityId,
        story_id: EntityId,
        reason: String,
    },

    /// The archive append committed but the story could not be removed
    /// from the class's active set. No data was lost; only the retraction
    /// needs to be retried.
    #[error("story {story_id} was archived into class {class_id} but is still listed active: {reason}")]
    RetractFailed {
        class_id: EntityId,
        story_id: EntityId,
        reason: String,
    },

    /// The user row was deleted but some dependent cleanup did not finish.
    /// Dangling references may remain; retrying the delete would fail on
    /// the already-removed row.
    #[error("user {deleted} was deleted but dependent cleanup failed: {detail}")]
    CascadeIncomplete { deleted: EntityId, detail: String },

    /// The story row was deleted but class references were not fully
    /// cleaned. Advisory only, same caveat as `CascadeIncomplete`.
    #[error("story {deleted} was deleted but class references were not cleaned: {detail}")]
    RefCleanupIncomplete { deleted: EntityId, detail: String },

    /// An image was appended to a finalized entry that does not exist.
    #[error("class {class_id} has no finalized entry for story {story_id}")]
    EntryNotFound {
        class_id: EntityId,
        story_id: EntityId,
    },

    /// A store failure during a single atomic step, surfaced as is.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience alias used throughout the core services.
pub type CoreResult<T> = Result<T, CoreError>;
