//! crates/fabula_core/src/finalize.rs
//!
//! The finalization engine. Converts a story's live paragraph set into an
//! immutable ordered snapshot, appends it to a class's archive and retracts
//! the story from that class's active set. The two mutations cannot share a
//! transaction, so their order is fixed: the archive append must commit
//! before the retraction is attempted, and each half fails with its own
//! error so a caller knows exactly what remains to be done.

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::domain::{EntityId, FinalizedStory, ParagraphSnapshot, StorySummary};
use crate::error::{CoreError, CoreResult};
use crate::ports::{collections, StoreError};
use crate::registry::Registry;

/// Result of a successful finalization.
#[derive(Debug, Clone, Serialize)]
pub struct Finalized {
    /// Number of paragraphs captured in the snapshot.
    pub archived_count: usize,
    pub entry: FinalizedStory,
}

/// Archives stories into classes.
#[derive(Clone)]
pub struct FinalizeService {
    registry: Registry,
}

impl FinalizeService {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Finalizes `story_id` into `class_id`.
    ///
    /// The snapshot captures every paragraph of the story in display order
    /// together with the story's metadata as of this moment. The archive is
    /// a log, not a map: finalizing the same story into the same class again
    /// appends a second entry. The live story and its paragraphs are left
    /// untouched for reuse elsewhere.
    pub async fn finalize(
        &self,
        raw_class_id: &str,
        raw_story_id: &str,
    ) -> CoreResult<Finalized> {
        let class = self.registry.class(raw_class_id).await?;
        let story_id = EntityId::parse(raw_story_id)?;

        let paragraphs = self.registry.story_paragraphs(raw_story_id).await?;
        if paragraphs.is_empty() {
            return Err(CoreError::EmptyStory(story_id));
        }
        let story = self.registry.story(raw_story_id).await?;

        let entry = FinalizedStory {
            story_id,
            paragraphs: paragraphs
                .iter()
                .map(|p| ParagraphSnapshot {
                    paragraph_id: p.id,
                    content: p.content.clone(),
                    drawing: p.drawing.clone(),
                    order: p.order,
                })
                .collect(),
            story: StorySummary {
                title: story.title,
                short_description: story.short_description,
                author: story.author,
            },
            images: Vec::new(),
        };
        let entry_value = serde_json::to_value(&entry)
            .map_err(|e| CoreError::Store(StoreError::Codec(e.to_string())))?;

        let store = self.registry.store();

        // Step one: append to the archive. Nothing else may happen first.
        // A class that vanished since the precondition check is a no-op
        // failure, not a crash.
        match store
            .push_by_id(collections::CLASSES, class.id, "finalized_stories", entry_value)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => {
                return Err(CoreError::ArchiveFailed {
                    class_id: class.id,
                    story_id,
                    reason: "class no longer exists".to_string(),
                })
            }
            Err(e) => {
                return Err(CoreError::ArchiveFailed {
                    class_id: class.id,
                    story_id,
                    reason: e.to_string(),
                })
            }
        }

        // Step two: retract from the active set. The archive entry is
        // already committed, so a failure here leaves an inconsistent but
        // safe state that the caller can repair by retrying the retraction.
        if let Err(e) = store
            .pull_by_id(collections::CLASSES, class.id, "stories", &json!(story_id))
            .await
        {
            warn!(class_id = %class.id, %story_id, error = %e, "archived but not retracted");
            return Err(CoreError::RetractFailed {
                class_id: class.id,
                story_id,
                reason: e.to_string(),
            });
        }

        info!(
            class_id = %class.id,
            %story_id,
            paragraphs = entry.paragraphs.len(),
            "story finalized"
        );
        Ok(Finalized { archived_count: entry.paragraphs.len(), entry })
    }

    /// Appends an image reference to an existing finalized entry.
    ///
    /// Images can only be attached after finalization; without a matching
    /// archive entry the call fails and nothing is written.
    pub async fn append_image(
        &self,
        raw_class_id: &str,
        raw_story_id: &str,
        image: &str,
    ) -> CoreResult<()> {
        let class_id = EntityId::parse(raw_class_id)?;
        let story_id = EntityId::parse(raw_story_id)?;

        let appended = self
            .registry
            .store()
            .push_to_entry(
                collections::CLASSES,
                class_id,
                "finalized_stories",
                "story_id",
                &json!(story_id),
                "images",
                json!(image),
            )
            .await?;
        if !appended {
            return Err(CoreError::EntryNotFound { class_id, story_id });
        }
        Ok(())
    }
}
