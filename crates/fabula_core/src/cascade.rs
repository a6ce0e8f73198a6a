//! crates/fabula_core/src/cascade.rs
//!
//! Cascading reference cleanup on delete. The store offers no foreign keys
//! and no cross-document transactions, so each delete runs as an ordered
//! sequence of idempotent steps: remove the primary row first, then fan out
//! to the collections that reference it. A cleanup step that fails is logged
//! and folded into a partial-failure error; it never stops the remaining
//! steps from being attempted.

use serde_json::{json, Value};
use tracing::warn;

use crate::domain::{EntityId, User};
use crate::error::{CoreError, CoreResult};
use crate::ports::collections;
use crate::registry::{decode, Registry};

/// Keeps class, story and paragraph references consistent when entities
/// are deleted.
#[derive(Clone)]
pub struct CascadeService {
    registry: Registry,
}

impl CascadeService {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Deletes a user.
    ///
    /// Teachers take every class they own down with them; students are
    /// pulled from every class roster. The row delete commits first, so a
    /// cleanup failure surfaces as [`CoreError::CascadeIncomplete`] while
    /// the user itself is already gone. Retrying the whole call would then
    /// fail with `NotFound`; the caller decides how to reconcile.
    pub async fn delete_user(&self, raw_id: &str) -> CoreResult<EntityId> {
        let id = EntityId::parse(raw_id)?;
        let store = self.registry.store();

        let doc = store
            .delete_by_id(collections::USERS, id)
            .await?
            .ok_or(CoreError::NotFound { kind: "user", id })?;
        let user: User = decode(doc)?;

        let mut failures: Vec<String> = Vec::new();
        if user.is_teacher() {
            match store
                .find_where(collections::CLASSES, "teacher_id", &json!(id))
                .await
            {
                Ok(owned) => {
                    for class_doc in owned {
                        let class_id = match class_doc
                            .get("id")
                            .and_then(Value::as_str)
                            .map(EntityId::parse)
                        {
                            Some(Ok(class_id)) => class_id,
                            _ => {
                                failures.push("class row without a readable id".to_string());
                                continue;
                            }
                        };
                        // A class already gone is fine; only store failures count.
                        if let Err(e) = store.delete_by_id(collections::CLASSES, class_id).await {
                            warn!(user_id = %id, %class_id, error = %e, "owned class not deleted");
                            failures.push(format!("class {class_id}: {e}"));
                        }
                    }
                }
                Err(e) => {
                    warn!(user_id = %id, error = %e, "could not enumerate owned classes");
                    failures.push(format!("listing owned classes: {e}"));
                }
            }
        } else if let Err(e) = store
            .pull_everywhere(collections::CLASSES, "students", &json!(id))
            .await
        {
            warn!(user_id = %id, error = %e, "roster cleanup failed");
            failures.push(format!("roster cleanup: {e}"));
        }

        if failures.is_empty() {
            Ok(id)
        } else {
            Err(CoreError::CascadeIncomplete { deleted: id, detail: failures.join("; ") })
        }
    }

    /// Deletes a story row, then retracts it from every class's active set.
    ///
    /// Archived copies in `finalized_stories` are history and are never
    /// touched. A failed retraction surfaces as
    /// [`CoreError::RefCleanupIncomplete`]: the row delete has already
    /// committed, so the error is advisory and must not trigger a blind
    /// retry of the whole operation.
    pub async fn delete_story(&self, raw_id: &str) -> CoreResult<EntityId> {
        let id = EntityId::parse(raw_id)?;
        let store = self.registry.store();

        store
            .delete_by_id(collections::STORIES, id)
            .await?
            .ok_or(CoreError::NotFound { kind: "story", id })?;

        if let Err(e) = store
            .pull_everywhere(collections::CLASSES, "stories", &json!(id))
            .await
        {
            warn!(story_id = %id, error = %e, "class reference cleanup failed");
            return Err(CoreError::RefCleanupIncomplete { deleted: id, detail: e.to_string() });
        }

        Ok(id)
    }

    /// Deletes a paragraph: first drops the back-reference from the
    /// authoring user's paragraph list, then removes the row. A failed
    /// back-reference pull is logged but does not block the row delete.
    pub async fn delete_paragraph(&self, raw_id: &str) -> CoreResult<EntityId> {
        let id = EntityId::parse(raw_id)?;
        let store = self.registry.store();

        if let Err(e) = store
            .pull_everywhere(collections::USERS, "paragraphs", &json!(id))
            .await
        {
            warn!(paragraph_id = %id, error = %e, "author back-reference cleanup failed");
        }

        store
            .delete_by_id(collections::PARAGRAPHS, id)
            .await?
            .ok_or(CoreError::NotFound { kind: "paragraph", id })?;

        Ok(id)
    }

    /// Deletes a class row. Roster and curriculum references live inside
    /// the row itself, so nothing else needs cleaning.
    pub async fn delete_class(&self, raw_id: &str) -> CoreResult<EntityId> {
        let id = EntityId::parse(raw_id)?;
        self.registry
            .store()
            .delete_by_id(collections::CLASSES, id)
            .await?
            .ok_or(CoreError::NotFound { kind: "class", id })?;
        Ok(id)
    }

    /// Removes one student from one class roster. Returns `false` when the
    /// student was not on the roster, so repeated calls are harmless.
    pub async fn remove_student_from_class(
        &self,
        raw_class_id: &str,
        raw_student_id: &str,
    ) -> CoreResult<bool> {
        let class_id = EntityId::parse(raw_class_id)?;
        let student_id = EntityId::parse(raw_student_id)?;
        let store = self.registry.store();

        store
            .find_by_id(collections::CLASSES, class_id)
            .await?
            .ok_or(CoreError::NotFound { kind: "class", id: class_id })?;

        let removed = store
            .pull_by_id(collections::CLASSES, class_id, "students", &json!(student_id))
            .await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewClass, NewParagraph, NewStory, NewUser, UserKind};
    use crate::memory::{FaultyStore, MemoryStore};
    use crate::ports::DocumentStore;
    use std::sync::Arc;

    fn new_user(kind: UserKind, email: &str) -> NewUser {
        NewUser {
            name: "Ana".to_string(),
            surname: "Novak".to_string(),
            email: email.to_string(),
            password: "$argon2id$stub".to_string(),
            kind,
        }
    }

    fn new_story(title: &str) -> NewStory {
        NewStory {
            title: title.to_string(),
            author: "Ana Novak".to_string(),
            short_description: "desc".to_string(),
            content: "content".to_string(),
        }
    }

    async fn class_for(
        registry: &Registry,
        teacher: EntityId,
        students: &[EntityId],
        stories: &[EntityId],
    ) -> crate::domain::Class {
        registry
            .create_class(NewClass {
                class_name: "3.a".to_string(),
                teacher_id: teacher.to_string(),
                students: students.iter().map(EntityId::to_string).collect(),
                stories: stories.iter().map(EntityId::to_string).collect(),
                color: None,
            })
            .await
            .unwrap()
    }

    fn services(store: Arc<dyn DocumentStore>) -> (Registry, CascadeService) {
        let registry = Registry::new(store);
        let cascade = CascadeService::new(registry.clone());
        (registry, cascade)
    }

    #[tokio::test]
    async fn deleting_a_teacher_takes_their_classes_with_them() {
        let (registry, cascade) = services(Arc::new(MemoryStore::new()));
        let teacher = registry.create_user(new_user(UserKind::Teacher, "t@x.si")).await.unwrap();
        let other = registry.create_user(new_user(UserKind::Teacher, "o@x.si")).await.unwrap();

        let c1 = class_for(&registry, teacher.id, &[], &[]).await;
        let c2 = class_for(&registry, teacher.id, &[], &[]).await;
        let keep = class_for(&registry, other.id, &[], &[]).await;

        cascade.delete_user(&teacher.id.to_string()).await.unwrap();

        assert!(registry.class(&c1.id.to_string()).await.is_err());
        assert!(registry.class(&c2.id.to_string()).await.is_err());
        assert!(registry.class(&keep.id.to_string()).await.is_ok());
        assert!(registry.user(&teacher.id.to_string()).await.is_err());
    }

    #[tokio::test]
    async fn deleting_a_student_clears_every_roster_but_keeps_the_classes() {
        let (registry, cascade) = services(Arc::new(MemoryStore::new()));
        let teacher = registry.create_user(new_user(UserKind::Teacher, "t@x.si")).await.unwrap();
        let student = registry.create_user(new_user(UserKind::Student, "s@x.si")).await.unwrap();
        let mate = registry.create_user(new_user(UserKind::Student, "m@x.si")).await.unwrap();

        let c1 = class_for(&registry, teacher.id, &[student.id, mate.id], &[]).await;
        let c2 = class_for(&registry, teacher.id, &[student.id], &[]).await;

        cascade.delete_user(&student.id.to_string()).await.unwrap();

        let c1 = registry.class(&c1.id.to_string()).await.unwrap();
        let c2 = registry.class(&c2.id.to_string()).await.unwrap();
        assert_eq!(c1.students, vec![mate.id]);
        assert!(c2.students.is_empty());
    }

    #[tokio::test]
    async fn deleting_a_missing_user_reports_not_found() {
        let (_, cascade) = services(Arc::new(MemoryStore::new()));
        let result = cascade.delete_user(&EntityId::generate().to_string()).await;
        assert!(matches!(result, Err(CoreError::NotFound { kind: "user", .. })));
    }

    #[tokio::test]
    async fn deleting_a_story_retracts_it_from_active_sets_only() {
        let (registry, cascade) = services(Arc::new(MemoryStore::new()));
        let teacher = registry.create_user(new_user(UserKind::Teacher, "t@x.si")).await.unwrap();
        let author = registry.create_user(new_user(UserKind::Student, "s@x.si")).await.unwrap();
        let story = registry.create_story(new_story("Doomed")).await.unwrap();
        let other = registry.create_story(new_story("Kept")).await.unwrap();

        let c1 = class_for(&registry, teacher.id, &[], &[story.id, other.id]).await;
        let c2 = class_for(&registry, teacher.id, &[], &[story.id]).await;

        // Archive the story into c1 first so history exists.
        registry
            .create_paragraph(
                &author.id.to_string(),
                NewParagraph {
                    story_id: story.id.to_string(),
                    content: "text".to_string(),
                    drawing: None,
                    order: 0,
                },
            )
            .await
            .unwrap();
        crate::finalize::FinalizeService::new(registry.clone())
            .finalize(&c1.id.to_string(), &story.id.to_string())
            .await
            .unwrap();

        cascade.delete_story(&story.id.to_string()).await.unwrap();

        let c1 = registry.class(&c1.id.to_string()).await.unwrap();
        let c2 = registry.class(&c2.id.to_string()).await.unwrap();
        assert_eq!(c1.stories, vec![other.id]);
        assert!(c2.stories.is_empty());
        // The archive entry survives the live story's deletion.
        assert_eq!(c1.finalized_stories.len(), 1);
        assert_eq!(c1.finalized_stories[0].story_id, story.id);
    }

    #[tokio::test]
    async fn deleting_a_paragraph_clears_the_author_back_reference() {
        let (registry, cascade) = services(Arc::new(MemoryStore::new()));
        let author = registry.create_user(new_user(UserKind::Student, "s@x.si")).await.unwrap();
        let story = registry.create_story(new_story("S")).await.unwrap();
        let paragraph = registry
            .create_paragraph(
                &author.id.to_string(),
                NewParagraph {
                    story_id: story.id.to_string(),
                    content: "text".to_string(),
                    drawing: None,
                    order: 0,
                },
            )
            .await
            .unwrap();

        cascade.delete_paragraph(&paragraph.id.to_string()).await.unwrap();

        let author = registry.user(&author.id.to_string()).await.unwrap();
        assert!(author.paragraphs.is_empty());
        assert!(registry.paragraph(&paragraph.id.to_string()).await.is_err());
    }

    #[tokio::test]
    async fn removing_a_student_twice_is_a_no_op_the_second_time() {
        let (registry, cascade) = services(Arc::new(MemoryStore::new()));
        let teacher = registry.create_user(new_user(UserKind::Teacher, "t@x.si")).await.unwrap();
        let student = registry.create_user(new_user(UserKind::Student, "s@x.si")).await.unwrap();
        let class = class_for(&registry, teacher.id, &[student.id], &[]).await;

        let first = cascade
            .remove_student_from_class(&class.id.to_string(), &student.id.to_string())
            .await
            .unwrap();
        let second = cascade
            .remove_student_from_class(&class.id.to_string(), &student.id.to_string())
            .await
            .unwrap();
        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn removing_a_student_from_a_missing_class_reports_not_found() {
        let (registry, cascade) = services(Arc::new(MemoryStore::new()));
        let student = registry.create_user(new_user(UserKind::Student, "s@x.si")).await.unwrap();
        let result = cascade
            .remove_student_from_class(&EntityId::generate().to_string(), &student.id.to_string())
            .await;
        assert!(matches!(result, Err(CoreError::NotFound { kind: "class", .. })));
    }

    #[tokio::test]
    async fn roster_cleanup_failure_is_surfaced_after_the_row_delete() {
        let seed = MemoryStore::new();
        let mut faulty = FaultyStore::wrapping(seed);
        faulty.fail_pull_everywhere = true;
        let (registry, cascade) = services(Arc::new(faulty));

        let student = registry.create_user(new_user(UserKind::Student, "s@x.si")).await.unwrap();

        let result = cascade.delete_user(&student.id.to_string()).await;
        assert!(matches!(result, Err(CoreError::CascadeIncomplete { .. })));
        // The primary row is already gone despite the reported failure.
        assert!(registry.user(&student.id.to_string()).await.is_err());
    }

    #[tokio::test]
    async fn class_reference_cleanup_failure_is_advisory() {
        let seed = MemoryStore::new();
        let mut faulty = FaultyStore::wrapping(seed);
        faulty.fail_pull_everywhere = true;
        let (registry, cascade) = services(Arc::new(faulty));

        let story = registry.create_story(new_story("S")).await.unwrap();

        let result = cascade.delete_story(&story.id.to_string()).await;
        assert!(matches!(result, Err(CoreError::RefCleanupIncomplete { .. })));
        assert!(registry.story(&story.id.to_string()).await.is_err());
    }

    #[tokio::test]
    async fn teacher_cascade_attempts_every_class_and_aggregates_failures() {
        let seed = MemoryStore::new();
        let mut faulty = FaultyStore::wrapping(seed);
        faulty.fail_delete_in = Some(collections::CLASSES);
        let (registry, cascade) = services(Arc::new(faulty));

        let teacher = registry.create_user(new_user(UserKind::Teacher, "t@x.si")).await.unwrap();
        class_for(&registry, teacher.id, &[], &[]).await;
        class_for(&registry, teacher.id, &[], &[]).await;

        let result = cascade.delete_user(&teacher.id.to_string()).await;
        match result {
            Err(CoreError::CascadeIncomplete { deleted, detail }) => {
                assert_eq!(deleted, teacher.id);
                // Both class deletions were attempted and both reported.
                assert_eq!(detail.matches("injected fault").count(), 2);
            }
            other => panic!("expected CascadeIncomplete, got {other:?}"),
        }
    }
}
