//! crates/fabula_core/src/registry.rs
//!
//! The typed entity registry. Every raw identifier coming in from a caller
//! is validated here before any store call, and every document leaving the
//! store is decoded back into a domain struct at this boundary.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::warn;

use crate::domain::{
    Class, ClassPatch, EntityId, NewClass, NewParagraph, NewStory, NewUser, Paragraph,
    ParagraphPatch, Story, StoryPatch, User, UserKind, UserPatch, DEFAULT_CLASS_COLOR,
};
use crate::error::{CoreError, CoreResult};
use crate::ports::{collections, Document, DocumentStore, StoreError};

/// Length and alphabet of student access codes.
const CODE_LEN: usize = 8;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

//=========================================================================================
// Document Codec Helpers
//=========================================================================================

/// Decodes a store document into a domain struct.
pub(crate) fn decode<T: DeserializeOwned>(doc: Document) -> CoreResult<T> {
    serde_json::from_value(Value::Object(doc))
        .map_err(|e| CoreError::Store(StoreError::Codec(e.to_string())))
}

/// Decodes a whole scan result, preserving order.
pub(crate) fn decode_all<T: DeserializeOwned>(docs: Vec<Document>) -> CoreResult<Vec<T>> {
    docs.into_iter().map(decode).collect()
}

fn require(value: &str, field: &'static str) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(CoreError::MissingField(field));
    }
    Ok(())
}

fn parse_all(raw_ids: &[String]) -> CoreResult<Vec<EntityId>> {
    raw_ids.iter().map(|raw| EntityId::parse(raw)).collect()
}

//=========================================================================================
// The Registry
//=========================================================================================

/// Typed accessors for users, stories, paragraphs and classes over the
/// document store.
#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn DocumentStore>,
}

impl Registry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub(crate) fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    // --- Users ---

    /// Creates a user. Students are allocated a unique access code and an
    /// empty authored-paragraph list; teachers get neither.
    pub async fn create_user(&self, new: NewUser) -> CoreResult<User> {
        require(&new.name, "name")?;
        require(&new.surname, "surname")?;
        require(&new.email, "email")?;
        require(&new.password, "password")?;

        let mut doc = Document::new();
        doc.insert("name".to_string(), json!(new.name));
        doc.insert("surname".to_string(), json!(new.surname));
        doc.insert("email".to_string(), json!(new.email));
        doc.insert("password".to_string(), json!(new.password));
        doc.insert("type".to_string(), serde_json::to_value(new.kind).map_err(codec)?);
        if new.kind == UserKind::Student {
            let code = self.allocate_student_code().await?;
            doc.insert("code".to_string(), json!(code));
            doc.insert("paragraphs".to_string(), json!([]));
        }

        decode(self.store.insert(collections::USERS, doc).await?)
    }

    /// Picks an access code no existing student holds. Random generation
    /// alone is not enough; uniqueness requires the lookup.
    async fn allocate_student_code(&self) -> CoreResult<String> {
        loop {
            let code = generate_code();
            let taken = self
                .store
                .find_where(collections::USERS, "code", &json!(code))
                .await?;
            if taken.is_empty() {
                return Ok(code);
            }
        }
    }

    pub async fn user(&self, raw_id: &str) -> CoreResult<User> {
        let id = EntityId::parse(raw_id)?;
        self.store
            .find_by_id(collections::USERS, id)
            .await?
            .map(decode)
            .transpose()?
            .ok_or(CoreError::NotFound { kind: "user", id })
    }

    pub async fn users(&self) -> CoreResult<Vec<User>> {
        decode_all(self.store.find_all(collections::USERS).await?)
    }

    pub async fn user_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        let matches = self
            .store
            .find_where(collections::USERS, "email", &json!(email))
            .await?;
        matches.into_iter().next().map(decode).transpose()
    }

    pub async fn user_by_code(&self, code: &str) -> CoreResult<Option<User>> {
        let matches = self
            .store
            .find_where(collections::USERS, "code", &json!(code))
            .await?;
        matches.into_iter().next().map(decode).transpose()
    }

    pub async fn update_user(&self, raw_id: &str, patch: UserPatch) -> CoreResult<User> {
        let id = EntityId::parse(raw_id)?;

        let mut changes = Document::new();
        if let Some(name) = patch.name {
            changes.insert("name".to_string(), json!(name));
        }
        if let Some(surname) = patch.surname {
            changes.insert("surname".to_string(), json!(surname));
        }
        if let Some(email) = patch.email {
            changes.insert("email".to_string(), json!(email));
        }
        if let Some(password) = patch.password {
            changes.insert("password".to_string(), json!(password));
        }
        if let Some(paragraphs) = patch.paragraphs {
            let ids = parse_all(&paragraphs)?;
            changes.insert("paragraphs".to_string(), json!(ids));
        }

        self.apply_update(collections::USERS, "user", id, changes).await
    }

    // --- Stories ---

    pub async fn create_story(&self, new: NewStory) -> CoreResult<Story> {
        require(&new.title, "title")?;
        require(&new.author, "author")?;
        require(&new.short_description, "short_description")?;
        require(&new.content, "content")?;

        let mut doc = Document::new();
        doc.insert("title".to_string(), json!(new.title));
        doc.insert("author".to_string(), json!(new.author));
        doc.insert("short_description".to_string(), json!(new.short_description));
        doc.insert("content".to_string(), json!(new.content));
        doc.insert("is_finished".to_string(), json!(false));

        decode(self.store.insert(collections::STORIES, doc).await?)
    }

    pub async fn story(&self, raw_id: &str) -> CoreResult<Story> {
        let id = EntityId::parse(raw_id)?;
        self.store
            .find_by_id(collections::STORIES, id)
            .await?
            .map(decode)
            .transpose()?
            .ok_or(CoreError::NotFound { kind: "story", id })
    }

    pub async fn stories(&self) -> CoreResult<Vec<Story>> {
        decode_all(self.store.find_all(collections::STORIES).await?)
    }

    pub async fn update_story(&self, raw_id: &str, patch: StoryPatch) -> CoreResult<Story> {
        let id = EntityId::parse(raw_id)?;

        let mut changes = Document::new();
        if let Some(title) = patch.title {
            changes.insert("title".to_string(), json!(title));
        }
        if let Some(author) = patch.author {
            changes.insert("author".to_string(), json!(author));
        }
        if let Some(short_description) = patch.short_description {
            changes.insert("short_description".to_string(), json!(short_description));
        }
        if let Some(content) = patch.content {
            changes.insert("content".to_string(), json!(content));
        }
        if let Some(is_finished) = patch.is_finished {
            changes.insert("is_finished".to_string(), json!(is_finished));
        }

        self.apply_update(collections::STORIES, "story", id, changes).await
    }

    // --- Paragraphs ---

    /// Inserts a paragraph and records it on the author's paragraph list.
    ///
    /// When the author push finds no user, the freshly inserted row is
    /// deleted again so a failed create leaves no orphan behind.
    pub async fn create_paragraph(
        &self,
        raw_author_id: &str,
        new: NewParagraph,
    ) -> CoreResult<Paragraph> {
        let user_id = EntityId::parse(raw_author_id)?;
        let story_id = EntityId::parse(&new.story_id)?;
        require(&new.content, "content")?;

        let mut doc = Document::new();
        doc.insert("story_id".to_string(), json!(story_id));
        doc.insert("user_id".to_string(), json!(user_id));
        doc.insert("content".to_string(), json!(new.content));
        doc.insert("drawing".to_string(), json!(new.drawing));
        doc.insert("order".to_string(), json!(new.order));

        let paragraph: Paragraph = decode(self.store.insert(collections::PARAGRAPHS, doc).await?)?;

        let attach = self
            .store
            .push_by_id(collections::USERS, user_id, "paragraphs", json!(paragraph.id))
            .await;
        match attach {
            Ok(Some(_)) => Ok(paragraph),
            Ok(None) => {
                self.discard_orphan(paragraph.id).await;
                Err(CoreError::NotFound { kind: "user", id: user_id })
            }
            Err(e) => {
                self.discard_orphan(paragraph.id).await;
                Err(e.into())
            }
        }
    }

    async fn discard_orphan(&self, paragraph_id: EntityId) {
        if let Err(e) = self.store.delete_by_id(collections::PARAGRAPHS, paragraph_id).await {
            warn!(%paragraph_id, error = %e, "could not remove orphaned paragraph");
        }
    }

    pub async fn paragraph(&self, raw_id: &str) -> CoreResult<Paragraph> {
        let id = EntityId::parse(raw_id)?;
        self.store
            .find_by_id(collections::PARAGRAPHS, id)
            .await?
            .map(decode)
            .transpose()?
            .ok_or(CoreError::NotFound { kind: "paragraph", id })
    }

    /// All paragraphs of one story in display order: ascending `order`,
    /// ties broken by creation time, then id, so the result is stable.
    pub async fn story_paragraphs(&self, raw_story_id: &str) -> CoreResult<Vec<Paragraph>> {
        let story_id = EntityId::parse(raw_story_id)?;
        let docs = self
            .store
            .find_where(collections::PARAGRAPHS, "story_id", &json!(story_id))
            .await?;
        let mut paragraphs: Vec<Paragraph> = decode_all(docs)?;
        paragraphs.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(paragraphs)
    }

    pub async fn update_paragraph(
        &self,
        raw_id: &str,
        patch: ParagraphPatch,
    ) -> CoreResult<Paragraph> {
        let id = EntityId::parse(raw_id)?;

        let mut changes = Document::new();
        if let Some(raw_story_id) = patch.story_id {
            let story_id = EntityId::parse(&raw_story_id)?;
            changes.insert("story_id".to_string(), json!(story_id));
        }
        if let Some(content) = patch.content {
            changes.insert("content".to_string(), json!(content));
        }
        if let Some(drawing) = patch.drawing {
            // An explicit null clears the drawing.
            changes.insert("drawing".to_string(), json!(drawing));
        }
        if let Some(order) = patch.order {
            changes.insert("order".to_string(), json!(order));
        }

        self.apply_update(collections::PARAGRAPHS, "paragraph", id, changes).await
    }

    // --- Classes ---

    /// Creates a class. Every referenced id is validated up front so bad
    /// input cannot leave a half-written class behind.
    pub async fn create_class(&self, new: NewClass) -> CoreResult<Class> {
        require(&new.class_name, "class_name")?;
        let teacher_id = EntityId::parse(&new.teacher_id)?;
        let students = parse_all(&new.students)?;
        let stories = parse_all(&new.stories)?;

        let mut doc = Document::new();
        doc.insert("class_name".to_string(), json!(new.class_name));
        doc.insert("teacher_id".to_string(), json!(teacher_id));
        doc.insert("students".to_string(), json!(students));
        doc.insert("stories".to_string(), json!(stories));
        doc.insert("finalized_stories".to_string(), json!([]));
        doc.insert(
            "color".to_string(),
            json!(new.color.unwrap_or_else(|| DEFAULT_CLASS_COLOR.to_string())),
        );

        decode(self.store.insert(collections::CLASSES, doc).await?)
    }

    pub async fn class(&self, raw_id: &str) -> CoreResult<Class> {
        let id = EntityId::parse(raw_id)?;
        self.store
            .find_by_id(collections::CLASSES, id)
            .await?
            .map(decode)
            .transpose()?
            .ok_or(CoreError::NotFound { kind: "class", id })
    }

    pub async fn classes(&self) -> CoreResult<Vec<Class>> {
        decode_all(self.store.find_all(collections::CLASSES).await?)
    }

    pub async fn update_class(&self, raw_id: &str, patch: ClassPatch) -> CoreResult<Class> {
        let id = EntityId::parse(raw_id)?;

        let mut changes = Document::new();
        if let Some(class_name) = patch.class_name {
            changes.insert("class_name".to_string(), json!(class_name));
        }
        if let Some(raw_teacher_id) = patch.teacher_id {
            let teacher_id = EntityId::parse(&raw_teacher_id)?;
            changes.insert("teacher_id".to_string(), json!(teacher_id));
        }
        if let Some(students) = patch.students {
            let ids = parse_all(&students)?;
            changes.insert("students".to_string(), json!(ids));
        }
        if let Some(stories) = patch.stories {
            let ids = parse_all(&stories)?;
            changes.insert("stories".to_string(), json!(ids));
        }
        if let Some(color) = patch.color {
            changes.insert("color".to_string(), json!(color));
        }

        self.apply_update(collections::CLASSES, "class", id, changes).await
    }

    // --- Shared update path ---

    async fn apply_update<T: DeserializeOwned>(
        &self,
        collection: &str,
        kind: &'static str,
        id: EntityId,
        changes: Document,
    ) -> CoreResult<T> {
        if changes.is_empty() {
            return Err(CoreError::EmptyUpdate);
        }
        self.store
            .update_by_id(collection, id, changes)
            .await?
            .map(decode)
            .transpose()?
            .ok_or(CoreError::NotFound { kind, id })
    }
}

fn codec(e: serde_json::Error) -> CoreError {
    CoreError::Store(StoreError::Codec(e.to_string()))
}

fn generate_code() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn registry() -> Registry {
        Registry::new(Arc::new(MemoryStore::new()))
    }

    fn new_user(kind: UserKind) -> NewUser {
        NewUser {
            name: "Ana".to_string(),
            surname: "Novak".to_string(),
            email: "ana@example.com".to_string(),
            password: "$argon2id$stub".to_string(),
            kind,
        }
    }

    fn new_story() -> NewStory {
        NewStory {
            title: "The Fox".to_string(),
            author: "Ana Novak".to_string(),
            short_description: "A fox story".to_string(),
            content: "Once upon a time".to_string(),
        }
    }

    #[tokio::test]
    async fn students_get_a_code_and_an_empty_paragraph_list() {
        let registry = registry();
        let student = registry.create_user(new_user(UserKind::Student)).await.unwrap();

        let code = student.code.expect("students must carry a code");
        assert_eq!(code.len(), CODE_LEN);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        assert!(student.paragraphs.is_empty());
    }

    #[tokio::test]
    async fn teachers_carry_no_code() {
        let registry = registry();
        let teacher = registry.create_user(new_user(UserKind::Teacher)).await.unwrap();
        assert!(teacher.code.is_none());
    }

    #[tokio::test]
    async fn student_codes_are_unique_and_resolvable() {
        let registry = registry();
        let mut codes = std::collections::HashSet::new();
        for _ in 0..5 {
            let student = registry.create_user(new_user(UserKind::Student)).await.unwrap();
            assert!(codes.insert(student.code.clone().unwrap()));
            let found = registry
                .user_by_code(student.code.as_deref().unwrap())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(found.id, student.id);
        }
    }

    #[tokio::test]
    async fn blank_required_fields_are_rejected() {
        let registry = registry();
        let mut user = new_user(UserKind::Teacher);
        user.email = "  ".to_string();
        assert!(matches!(
            registry.create_user(user).await,
            Err(CoreError::MissingField("email"))
        ));
    }

    #[tokio::test]
    async fn malformed_story_id_fails_before_any_write() {
        let registry = registry();
        let author = registry.create_user(new_user(UserKind::Student)).await.unwrap();

        let result = registry
            .create_paragraph(
                &author.id.to_string(),
                NewParagraph {
                    story_id: "not-an-id".to_string(),
                    content: "text".to_string(),
                    drawing: None,
                    order: 0,
                },
            )
            .await;
        assert!(matches!(result, Err(CoreError::InvalidIdentifier(_))));

        let rows = registry.store().find_all(collections::PARAGRAPHS).await.unwrap();
        assert!(rows.is_empty(), "bad input must not leave partial writes");
    }

    #[tokio::test]
    async fn creating_a_paragraph_attaches_it_to_the_author() {
        let registry = registry();
        let author = registry.create_user(new_user(UserKind::Student)).await.unwrap();
        let story = registry.create_story(new_story()).await.unwrap();

        let paragraph = registry
            .create_paragraph(
                &author.id.to_string(),
                NewParagraph {
                    story_id: story.id.to_string(),
                    content: "First paragraph".to_string(),
                    drawing: None,
                    order: 0,
                },
            )
            .await
            .unwrap();

        let author = registry.user(&author.id.to_string()).await.unwrap();
        assert_eq!(author.paragraphs, vec![paragraph.id]);
    }

    #[tokio::test]
    async fn paragraph_create_for_missing_author_leaves_no_orphan() {
        let registry = registry();
        let story = registry.create_story(new_story()).await.unwrap();

        let result = registry
            .create_paragraph(
                &EntityId::generate().to_string(),
                NewParagraph {
                    story_id: story.id.to_string(),
                    content: "text".to_string(),
                    drawing: None,
                    order: 0,
                },
            )
            .await;
        assert!(matches!(result, Err(CoreError::NotFound { kind: "user", .. })));

        let rows = registry.store().find_all(collections::PARAGRAPHS).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn story_paragraphs_come_back_in_display_order() {
        let registry = registry();
        let author = registry.create_user(new_user(UserKind::Student)).await.unwrap();
        let story = registry.create_story(new_story()).await.unwrap();

        for order in [2_i64, 0, 1] {
            registry
                .create_paragraph(
                    &author.id.to_string(),
                    NewParagraph {
                        story_id: story.id.to_string(),
                        content: format!("paragraph {order}"),
                        drawing: None,
                        order,
                    },
                )
                .await
                .unwrap();
        }

        let ordered = registry.story_paragraphs(&story.id.to_string()).await.unwrap();
        let orders: Vec<i64> = ordered.iter().map(|p| p.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn equal_orders_fall_back_to_creation_order() {
        let registry = registry();
        let author = registry.create_user(new_user(UserKind::Student)).await.unwrap();
        let story = registry.create_story(new_story()).await.unwrap();

        let mut created = Vec::new();
        for i in 0..3 {
            let p = registry
                .create_paragraph(
                    &author.id.to_string(),
                    NewParagraph {
                        story_id: story.id.to_string(),
                        content: format!("tied {i}"),
                        drawing: None,
                        order: 7,
                    },
                )
                .await
                .unwrap();
            created.push(p.id);
        }

        let ordered = registry.story_paragraphs(&story.id.to_string()).await.unwrap();
        let ids: Vec<EntityId> = ordered.iter().map(|p| p.id).collect();
        assert_eq!(ids, created);
    }

    #[tokio::test]
    async fn empty_patches_are_rejected_before_the_store() {
        let registry = registry();
        let story = registry.create_story(new_story()).await.unwrap();
        let result = registry
            .update_story(&story.id.to_string(), StoryPatch::default())
            .await;
        assert!(matches!(result, Err(CoreError::EmptyUpdate)));
    }

    #[tokio::test]
    async fn updating_a_missing_story_reports_not_found() {
        let registry = registry();
        let patch = StoryPatch { title: Some("New".to_string()), ..Default::default() };
        let result = registry
            .update_story(&EntityId::generate().to_string(), patch)
            .await;
        assert!(matches!(result, Err(CoreError::NotFound { kind: "story", .. })));
    }

    #[tokio::test]
    async fn class_creation_validates_every_referenced_id() {
        let registry = registry();
        let teacher = registry.create_user(new_user(UserKind::Teacher)).await.unwrap();

        let result = registry
            .create_class(NewClass {
                class_name: "3.a".to_string(),
                teacher_id: teacher.id.to_string(),
                students: vec!["garbage".to_string()],
                stories: vec![],
                color: None,
            })
            .await;
        assert!(matches!(result, Err(CoreError::InvalidIdentifier(_))));

        let rows = registry.store().find_all(collections::CLASSES).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn classes_default_to_the_standard_color() {
        let registry = registry();
        let teacher = registry.create_user(new_user(UserKind::Teacher)).await.unwrap();

        let class = registry
            .create_class(NewClass {
                class_name: "3.a".to_string(),
                teacher_id: teacher.id.to_string(),
                students: vec![],
                stories: vec![],
                color: None,
            })
            .await
            .unwrap();

        assert_eq!(class.color, DEFAULT_CLASS_COLOR);
        assert!(class.finalized_stories.is_empty());
    }

    #[tokio::test]
    async fn explicit_null_clears_a_drawing() {
        let registry = registry();
        let author = registry.create_user(new_user(UserKind::Student)).await.unwrap();
        let story = registry.create_story(new_story()).await.unwrap();
        let paragraph = registry
            .create_paragraph(
                &author.id.to_string(),
                NewParagraph {
                    story_id: story.id.to_string(),
                    content: "text".to_string(),
                    drawing: Some("sketch".to_string()),
                    order: 0,
                },
            )
            .await
            .unwrap();

        let updated = registry
            .update_paragraph(
                &paragraph.id.to_string(),
                ParagraphPatch { drawing: Some(None), ..Default::default() },
            )
            .await
            .unwrap();
        assert!(updated.drawing.is_none());
    }
}
