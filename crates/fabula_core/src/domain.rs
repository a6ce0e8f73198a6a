//! crates/fabula_core/src/domain.rs
//!
//! Defines the pure, core data structures for the platform.
//! These structs are independent of any database or transport format;
//! they round-trip through store documents via serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Default accent color assigned to newly created classes.
pub const DEFAULT_CLASS_COLOR: &str = "#57E6FF";

/// An opaque, globally unique entity identifier.
///
/// Stored as its canonical string form inside documents so that ids stay
/// comparable across collections and across store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Generates a fresh identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a raw identifier received from a caller.
    ///
    /// Malformed input is rejected here, before any store call is made.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|_| CoreError::InvalidIdentifier(raw.to_string()))
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Discriminates the two account roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserKind {
    Student,
    Teacher,
}

/// A platform account. Students carry a unique login `code` and the list of
/// paragraph ids they authored; teachers carry neither.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    pub name: String,
    pub surname: String,
    pub email: String,
    /// Argon2 hash, never a plain password.
    pub password: String,
    #[serde(rename = "type")]
    pub kind: UserKind,
    /// Present iff the user is a student. Unique across all students.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Unordered set of paragraph ids authored by this user.
    #[serde(default)]
    pub paragraphs: Vec<EntityId>,
}

impl User {
    pub fn is_teacher(&self) -> bool {
        self.kind == UserKind::Teacher
    }
}

/// Fields required to create a user. The password must already be hashed
/// by the caller; student codes are allocated by the registry.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password: String,
    pub kind: UserKind,
}

/// Partial update for a user. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    /// Replaces the authored-paragraph reference list wholesale.
    pub paragraphs: Option<Vec<String>>,
}

/// A collaboratively authored story. The row stays live after finalization
/// so other classes can keep using it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: EntityId,
    pub title: String,
    pub author: String,
    pub short_description: String,
    pub content: String,
    pub is_finished: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewStory {
    pub title: String,
    pub author: String,
    pub short_description: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoryPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub short_description: Option<String>,
    pub content: Option<String>,
    pub is_finished: Option<bool>,
}

/// One ordered contribution to a story, written by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paragraph {
    pub id: EntityId,
    pub story_id: EntityId,
    pub user_id: EntityId,
    pub content: String,
    /// Optional image payload reference (base64 blob or URL).
    #[serde(default)]
    pub drawing: Option<String>,
    #[serde(default)]
    pub order: i64,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted when attaching a new paragraph to a story.
/// Identifier fields arrive raw and are validated by the registry.
#[derive(Debug, Clone, Deserialize)]
pub struct NewParagraph {
    pub story_id: String,
    pub content: String,
    #[serde(default)]
    pub drawing: Option<String>,
    #[serde(default)]
    pub order: i64,
}

/// Partial update for a paragraph.
///
/// `drawing` is doubly optional so a caller can distinguish "leave as is"
/// (absent) from "clear the drawing" (explicit null).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParagraphPatch {
    pub story_id: Option<String>,
    pub content: Option<String>,
    #[serde(default, deserialize_with = "deserialize_explicit_null")]
    pub drawing: Option<Option<String>>,
    pub order: Option<i64>,
}

fn deserialize_explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// A group of students taught by one teacher around a curated story set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Class {
    pub id: EntityId,
    pub class_name: String,
    pub teacher_id: EntityId,
    /// Roster of enrolled students.
    #[serde(default)]
    pub students: Vec<EntityId>,
    /// The active curriculum: story ids currently open for work.
    #[serde(default)]
    pub stories: Vec<EntityId>,
    /// Append-only archive of finalized stories. Entries are never edited
    /// in place; only new entries or image appends may grow it.
    #[serde(default)]
    pub finalized_stories: Vec<FinalizedStory>,
    pub color: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewClass {
    pub class_name: String,
    pub teacher_id: String,
    #[serde(default)]
    pub students: Vec<String>,
    #[serde(default)]
    pub stories: Vec<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// Partial update for a class. The finalized-story archive is deliberately
/// absent: it can only grow through the finalization engine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassPatch {
    pub class_name: Option<String>,
    pub teacher_id: Option<String>,
    pub students: Option<Vec<String>>,
    pub stories: Option<Vec<String>>,
    pub color: Option<String>,
}

/// An immutable archived snapshot of one story, owned by exactly one class.
///
/// Captures the story's display metadata and the full ordered paragraph set
/// at finalization time; later edits to the live story or its paragraphs do
/// not reach this copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizedStory {
    pub story_id: EntityId,
    pub paragraphs: Vec<ParagraphSnapshot>,
    pub story: StorySummary,
    /// Images attached to the archive entry after finalization.
    #[serde(default)]
    pub images: Vec<String>,
}

/// Point-in-time copy of one paragraph inside a finalized entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParagraphSnapshot {
    pub paragraph_id: EntityId,
    pub content: String,
    #[serde(default)]
    pub drawing: Option<String>,
    pub order: i64,
}

/// Story display metadata captured at finalization time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorySummary {
    pub title: String,
    pub short_description: String,
    pub author: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_round_trips_through_its_string_form() {
        let id = EntityId::generate();
        let parsed = EntityId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn malformed_identifiers_are_rejected() {
        assert!(matches!(
            EntityId::parse("not-a-uuid"),
            Err(CoreError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            EntityId::parse(""),
            Err(CoreError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn paragraph_patch_distinguishes_absent_from_null_drawing() {
        let absent: ParagraphPatch = serde_json::from_str(r#"{"content":"x"}"#).unwrap();
        assert!(absent.drawing.is_none());

        let cleared: ParagraphPatch = serde_json::from_str(r#"{"drawing":null}"#).unwrap();
        assert_eq!(cleared.drawing, Some(None));

        let set: ParagraphPatch = serde_json::from_str(r#"{"drawing":"img"}"#).unwrap();
        assert_eq!(set.drawing, Some(Some("img".to_string())));
    }
}
