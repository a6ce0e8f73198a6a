//! crates/fabula_core/src/lib.rs
//!
//! The core of the platform: domain types, the document-store port, the
//! typed entity registry, cascading delete maintenance and the story
//! finalization engine. Transport and storage backends live in the service
//! crates and plug in through [`ports::DocumentStore`].

pub mod cascade;
pub mod domain;
pub mod error;
pub mod finalize;
pub mod memory;
pub mod ports;
pub mod registry;

pub use cascade::CascadeService;
pub use domain::{
    Class, ClassPatch, EntityId, FinalizedStory, NewClass, NewParagraph, NewStory, NewUser,
    Paragraph, ParagraphPatch, ParagraphSnapshot, Story, StoryPatch, StorySummary, User,
    UserKind, UserPatch,
};
pub use error::{CoreError, CoreResult};
pub use finalize::{Finalized, FinalizeService};
pub use memory::MemoryStore;
pub use ports::{collections, Document, DocumentStore, StoreError, StoreResult};
pub use registry::Registry;
