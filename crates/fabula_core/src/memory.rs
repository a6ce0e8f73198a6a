//! crates/fabula_core/src/memory.rs
//!
//! An in-memory [`DocumentStore`] backend. Serves the core test suites and
//! any embedded usage that does not need durable storage. Collections keep
//! insertion order so scans behave like the production backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::domain::EntityId;
use crate::ports::{Document, DocumentStore, StoreError, StoreResult};

/// A document store held entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn id_value(id: EntityId) -> Value {
    Value::String(id.to_string())
}

fn doc_matches(doc: &Document, field: &str, value: &Value) -> bool {
    doc.get(field) == Some(value)
}

fn array_field<'a>(doc: &'a mut Document, field: &str) -> StoreResult<&'a mut Vec<Value>> {
    doc.entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| StoreError::Codec(format!("field '{field}' is not an array")))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_by_id(&self, collection: &str, id: EntityId) -> StoreResult<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| doc_matches(d, "id", &id_value(id))))
            .cloned())
    }

    async fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).cloned().unwrap_or_default())
    }

    async fn find_where(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<Vec<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| doc_matches(d, field, value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, collection: &str, mut doc: Document) -> StoreResult<Document> {
        let mut collections = self.collections.write().await;
        doc.insert("id".to_string(), id_value(EntityId::generate()));
        doc.insert(
            "created_at".to_string(),
            serde_json::to_value(Utc::now()).map_err(|e| StoreError::Codec(e.to_string()))?,
        );
        collections
            .entry(collection.to_string())
            .or_default()
            .push(doc.clone());
        Ok(doc)
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: EntityId,
        changes: Document,
    ) -> StoreResult<Option<Document>> {
        let mut collections = self.collections.write().await;
        let Some(doc) = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| doc_matches(d, "id", &id_value(id))))
        else {
            return Ok(None);
        };
        for (key, value) in changes {
            doc.insert(key, value);
        }
        doc.insert(
            "updated_at".to_string(),
            serde_json::to_value(Utc::now()).map_err(|e| StoreError::Codec(e.to_string()))?,
        );
        Ok(Some(doc.clone()))
    }

    async fn delete_by_id(
        &self,
        collection: &str,
        id: EntityId,
    ) -> StoreResult<Option<Document>> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(None);
        };
        let Some(index) = docs.iter().position(|d| doc_matches(d, "id", &id_value(id))) else {
            return Ok(None);
        };
        Ok(Some(docs.remove(index)))
    }

    async fn push_by_id(
        &self,
        collection: &str,
        id: EntityId,
        field: &str,
        value: Value,
    ) -> StoreResult<Option<Document>> {
        let mut collections = self.collections.write().await;
        let Some(doc) = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| doc_matches(d, "id", &id_value(id))))
        else {
            return Ok(None);
        };
        array_field(doc, field)?.push(value);
        Ok(Some(doc.clone()))
    }

    async fn pull_by_id(
        &self,
        collection: &str,
        id: EntityId,
        field: &str,
        value: &Value,
    ) -> StoreResult<bool> {
        let mut collections = self.collections.write().await;
        let Some(doc) = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| doc_matches(d, "id", &id_value(id))))
        else {
            return Ok(false);
        };
        let items = array_field(doc, field)?;
        let before = items.len();
        items.retain(|item| item != value);
        Ok(items.len() != before)
    }

    async fn pull_everywhere(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<u64> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut modified = 0;
        for doc in docs.iter_mut() {
            if let Some(items) = doc.get_mut(field).and_then(Value::as_array_mut) {
                let before = items.len();
                items.retain(|item| item != value);
                if items.len() != before {
                    modified += 1;
                }
            }
        }
        Ok(modified)
    }

    async fn push_to_entry(
        &self,
        collection: &str,
        id: EntityId,
        array_field_name: &str,
        key_field: &str,
        key: &Value,
        inner_field: &str,
        value: Value,
    ) -> StoreResult<bool> {
        let mut collections = self.collections.write().await;
        let Some(doc) = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| doc_matches(d, "id", &id_value(id))))
        else {
            return Ok(false);
        };
        let Some(entries) = doc.get_mut(array_field_name).and_then(Value::as_array_mut) else {
            return Ok(false);
        };
        // First matching element only, like a positional array update.
        let Some(entry) = entries
            .iter_mut()
            .filter_map(Value::as_object_mut)
            .find(|e| e.get(key_field) == Some(key))
        else {
            return Ok(false);
        };
        entry
            .entry(inner_field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()))
            .as_array_mut()
            .ok_or_else(|| StoreError::Codec(format!("field '{inner_field}' is not an array")))?
            .push(value);
        Ok(true)
    }
}

//=========================================================================================
// Test Support
//=========================================================================================

/// A wrapper store that fails selected operations, used by the service test
/// suites to exercise the partial-failure contracts.
#[cfg(test)]
pub(crate) struct FaultyStore {
    pub inner: MemoryStore,
    pub fail_push_by_id: bool,
    pub fail_pull_by_id: bool,
    pub fail_pull_everywhere: bool,
    /// Fail deletes, but only in the named collection.
    pub fail_delete_in: Option<&'static str>,
}

#[cfg(test)]
impl FaultyStore {
    pub fn wrapping(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_push_by_id: false,
            fail_pull_by_id: false,
            fail_pull_everywhere: false,
            fail_delete_in: None,
        }
    }

    fn fault() -> StoreError {
        StoreError::Backend("injected fault".to_string())
    }
}

#[cfg(test)]
#[async_trait]
impl DocumentStore for FaultyStore {
    async fn find_by_id(&self, collection: &str, id: EntityId) -> StoreResult<Option<Document>> {
        self.inner.find_by_id(collection, id).await
    }

    async fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        self.inner.find_all(collection).await
    }

    async fn find_where(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<Vec<Document>> {
        self.inner.find_where(collection, field, value).await
    }

    async fn insert(&self, collection: &str, doc: Document) -> StoreResult<Document> {
        self.inner.insert(collection, doc).await
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: EntityId,
        changes: Document,
    ) -> StoreResult<Option<Document>> {
        self.inner.update_by_id(collection, id, changes).await
    }

    async fn delete_by_id(
        &self,
        collection: &str,
        id: EntityId,
    ) -> StoreResult<Option<Document>> {
        if self.fail_delete_in == Some(collection) {
            return Err(Self::fault());
        }
        self.inner.delete_by_id(collection, id).await
    }

    async fn push_by_id(
        &self,
        collection: &str,
        id: EntityId,
        field: &str,
        value: Value,
    ) -> StoreResult<Option<Document>> {
        if self.fail_push_by_id {
            return Err(Self::fault());
        }
        self.inner.push_by_id(collection, id, field, value).await
    }

    async fn pull_by_id(
        &self,
        collection: &str,
        id: EntityId,
        field: &str,
        value: &Value,
    ) -> StoreResult<bool> {
        if self.fail_pull_by_id {
            return Err(Self::fault());
        }
        self.inner.pull_by_id(collection, id, field, value).await
    }

    async fn pull_everywhere(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<u64> {
        if self.fail_pull_everywhere {
            return Err(Self::fault());
        }
        self.inner.pull_everywhere(collection, field, value).await
    }

    async fn push_to_entry(
        &self,
        collection: &str,
        id: EntityId,
        array_field: &str,
        key_field: &str,
        key: &Value,
        inner_field: &str,
        value: Value,
    ) -> StoreResult<bool> {
        self.inner
            .push_to_entry(collection, id, array_field, key_field, key, inner_field, value)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn seeded(store: &MemoryStore) -> EntityId {
        let mut doc = Document::new();
        doc.insert("tags".to_string(), json!(["a", "b", "a"]));
        let stored = store.insert("things", doc).await.unwrap();
        EntityId::parse(stored.get("id").unwrap().as_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn insert_assigns_id_and_created_at() {
        let store = MemoryStore::new();
        let stored = store.insert("things", Document::new()).await.unwrap();
        assert!(stored.contains_key("id"));
        assert!(stored.contains_key("created_at"));
    }

    #[tokio::test]
    async fn pull_by_id_removes_all_occurrences() {
        let store = MemoryStore::new();
        let id = seeded(&store).await;

        assert!(store.pull_by_id("things", id, "tags", &json!("a")).await.unwrap());
        let doc = store.find_by_id("things", id).await.unwrap().unwrap();
        assert_eq!(doc.get("tags").unwrap(), &json!(["b"]));

        // Second pull of the same value is a no-op.
        assert!(!store.pull_by_id("things", id, "tags", &json!("a")).await.unwrap());
    }

    #[tokio::test]
    async fn pull_everywhere_counts_modified_documents() {
        let store = MemoryStore::new();
        seeded(&store).await;
        seeded(&store).await;
        let mut unrelated = Document::new();
        unrelated.insert("tags".to_string(), json!(["c"]));
        store.insert("things", unrelated).await.unwrap();

        let modified = store.pull_everywhere("things", "tags", &json!("a")).await.unwrap();
        assert_eq!(modified, 2);
    }

    #[tokio::test]
    async fn push_by_id_creates_missing_array_field() {
        let store = MemoryStore::new();
        let id = seeded(&store).await;
        let doc = store
            .push_by_id("things", id, "labels", json!("new"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.get("labels").unwrap(), &json!(["new"]));
    }

    #[tokio::test]
    async fn push_to_entry_targets_first_match_only() {
        let store = MemoryStore::new();
        let mut doc = Document::new();
        doc.insert(
            "entries".to_string(),
            json!([
                {"key": "k1", "images": []},
                {"key": "k1", "images": ["existing"]},
            ]),
        );
        let stored = store.insert("things", doc).await.unwrap();
        let id = EntityId::parse(stored.get("id").unwrap().as_str().unwrap()).unwrap();

        let pushed = store
            .push_to_entry("things", id, "entries", "key", &json!("k1"), "images", json!("img"))
            .await
            .unwrap();
        assert!(pushed);

        let doc = store.find_by_id("things", id).await.unwrap().unwrap();
        let entries = doc.get("entries").unwrap().as_array().unwrap();
        assert_eq!(entries[0].get("images").unwrap(), &json!(["img"]));
        assert_eq!(entries[1].get("images").unwrap(), &json!(["existing"]));
    }

    #[tokio::test]
    async fn push_to_entry_without_match_reports_false() {
        let store = MemoryStore::new();
        let id = seeded(&store).await;
        let pushed = store
            .push_to_entry("things", id, "entries", "key", &json!("k1"), "images", json!("img"))
            .await
            .unwrap();
        assert!(!pushed);
    }

    #[tokio::test]
    async fn delete_by_id_returns_the_removed_document() {
        let store = MemoryStore::new();
        let id = seeded(&store).await;
        let removed = store.delete_by_id("things", id).await.unwrap();
        assert!(removed.is_some());
        assert!(store.find_by_id("things", id).await.unwrap().is_none());
        assert!(store.delete_by_id("things", id).await.unwrap().is_none());
    }
}
