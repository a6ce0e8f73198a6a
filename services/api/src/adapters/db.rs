//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete
//! implementation of the `DocumentStore` port from the core crate. Entities
//! live as JSONB blobs in a single `documents` table, namespaced by
//! collection. Array mutations run as row-locked read-modify-write
//! transactions, which gives exactly the single-document atomicity the
//! port promises and nothing more.

use async_trait::async_trait;
use chrono::Utc;
use fabula_core::domain::EntityId;
use fabula_core::ports::{Document, DocumentStore, StoreError, StoreResult};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A Postgres-backed document store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new `PgStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// Row and Error Conversion Helpers
//=========================================================================================

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn codec(e: serde_json::Error) -> StoreError {
    StoreError::Codec(e.to_string())
}

fn as_document(value: Value) -> StoreResult<Document> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::Codec("stored document is not a JSON object".to_string())),
    }
}

fn doc_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<Document> {
    let Json(value): Json<Value> = row.try_get("doc").map_err(backend)?;
    as_document(value)
}

fn mutate_array(doc: &mut Document, field: &str, value: &Value) -> bool {
    match doc.get_mut(field).and_then(Value::as_array_mut) {
        Some(items) => {
            let before = items.len();
            items.retain(|item| item != value);
            items.len() != before
        }
        None => false,
    }
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for PgStore {
    async fn find_by_id(&self, collection: &str, id: EntityId) -> StoreResult<Option<Document>> {
        let row = sqlx::query("SELECT doc FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(doc_from_row).transpose()
    }

    async fn find_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT doc FROM documents WHERE collection = $1 ORDER BY doc->>'created_at'",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(doc_from_row).collect()
    }

    async fn find_where(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT doc FROM documents \
             WHERE collection = $1 AND doc -> $2::text = $3 \
             ORDER BY doc->>'created_at'",
        )
        .bind(collection)
        .bind(field)
        .bind(Json(value))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(doc_from_row).collect()
    }

    async fn insert(&self, collection: &str, mut doc: Document) -> StoreResult<Document> {
        let id = EntityId::generate();
        doc.insert("id".to_string(), Value::String(id.to_string()));
        doc.insert("created_at".to_string(), serde_json::to_value(Utc::now()).map_err(codec)?);

        sqlx::query("INSERT INTO documents (collection, id, doc) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(id.to_string())
            .bind(Json(Value::Object(doc.clone())))
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(doc)
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: EntityId,
        changes: Document,
    ) -> StoreResult<Option<Document>> {
        let result = self
            .modify(collection, id, |doc| {
                for (key, value) in changes {
                    doc.insert(key, value);
                }
                doc.insert(
                    "updated_at".to_string(),
                    serde_json::to_value(Utc::now()).map_err(codec)?,
                );
                Ok(true)
            })
            .await?;
        Ok(result.map(|(doc, _)| doc))
    }

    async fn delete_by_id(
        &self,
        collection: &str,
        id: EntityId,
    ) -> StoreResult<Option<Document>> {
        let row = sqlx::query(
            "DELETE FROM documents WHERE collection = $1 AND id = $2 RETURNING doc",
        )
        .bind(collection)
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(doc_from_row).transpose()
    }

    async fn push_by_id(
        &self,
        collection: &str,
        id: EntityId,
        field: &str,
        value: Value,
    ) -> StoreResult<Option<Document>> {
        let result = self
            .modify(collection, id, |doc| {
                doc.entry(field.to_string())
                    .or_insert_with(|| Value::Array(Vec::new()))
                    .as_array_mut()
                    .ok_or_else(|| StoreError::Codec(format!("field '{field}' is not an array")))?
                    .push(value);
                Ok(true)
            })
            .await?;
        Ok(result.map(|(doc, _)| doc))
    }

    async fn pull_by_id(
        &self,
        collection: &str,
        id: EntityId,
        field: &str,
        value: &Value,
    ) -> StoreResult<bool> {
        let result = self
            .modify(collection, id, |doc| Ok(mutate_array(doc, field, value)))
            .await?;
        Ok(result.map(|(_, changed)| changed).unwrap_or(false))
    }

    async fn pull_everywhere(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let rows = sqlx::query("SELECT id, doc FROM documents WHERE collection = $1 FOR UPDATE")
            .bind(collection)
            .fetch_all(&mut *tx)
            .await
            .map_err(backend)?;

        let mut modified = 0;
        for row in &rows {
            let id: String = row.try_get("id").map_err(backend)?;
            let mut doc = doc_from_row(row)?;
            if mutate_array(&mut doc, field, value) {
                sqlx::query("UPDATE documents SET doc = $3 WHERE collection = $1 AND id = $2")
                    .bind(collection)
                    .bind(id)
                    .bind(Json(Value::Object(doc)))
                    .execute(&mut *tx)
                    .await
                    .map_err(backend)?;
                modified += 1;
            }
        }

        tx.commit().await.map_err(backend)?;
        Ok(modified)
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
        let result = self
            .modify(collection, id, |doc| {
                let Some(entries) = doc.get_mut(array_field).and_then(Value::as_array_mut) else {
                    return Ok(false);
                };
                // First matching element only, like a positional update.
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
                    .ok_or_else(|| {
                        StoreError::Codec(format!("field '{inner_field}' is not an array"))
                    })?
                    .push(value);
                Ok(true)
            })
            .await?;
        Ok(result.map(|(_, changed)| changed).unwrap_or(false))
    }
}

impl PgStore {
    /// Shared read-modify-write path for single-document mutations.
    ///
    /// Locks the row, applies `apply` to the decoded document and writes it
    /// back when `apply` reports a change. Returns `None` when the document
    /// does not exist.
    async fn modify<F>(
        &self,
        collection: &str,
        id: EntityId,
        apply: F,
    ) -> StoreResult<Option<(Document, bool)>>
    where
        F: FnOnce(&mut Document) -> StoreResult<bool> + Send,
    {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let row = sqlx::query(
            "SELECT doc FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
        )
        .bind(collection)
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut doc = doc_from_row(&row)?;
        let changed = apply(&mut doc)?;
        if changed {
            sqlx::query("UPDATE documents SET doc = $3 WHERE collection = $1 AND id = $2")
                .bind(collection)
                .bind(id.to_string())
                .bind(Json(Value::Object(doc.clone())))
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)?;
        Ok(Some((doc, changed)))
    }
}
