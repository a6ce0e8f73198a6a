//! services/api/src/web/paragraphs.rs
//!
//! Paragraph endpoints. Creation runs through the registry so the new row
//! and the author's back-reference stay consistent; deletion runs through
//! the cascade service for the same reason.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use fabula_core::{NewParagraph, ParagraphPatch};
use std::sync::Arc;

use crate::web::{envelope, reject, state::AppState, Rejection};

/// POST /api/users/{user_id}/paragraphs - Attach a new paragraph.
#[utoipa::path(
    post,
    path = "/api/users/{user_id}/paragraphs",
    params(("user_id" = String, Path, description = "The authoring user")),
    request_body = serde_json::Value,
    responses(
        (status = 201, description = "Paragraph created"),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Author not found")
    )
)]
pub async fn create_paragraph_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    axum::Json(req): axum::Json<NewParagraph>,
) -> Result<impl IntoResponse, Rejection> {
    let paragraph = state
        .registry
        .create_paragraph(&user_id, req)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, envelope(paragraph)))
}

/// GET /api/paragraphs/{paragraph_id} - Fetch one paragraph.
#[utoipa::path(
    get,
    path = "/api/paragraphs/{paragraph_id}",
    params(("paragraph_id" = String, Path, description = "The paragraph to fetch")),
    responses(
        (status = 200, description = "The paragraph"),
        (status = 404, description = "Paragraph not found")
    )
)]
pub async fn get_paragraph_handler(
    State(state): State<Arc<AppState>>,
    Path(paragraph_id): Path<String>,
) -> Result<impl IntoResponse, Rejection> {
    let paragraph = state
        .registry
        .paragraph(&paragraph_id)
        .await
        .map_err(reject)?;
    Ok(envelope(paragraph))
}

/// PATCH /api/paragraphs/{paragraph_id} - Partially update a paragraph.
///
/// Sending `"drawing": null` clears the stored drawing.
#[utoipa::path(
    patch,
    path = "/api/paragraphs/{paragraph_id}",
    params(("paragraph_id" = String, Path, description = "The paragraph to update")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Updated paragraph"),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Paragraph not found")
    )
)]
pub async fn update_paragraph_handler(
    State(state): State<Arc<AppState>>,
    Path(paragraph_id): Path<String>,
    axum::Json(patch): axum::Json<ParagraphPatch>,
) -> Result<impl IntoResponse, Rejection> {
    let paragraph = state
        .registry
        .update_paragraph(&paragraph_id, patch)
        .await
        .map_err(reject)?;
    Ok(envelope(paragraph))
}

/// DELETE /api/paragraphs/{paragraph_id} - Delete a paragraph.
#[utoipa::path(
    delete,
    path = "/api/paragraphs/{paragraph_id}",
    params(("paragraph_id" = String, Path, description = "The paragraph to delete")),
    responses(
        (status = 200, description = "Deleted paragraph id"),
        (status = 404, description = "Paragraph not found")
    )
)]
pub async fn delete_paragraph_handler(
    State(state): State<Arc<AppState>>,
    Path(paragraph_id): Path<String>,
) -> Result<impl IntoResponse, Rejection> {
    let deleted = state
        .cascade
        .delete_paragraph(&paragraph_id)
        .await
        .map_err(reject)?;
    Ok(envelope(deleted.to_string()))
}
