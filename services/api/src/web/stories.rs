//! services/api/src/web/stories.rs
//!
//! Story endpoints, including the ordered paragraph listing used by the
//! reading view.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use fabula_core::{NewStory, StoryPatch};
use std::sync::Arc;

use crate::web::{envelope, reject, state::AppState, Rejection};

/// GET /api/stories - List all stories.
#[utoipa::path(
    get,
    path = "/api/stories",
    responses(
        (status = 200, description = "All stories"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_stories_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, Rejection> {
    let stories = state.registry.stories().await.map_err(reject)?;
    Ok(envelope(stories))
}

/// POST /api/stories - Create a story.
#[utoipa::path(
    post,
    path = "/api/stories",
    request_body = serde_json::Value,
    responses(
        (status = 201, description = "Story created"),
        (status = 400, description = "Invalid request")
    )
)]
pub async fn create_story_handler(
    State(state): State<Arc<AppState>>,
    axum::Json(req): axum::Json<NewStory>,
) -> Result<impl IntoResponse, Rejection> {
    let story = state.registry.create_story(req).await.map_err(reject)?;
    Ok((StatusCode::CREATED, envelope(story)))
}

/// PATCH /api/stories/{story_id} - Partially update a story.
#[utoipa::path(
    patch,
    path = "/api/stories/{story_id}",
    params(("story_id" = String, Path, description = "The story to update")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Updated story"),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Story not found")
    )
)]
pub async fn update_story_handler(
    State(state): State<Arc<AppState>>,
    Path(story_id): Path<String>,
    axum::Json(patch): axum::Json<StoryPatch>,
) -> Result<impl IntoResponse, Rejection> {
    let story = state
        .registry
        .update_story(&story_id, patch)
        .await
        .map_err(reject)?;
    Ok(envelope(story))
}

/// DELETE /api/stories/{story_id} - Delete a story.
///
/// The story is also retracted from every class's active set; archived
/// copies stay untouched.
#[utoipa::path(
    delete,
    path = "/api/stories/{story_id}",
    params(("story_id" = String, Path, description = "The story to delete")),
    responses(
        (status = 200, description = "Deleted story id"),
        (status = 404, description = "Story not found"),
        (status = 500, description = "Story deleted but reference cleanup incomplete")
    )
)]
pub async fn delete_story_handler(
    State(state): State<Arc<AppState>>,
    Path(story_id): Path<String>,
) -> Result<impl IntoResponse, Rejection> {
    let deleted = state.cascade.delete_story(&story_id).await.map_err(reject)?;
    Ok(envelope(deleted.to_string()))
}

/// GET /api/stories/{story_id}/paragraphs - Paragraphs in display order.
#[utoipa::path(
    get,
    path = "/api/stories/{story_id}/paragraphs",
    params(("story_id" = String, Path, description = "The story to read")),
    responses(
        (status = 200, description = "Paragraphs sorted by display order"),
        (status = 400, description = "Malformed story id")
    )
)]
pub async fn story_paragraphs_handler(
    State(state): State<Arc<AppState>>,
    Path(story_id): Path<String>,
) -> Result<impl IntoResponse, Rejection> {
    let paragraphs = state
        .registry
        .story_paragraphs(&story_id)
        .await
        .map_err(reject)?;
    Ok(envelope(paragraphs))
}
