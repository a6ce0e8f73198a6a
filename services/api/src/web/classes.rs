//! services/api/src/web/classes.rs
//!
//! Class endpoints: CRUD, roster maintenance and the finalization archive.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use fabula_core::{ClassPatch, Finalized, NewClass};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::web::{envelope, error_body, reject, state::AppState, Rejection};

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct AppendImageRequest {
    pub image: String,
}

/// The payload returned by a successful finalization.
#[derive(Serialize)]
pub struct FinalizeResponse {
    pub message: &'static str,
    pub paragraphs_count: usize,
    pub entry: fabula_core::FinalizedStory,
}

impl From<Finalized> for FinalizeResponse {
    fn from(finalized: Finalized) -> Self {
        Self {
            message: "Story finalized successfully",
            paragraphs_count: finalized.archived_count,
            entry: finalized.entry,
        }
    }
}

//=========================================================================================
// CRUD Handlers
//=========================================================================================

/// GET /api/classes - List all classes.
#[utoipa::path(
    get,
    path = "/api/classes",
    responses(
        (status = 200, description = "All classes"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_classes_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, Rejection> {
    let classes = state.registry.classes().await.map_err(reject)?;
    Ok(envelope(classes))
}

/// GET /api/classes/{class_id} - Fetch one class.
#[utoipa::path(
    get,
    path = "/api/classes/{class_id}",
    params(("class_id" = String, Path, description = "The class to fetch")),
    responses(
        (status = 200, description = "The class"),
        (status = 404, description = "Class not found")
    )
)]
pub async fn get_class_handler(
    State(state): State<Arc<AppState>>,
    Path(class_id): Path<String>,
) -> Result<impl IntoResponse, Rejection> {
    let class = state.registry.class(&class_id).await.map_err(reject)?;
    Ok(envelope(class))
}

/// POST /api/classes - Create a class.
#[utoipa::path(
    post,
    path = "/api/classes",
    request_body = serde_json::Value,
    responses(
        (status = 201, description = "Class created"),
        (status = 400, description = "Invalid request")
    )
)]
pub async fn create_class_handler(
    State(state): State<Arc<AppState>>,
    axum::Json(req): axum::Json<NewClass>,
) -> Result<impl IntoResponse, Rejection> {
    let class = state.registry.create_class(req).await.map_err(reject)?;
    Ok((StatusCode::CREATED, envelope(class)))
}

/// PATCH /api/classes/{class_id} - Partially update a class.
///
/// The finalized-story archive is not patchable; it only grows through
/// the finalization endpoints.
#[utoipa::path(
    patch,
    path = "/api/classes/{class_id}",
    params(("class_id" = String, Path, description = "The class to update")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Updated class"),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Class not found")
    )
)]
pub async fn update_class_handler(
    State(state): State<Arc<AppState>>,
    Path(class_id): Path<String>,
    axum::Json(patch): axum::Json<ClassPatch>,
) -> Result<impl IntoResponse, Rejection> {
    let class = state
        .registry
        .update_class(&class_id, patch)
        .await
        .map_err(reject)?;
    Ok(envelope(class))
}

/// DELETE /api/classes/{class_id} - Delete a class.
#[utoipa::path(
    delete,
    path = "/api/classes/{class_id}",
    params(("class_id" = String, Path, description = "The class to delete")),
    responses(
        (status = 200, description = "Deleted class id"),
        (status = 404, description = "Class not found")
    )
)]
pub async fn delete_class_handler(
    State(state): State<Arc<AppState>>,
    Path(class_id): Path<String>,
) -> Result<impl IntoResponse, Rejection> {
    let deleted = state.cascade.delete_class(&class_id).await.map_err(reject)?;
    Ok(envelope(deleted.to_string()))
}

//=========================================================================================
// Roster and Archive Handlers
//=========================================================================================

/// DELETE /api/classes/{class_id}/students/{student_id} - Unenroll a student.
#[utoipa::path(
    delete,
    path = "/api/classes/{class_id}/students/{student_id}",
    params(
        ("class_id" = String, Path, description = "The class"),
        ("student_id" = String, Path, description = "The student to remove")
    ),
    responses(
        (status = 200, description = "Student removed"),
        (status = 400, description = "Student was not on the roster"),
        (status = 404, description = "Class not found")
    )
)]
pub async fn remove_student_handler(
    State(state): State<Arc<AppState>>,
    Path((class_id, student_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, Rejection> {
    let removed = state
        .cascade
        .remove_student_from_class(&class_id, &student_id)
        .await
        .map_err(reject)?;
    if !removed {
        return Err((StatusCode::BAD_REQUEST, error_body("No student removed")));
    }
    Ok(envelope(true))
}

/// POST /api/classes/{class_id}/finalize-story/{story_id} - Finalize a story.
///
/// Snapshots the story's paragraphs into the class archive and retracts the
/// story from the class's active set.
#[utoipa::path(
    post,
    path = "/api/classes/{class_id}/finalize-story/{story_id}",
    params(
        ("class_id" = String, Path, description = "The archiving class"),
        ("story_id" = String, Path, description = "The story to finalize")
    ),
    responses(
        (status = 200, description = "Story finalized"),
        (status = 404, description = "Class or story missing, or story has no paragraphs"),
        (status = 500, description = "Archive or retraction step failed")
    )
)]
pub async fn finalize_story_handler(
    State(state): State<Arc<AppState>>,
    Path((class_id, story_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, Rejection> {
    let finalized = state
        .finalize
        .finalize(&class_id, &story_id)
        .await
        .map_err(reject)?;
    Ok(envelope(FinalizeResponse::from(finalized)))
}

/// POST /api/classes/{class_id}/finalized-stories/{story_id}/images -
/// Attach an image to an existing archive entry.
#[utoipa::path(
    post,
    path = "/api/classes/{class_id}/finalized-stories/{story_id}/images",
    params(
        ("class_id" = String, Path, description = "The class holding the entry"),
        ("story_id" = String, Path, description = "The archived story")
    ),
    request_body = AppendImageRequest,
    responses(
        (status = 200, description = "Image appended"),
        (status = 400, description = "No finalized entry for this story")
    )
)]
pub async fn append_image_handler(
    State(state): State<Arc<AppState>>,
    Path((class_id, story_id)): Path<(String, String)>,
    axum::Json(req): axum::Json<AppendImageRequest>,
) -> Result<impl IntoResponse, Rejection> {
    state
        .finalize
        .append_image(&class_id, &story_id, &req.image)
        .await
        .map_err(reject)?;
    Ok(envelope(true))
}
