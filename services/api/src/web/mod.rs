//! services/api/src/web/mod.rs
//!
//! The axum web layer: handler modules, the shared response envelope and
//! the mapping from core errors onto HTTP statuses.

pub mod auth;
pub mod classes;
pub mod paragraphs;
pub mod state;
pub mod stories;
pub mod users;

use axum::http::StatusCode;
use fabula_core::CoreError;
use serde::Serialize;
use tracing::error;
use utoipa::OpenApi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login_handler,
        users::list_users_handler,
        users::create_user_handler,
        users::update_user_handler,
        users::delete_user_handler,
        paragraphs::create_paragraph_handler,
        paragraphs::get_paragraph_handler,
        paragraphs::update_paragraph_handler,
        paragraphs::delete_paragraph_handler,
        stories::list_stories_handler,
        stories::create_story_handler,
        stories::update_story_handler,
        stories::delete_story_handler,
        stories::story_paragraphs_handler,
        classes::list_classes_handler,
        classes::get_class_handler,
        classes::create_class_handler,
        classes::update_class_handler,
        classes::delete_class_handler,
        classes::remove_student_handler,
        classes::finalize_story_handler,
        classes::append_image_handler,
    ),
    components(schemas(
        auth::LoginRequest,
        users::CreateUserRequest,
        users::UserKindParam,
        users::UserResponse,
        classes::AppendImageRequest,
    )),
    tags(
        (name = "Fabula API", description = "Classes, stories, paragraphs and the finalization archive.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Response Envelope and Error Mapping
//=========================================================================================

/// Successful responses are wrapped as `{"data": ...}`, the envelope the
/// frontend expects.
#[derive(Serialize)]
pub struct Envelope<T> {
    pub data: T,
}

pub fn envelope<T: Serialize>(data: T) -> axum::Json<Envelope<T>> {
    axum::Json(Envelope { data })
}

/// Failed responses carry the matching `{"error": ...}` envelope.
pub type Rejection = (StatusCode, axum::Json<serde_json::Value>);

pub(crate) fn error_body(message: impl Into<String>) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "error": message.into() }))
}

/// Maps a core error onto the status the caller should see. Partial
/// failures after a committed primary mutation are server-side faults and
/// are logged before being surfaced.
pub(crate) fn reject(err: CoreError) -> Rejection {
    let status = match &err {
        CoreError::InvalidIdentifier(_)
        | CoreError::MissingField(_)
        | CoreError::EmptyUpdate
        | CoreError::EntryNotFound { .. } => StatusCode::BAD_REQUEST,
        CoreError::NotFound { .. } | CoreError::EmptyStory(_) => StatusCode::NOT_FOUND,
        CoreError::ArchiveFailed { .. }
        | CoreError::RetractFailed { .. }
        | CoreError::CascadeIncomplete { .. }
        | CoreError::RefCleanupIncomplete { .. }
        | CoreError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %err, "request failed");
    }
    (status, error_body(err.to_string()))
}
