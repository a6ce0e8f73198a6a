//! services/api/src/web/users.rs
//!
//! User management endpoints. Password material never leaves the service;
//! responses are mapped through [`UserResponse`] which drops the hash.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use fabula_core::{EntityId, NewUser, User, UserKind, UserPatch};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::web::auth::hash_password;
use crate::web::{envelope, reject, state::AppState, Rejection};

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password: String,
    /// "student" (default) or "teacher".
    #[serde(rename = "type", default)]
    pub kind: Option<UserKindParam>,
}

#[derive(Deserialize, Clone, Copy, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserKindParam {
    Student,
    Teacher,
}

impl From<UserKindParam> for UserKind {
    fn from(param: UserKindParam) -> Self {
        match param {
            UserKindParam::Student => UserKind::Student,
            UserKindParam::Teacher => UserKind::Teacher,
        }
    }
}

/// A user as exposed over the wire: everything but the password hash.
#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    #[schema(value_type = String)]
    pub id: EntityId,
    pub name: String,
    pub surname: String,
    pub email: String,
    #[serde(rename = "type")]
    #[schema(value_type = String)]
    pub kind: UserKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[schema(value_type = Vec<String>)]
    pub paragraphs: Vec<EntityId>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            surname: user.surname,
            email: user.email,
            kind: user.kind,
            code: user.code,
            paragraphs: user.paragraphs,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /api/users - List all users.
#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "All users", body = Vec<UserResponse>),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, Rejection> {
    let users = state.registry.users().await.map_err(reject)?;
    let users: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();
    Ok(envelope(users))
}

/// POST /api/users - Create a user (also served as /api/register).
///
/// Students are allocated a unique access code by the registry.
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid request"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_user_handler(
    State(state): State<Arc<AppState>>,
    axum::Json(req): axum::Json<CreateUserRequest>,
) -> Result<impl IntoResponse, Rejection> {
    let password = hash_password(&req.password)?;
    let kind = req.kind.map_or(UserKind::Student, UserKind::from);

    let user = state
        .registry
        .create_user(NewUser {
            name: req.name,
            surname: req.surname,
            email: req.email,
            password,
            kind,
        })
        .await
        .map_err(reject)?;

    Ok((StatusCode::CREATED, envelope(UserResponse::from(user))))
}

/// PATCH /api/users/{user_id} - Partially update a user.
#[utoipa::path(
    patch,
    path = "/api/users/{user_id}",
    params(("user_id" = String, Path, description = "The user to update")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "User not found")
    )
)]
pub async fn update_user_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    axum::Json(mut patch): axum::Json<UserPatch>,
) -> Result<impl IntoResponse, Rejection> {
    // Incoming passwords are plain text and must be hashed before storage.
    if let Some(password) = patch.password.take() {
        patch.password = Some(hash_password(&password)?);
    }

    let user = state
        .registry
        .update_user(&user_id, patch)
        .await
        .map_err(reject)?;
    Ok(envelope(UserResponse::from(user)))
}

/// DELETE /api/users/{user_id} - Delete a user and cascade.
///
/// Deleting a teacher deletes every class they own; deleting a student
/// removes them from every roster.
#[utoipa::path(
    delete,
    path = "/api/users/{user_id}",
    params(("user_id" = String, Path, description = "The user to delete")),
    responses(
        (status = 200, description = "Deleted user id"),
        (status = 404, description = "User not found"),
        (status = 500, description = "User deleted but cleanup incomplete")
    )
)]
pub async fn delete_user_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, Rejection> {
    let deleted = state.cascade.delete_user(&user_id).await.map_err(reject)?;
    Ok(envelope(deleted.to_string()))
}
