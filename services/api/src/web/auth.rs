//! services/api/src/web/auth.rs
//!
//! Login endpoint and the password hashing helpers shared with user
//! creation. Students sign in with their access code; everyone else uses
//! email and password.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use crate::web::users::UserResponse;
use crate::web::{envelope, error_body, reject, state::AppState, Rejection};

//=========================================================================================
// Request Types
//=========================================================================================

/// Either `code` alone, or `email` and `password` together.
#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub code: Option<String>,
}

//=========================================================================================
// Password Helpers
//=========================================================================================

/// Hashes a plain password for storage.
pub(crate) fn hash_password(raw: &str) -> Result<String, Rejection> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(raw.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, error_body("Failed to hash password"))
        })
}

fn verify_password(raw: &str, stored_hash: &str) -> Result<bool, Rejection> {
    let parsed_hash = PasswordHash::new(stored_hash).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, error_body("Authentication error"))
    })?;
    Ok(Argon2::default().verify_password(raw.as_bytes(), &parsed_hash).is_ok())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/login - Sign in with a student code or with email and password.
#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = UserResponse),
        (status = 400, description = "Missing credentials"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    axum::Json(req): axum::Json<LoginRequest>,
) -> Result<impl IntoResponse, Rejection> {
    let user = if let Some(code) = req.code {
        state
            .registry
            .user_by_code(&code)
            .await
            .map_err(reject)?
            .ok_or((StatusCode::UNAUTHORIZED, error_body("Invalid access code")))?
    } else {
        let email = req
            .email
            .ok_or((StatusCode::BAD_REQUEST, error_body("email is required")))?;
        let password = req
            .password
            .ok_or((StatusCode::BAD_REQUEST, error_body("password is required")))?;

        let user = state
            .registry
            .user_by_email(&email)
            .await
            .map_err(reject)?
            .ok_or((StatusCode::UNAUTHORIZED, error_body("Invalid email or password")))?;

        if !verify_password(&password, &user.password)? {
            return Err((StatusCode::UNAUTHORIZED, error_body("Invalid email or password")));
        }
        user
    };

    Ok((StatusCode::OK, envelope(UserResponse::from(user))))
}
