use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use thiserror::Error;
use tracing::debug;

use forum_crypto::{generate_salt, hash_password, verify_absent_user, verify_password};
use forum_db::{StorageError, UserRepo};
use forum_types::api::{AuthResponse, LoginRequest, RegisterRequest};
use forum_types::models::{NewUser, PublicUser};

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown login or wrong password. The two are deliberately merged.
    #[error("user not found")]
    InvalidCredentials,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Check a login/password pair against stored credentials.
pub async fn authenticate(
    users: &dyn UserRepo,
    login: &str,
    password: &str,
) -> Result<PublicUser, AuthError> {
    let user = match users.get_user_by_login_with_credentials(login).await {
        Ok(user) => user,
        Err(StorageError::NotFound) => {
            // Same hashing cost as a wrong password
            verify_absent_user(password);
            debug!("Login {:?} failed: unknown login", login);
            return Err(AuthError::InvalidCredentials);
        }
        Err(e) => return Err(e.into()),
    };

    if !verify_password(password, &user.password_hash, &user.password_salt) {
        debug!("Login {:?} failed: wrong password", login);
        return Err(AuthError::InvalidCredentials);
    }

    Ok(user.public())
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_credentials_input(&req.login, &req.password)?;

    let salt = generate_salt();
    let password_hash =
        hash_password(&req.password, &salt).map_err(|e| ApiError::internal("hash_password", e))?;

    let user_id = state
        .within_deadline(state.storage.users.add_user(NewUser {
            login: req.login.clone(),
            password_hash,
            password_salt: salt,
        }))
        .await
        .map_err(|e| match e {
            StorageError::Conflict => ApiError::Conflict("login already taken"),
            e => ApiError::from_storage(e, "user not found"),
        })?;

    let token = state
        .tokens
        .issue(user_id)
        .map_err(|e| ApiError::internal("issue token", e))?;

    debug!("Registered {:?} as user {}", req.login, user_id);
    Ok((StatusCode::CREATED, Json(AuthResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_credentials_input(&req.login, &req.password)?;

    let user = state
        .within_deadline(authenticate(
            state.storage.users.as_ref(),
            &req.login,
            &req.password,
        ))
        .await
        .map_err(|e| match e {
            AuthError::InvalidCredentials => ApiError::NotFound("user not found"),
            AuthError::Storage(e) => ApiError::from_storage(e, "user not found"),
        })?;

    let token = state
        .tokens
        .issue(user.id)
        .map_err(|e| ApiError::internal("issue token", e))?;

    Ok(Json(AuthResponse {
        user_id: user.id,
        token,
    }))
}

fn validate_credentials_input(login: &str, password: &str) -> Result<(), ApiError> {
    if login.trim().is_empty() {
        return Err(ApiError::BadRequest("login cannot be empty".into()));
    }
    if password.is_empty() {
        return Err(ApiError::BadRequest("password cannot be empty".into()));
    }
    Ok(())
}
