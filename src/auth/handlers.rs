use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use super::{
    claims::Role,
    dto::{
        AuthResponse, LoginRequest, MessageResponse, PublicUser, RefreshRequest,
        RegisterRequest, ResetPasswordRequest, VerifyResponse,
    },
    jwt::{AuthUser, JwtKeys},
    password::{hash_password, verify_password},
    repo::User,
};
use crate::{
    error::{AppError, AppResult},
    state::AppState,
    store::{is_unique_violation, timestamp, Document},
};

pub const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/verify", get(verify))
}

fn issue_tokens(
    keys: &JwtKeys,
    message: &'static str,
    user: Document<User>,
) -> AppResult<AuthResponse> {
    let token = keys.sign_access(&user.id, &user.data.email, user.data.role)?;
    let refresh_token = keys.sign_refresh(&user.id, &user.data.email, user.data.role)?;
    Ok(AuthResponse {
        message,
        user: PublicUser {
            uid: user.id,
            email: user.data.email,
            display_name: user.data.display_name,
            role: user.data.role,
        },
        token,
        refresh_token,
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let Json(mut payload) = payload?;
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::BadRequest("Invalid email".into()));
    }
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if User::find_by_email(state.store.as_ref(), &payload.email)
        .await?
        .is_some()
    {
        warn!(email = %payload.email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let password_hash = hash_password(&payload.password)?;
    let display_name = payload
        .display_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    let created = User::create(
        state.store.as_ref(),
        User {
            email: payload.email.clone(),
            display_name,
            password_hash,
            role: Role::User,
            created_at: timestamp(),
        },
    )
    .await;
    // A concurrent registration can win the race past the lookup above.
    let user = match created {
        Ok(user) => user,
        Err(e) if is_unique_violation(&e) => {
            warn!(email = %payload.email, "email registered concurrently");
            return Err(AppError::Conflict("Email already registered".into()));
        }
        Err(e) => return Err(e.into()),
    };

    info!(uid = %user.id, email = %user.data.email, "user registered");
    let keys = JwtKeys::from_ref(&state);
    let body = issue_tokens(&keys, "User registered successfully", user)?;
    Ok((StatusCode::CREATED, Json(body)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<AuthResponse>> {
    let Json(mut payload) = payload?;
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        return Err(AppError::BadRequest("Invalid email".into()));
    }

    let Some(user) = User::find_by_email(state.store.as_ref(), &payload.email).await? else {
        warn!(email = %payload.email, "login unknown email");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };

    if !verify_password(&payload.password, &user.data.password_hash)? {
        warn!(uid = %user.id, "login invalid password");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    info!(uid = %user.id, "user logged in");
    let keys = JwtKeys::from_ref(&state);
    Ok(Json(issue_tokens(&keys, "Login successful", user)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> AppResult<Json<AuthResponse>> {
    let Json(payload) = payload?;
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| AppError::Unauthorized(format!("Invalid refresh token: {e}")))?;

    let user = User::find_by_id(state.store.as_ref(), &claims.uid)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;

    Ok(Json(issue_tokens(&keys, "Token refreshed", user)?))
}

/// Acknowledges the request; no email is sent.
#[instrument(skip(payload))]
pub async fn reset_password(
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> AppResult<Json<MessageResponse>> {
    let Json(payload) = payload?;
    let email = payload.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::BadRequest("Invalid email".into()));
    }
    info!(%email, "password reset requested");
    Ok(Json(MessageResponse {
        message: "Password reset instructions sent to email",
        email: Some(email),
    }))
}

#[instrument(skip_all)]
pub async fn verify(user: AuthUser) -> Json<VerifyResponse> {
    Json(VerifyResponse {
        message: "Token is valid",
        user: PublicUser {
            uid: user.uid,
            email: user.email,
            display_name: None,
            role: user.role,
        },
    })
}
