use std::sync::Arc;

use axum::{Router, extract::State, http::StatusCode, response::IntoResponse, routing::post};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::{blocking, message};
use crate::{
    auth::{Claims, TokenKind},
    database::users,
    error::AppError,
    guards::CurrentUser,
    mailer::{password_reset_email, welcome_email},
    models::{AccessRole, User},
    services::users::{Registration, authenticate, check_password, register, set_password},
    state::State as AppState,
    utils::AppJson,
};

const EMAIL_TOKEN_HOURS: i64 = 24;
const RESET_TOKEN_MINUTES: i64 = 15;

#[derive(Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    refresh_token: String,
}

#[derive(Deserialize)]
pub struct TokenRequest {
    token: String,
}

#[derive(Deserialize)]
pub struct ResetRequest {
    email: String,
}

#[derive(Deserialize)]
pub struct ResetConfirm {
    token: String,
    password: String,
    password_repeat: String,
}

#[derive(Serialize)]
pub struct TokenPair {
    access_token: String,
    refresh_token: String,
    token_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<User>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/refresh", post(refresh_handler))
        .route("/logout", post(logout_handler))
        .route("/verify-email", post(verify_email_handler))
        .route("/password-reset/request", post(reset_request_handler))
        .route("/password-reset/confirm", post(reset_confirm_handler))
}

fn subject(claims: &Claims) -> Result<Uuid, AppError> {
    Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized("Could not validate credentials"))
}

async fn register_handler(
    State(state): State<Arc<AppState>>,
    AppJson(registration): AppJson<Registration>,
) -> Result<impl IntoResponse, AppError> {
    let database = state.database.clone();
    let rounds = state.config.password_hash_rounds;
    let user = blocking(move || register(&database, &registration, vec![AccessRole::User], rounds))
        .await?;

    let token = state.tokens.issue(
        &user.id.to_string(),
        TokenKind::EmailVerify,
        chrono::Duration::hours(EMAIL_TOKEN_HOURS),
    )?;
    let link = format!("{}/verify-email?token={token}", state.config.frontend_host);
    state
        .mailer
        .dispatch(welcome_email(&user.email, &user.full_name(), &link));

    Ok((StatusCode::CREATED, AppJson(user)))
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    AppJson(request): AppJson<LoginRequest>,
) -> Result<AppJson<TokenPair>, AppError> {
    let database = state.database.clone();
    let user = blocking(move || authenticate(&database, &request.email, &request.password)).await?;

    let subject = user.id.to_string();
    let pair = TokenPair {
        access_token: state.tokens.issue(&subject, TokenKind::Access, state.access_ttl())?,
        refresh_token: state.tokens.issue(&subject, TokenKind::Refresh, state.refresh_ttl())?,
        token_type: "bearer",
        user: Some(user),
    };

    info!(user_id = %subject, "User logged in");

    Ok(AppJson(pair))
}

async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    AppJson(request): AppJson<RefreshRequest>,
) -> Result<AppJson<TokenPair>, AppError> {
    let claims = state
        .tokens
        .verify(&request.refresh_token, TokenKind::Refresh)?;

    if state.sessions.is_revoked(&claims.jti).await? {
        return Err(AppError::Unauthorized("Token has been revoked"));
    }

    let user_id = subject(&claims)?;
    let user = state
        .database
        .read(|connection| users::find_by_id(connection, user_id))?
        .ok_or(AppError::NotFound("User"))?;

    if user.disabled {
        return Err(AppError::Forbidden("Inactive user"));
    }

    Ok(AppJson(TokenPair {
        access_token: state
            .tokens
            .issue(&claims.sub, TokenKind::Access, state.access_ttl())?,
        refresh_token: request.refresh_token,
        token_type: "bearer",
        user: None,
    }))
}

async fn logout_handler(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<AppJson<Value>, AppError> {
    state
        .sessions
        .revoke(&current.claims.jti, current.claims.expires_at())
        .await?;

    info!(user_id = %current.user.id, "User logged out");

    Ok(message("Successfully logged out"))
}

async fn verify_email_handler(
    State(state): State<Arc<AppState>>,
    AppJson(request): AppJson<TokenRequest>,
) -> Result<AppJson<Value>, AppError> {
    let claims = state
        .tokens
        .verify(&request.token, TokenKind::EmailVerify)
        .map_err(|_| AppError::BadRequest("Invalid or expired verification link".into()))?;
    let user_id = subject(&claims)?;

    let newly_verified = state.database.write(|transaction| {
        let mut user =
            users::find_by_id(transaction, user_id)?.ok_or(AppError::NotFound("User"))?;

        if user.is_verified {
            return Ok(false);
        }

        user.is_verified = true;
        user.updated_at = ledger::now();
        users::update(transaction, &user)?;

        Ok(true)
    })?;

    Ok(if newly_verified {
        message("Email verified successfully")
    } else {
        message("Email already verified")
    })
}

/// Always answers the same way so the endpoint cannot be used to probe for
/// accounts.
async fn reset_request_handler(
    State(state): State<Arc<AppState>>,
    AppJson(request): AppJson<ResetRequest>,
) -> Result<AppJson<Value>, AppError> {
    let user = state
        .database
        .read(|connection| users::find_by_email(connection, request.email.trim()))?
        .filter(|user| !user.disabled);

    if let Some(user) = user {
        let token = state.tokens.issue(
            &user.id.to_string(),
            TokenKind::PasswordReset,
            chrono::Duration::minutes(RESET_TOKEN_MINUTES),
        )?;
        let link = format!("{}/reset-password?token={token}", state.config.frontend_host);
        state.mailer.dispatch(password_reset_email(&user.email, &link));
    }

    Ok(message(
        "If that email is registered, a password reset link has been sent",
    ))
}

async fn reset_confirm_handler(
    State(state): State<Arc<AppState>>,
    AppJson(request): AppJson<ResetConfirm>,
) -> Result<AppJson<Value>, AppError> {
    let claims = state
        .tokens
        .verify(&request.token, TokenKind::PasswordReset)
        .map_err(|_| AppError::BadRequest("Invalid or expired reset link".into()))?;
    if state.sessions.is_revoked(&claims.jti).await? {
        return Err(AppError::BadRequest("Reset link was already used".into()));
    }
    let user_id = subject(&claims)?;
    check_password(&request.password, &request.password_repeat)?;

    let database = state.database.clone();
    let rounds = state.config.password_hash_rounds;
    blocking(move || set_password(&database, user_id, &request.password, rounds)).await?;

    state
        .sessions
        .revoke(&claims.jti, claims.expires_at())
        .await?;

    Ok(message("Password updated successfully"))
}
