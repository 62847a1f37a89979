//! Authentication handlers

use axum::extract::{Extension, Json};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::extractors::AuthedUser;
use super::models::{Claims, GoogleIdTokenPayload, User};
use crate::common::{generate_user_id, safe_email_log, ApiError, AppState};

const TOKEN_LIFETIME_DAYS: i64 = 7;

/// POST /api/auth/google
/// Authenticates a user via a Google OAuth ID token
///
/// # Request Body
/// ```json
/// { "id_token": "<google id token>" }
/// ```
///
/// # Response
/// ```json
/// { "token": "<jwt token>", "user": { ... } }
/// ```
pub async fn google_auth(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Json(payload): Json<GoogleIdTokenPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await.clone();

    // Verify token with Google's tokeninfo endpoint
    // Docs: https://developers.google.com/identity/sign-in/web/backend-auth
    let tokeninfo_url = format!(
        "https://oauth2.googleapis.com/tokeninfo?id_token={}",
        payload.id_token
    );

    let resp = state.http.get(&tokeninfo_url).send().await.map_err(|e| {
        error!(error = %e, "HTTP error contacting Google tokeninfo endpoint");
        ApiError::InternalServer("google token validation service unavailable".to_string())
    })?;

    let status = resp.status();
    if !status.is_success() {
        warn!(http_status = %status, "Google tokeninfo rejected the token");
        return Err(match status.as_u16() {
            401 => ApiError::Unauthorized("expired or invalid id_token".to_string()),
            _ => ApiError::BadRequest("invalid or malformed id_token".to_string()),
        });
    }

    let body: serde_json::Value = resp.json().await.map_err(|e| {
        error!(error = %e, "Failed to parse Google tokeninfo response");
        ApiError::BadRequest("malformed id_token".to_string())
    })?;

    let email = body.get("email").and_then(|v| v.as_str());
    let sub = body.get("sub").and_then(|v| v.as_str());
    let name = body.get("name").and_then(|v| v.as_str());
    let picture = body.get("picture").and_then(|v| v.as_str());

    let (email, sub) = match (email, sub) {
        (Some(e), Some(s)) => (e.to_string(), s.to_string()),
        _ => {
            warn!("Google token missing required fields (email/sub)");
            return Err(ApiError::BadRequest(
                "token missing required fields".to_string(),
            ));
        }
    };

    // Check token expiration
    if let Some(exp) = body.get("exp").and_then(|v| v.as_str()).and_then(|s| s.parse::<i64>().ok()) {
        if exp < Utc::now().timestamp() {
            warn!(token_exp = exp, "Google token has expired");
            return Err(ApiError::Unauthorized("token has expired".to_string()));
        }
    }

    // Validate audience (client id) when configured
    if let Some(client_id) = &state.google_client_id {
        match body.get("aud").and_then(|v| v.as_str()) {
            Some(aud) if aud == client_id => {
                debug!("Google token audience validation successful");
            }
            Some(aud) => {
                warn!(token_audience = %aud, "Google token audience mismatch");
                return Err(ApiError::Unauthorized(
                    "token audience mismatch".to_string(),
                ));
            }
            None => {
                warn!("Google token missing audience field");
                return Err(ApiError::Unauthorized("token missing audience".to_string()));
            }
        }
    }

    // Create or find the user
    let existing: Option<User> = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE provider = ? AND provider_id = ?",
    )
    .bind("google")
    .bind(&sub)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::DatabaseError)?;

    let user = match existing {
        Some(u) => u,
        None => {
            let id = generate_user_id();
            info!(
                user_id = %id,
                email = %safe_email_log(&email),
                "Creating new user account via Google sign-in"
            );

            let now = Utc::now().to_rfc3339();
            sqlx::query(
                r#"
                INSERT INTO users (id, email, name, avatar, provider, provider_id, created_at)
                VALUES (?, ?, ?, ?, 'google', ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&email)
            .bind(name)
            .bind(picture)
            .bind(&sub)
            .bind(&now)
            .execute(&state.db)
            .await
            .map_err(ApiError::DatabaseError)?;

            User {
                id,
                email: email.clone(),
                name: name.map(str::to_string),
                avatar: picture.map(str::to_string),
                provider: Some("google".to_string()),
                provider_id: Some(sub),
                created_at: Some(now),
            }
        }
    };

    // Issue our own JWT
    let exp = (Utc::now() + Duration::days(TOKEN_LIFETIME_DAYS)).timestamp() as usize;
    let claims = Claims {
        sub: user.id.clone(),
        exp,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(state.jwt_secret.as_bytes()),
    )
    .map_err(|e| {
        error!(error = %e, "Failed to sign JWT");
        ApiError::InternalServer("token creation failed".to_string())
    })?;

    info!(user_id = %user.id, "User signed in");

    Ok(Json(serde_json::json!({
        "token": token,
        "user": user,
    })))
}

/// GET /api/me - Return the current authenticated user
pub async fn me_handler(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    authed: AuthedUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let state = state_lock.read().await;

    let user: Option<User> = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&authed.id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::DatabaseError)?;

    match user {
        Some(u) => Ok(Json(serde_json::json!({ "user": u }))),
        None => Err(ApiError::NotFound("User not found".to_string())),
    }
}

/// POST /api/auth/logout - Logout (stateless; the client discards its token)
pub async fn logout_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Logged out successfully" }))
}
