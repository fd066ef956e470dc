//! Account endpoints: password sign-up/sign-in, token refresh and OAuth.

pub mod oauth;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::error::ApiError;
use crate::core::shared::enums::UserRole;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{check_length, run_blocking, truncate_chars};
use crate::core::urls::ApiUrls;
use crate::security::auth::AuthenticatedUser;
use crate::security::jwt::{TokenPair, TokenSubject};
use crate::users::storage::{self as user_storage, normalize_email, User};

use oauth::{OAuthProvider, OAuthUserInfo};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub tokens: TokenPair,
}

fn issue_tokens(state: &AppState, user: &User) -> Result<TokenPair, ApiError> {
    let subject = TokenSubject {
        user_id: user.id,
        email: user.email.clone(),
        name: user.name.clone(),
        role: user.role,
    };
    state
        .jwt
        .generate_token_pair(&subject)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid email or password".into())
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    }
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let name = req.name.trim().to_string();
    let email = normalize_email(&req.email);
    if name.is_empty() {
        return Err(ApiError::BadRequest("name is required".into()));
    }
    if !looks_like_email(&email) {
        return Err(ApiError::BadRequest("a valid email is required".into()));
    }
    check_length("name", &name, user_storage::NAME_MAX_CHARS)?;
    check_length("email", &email, user_storage::EMAIL_MAX_CHARS)?;
    let issues = state.passwords.validate(&req.password);
    if !issues.is_empty() {
        let message = issues
            .iter()
            .map(|i| i.message())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ApiError::BadRequest(message));
    }

    let role = if state.config.is_admin_email(&email) {
        UserRole::Admin
    } else {
        UserRole::User
    };
    let passwords = Arc::clone(&state.passwords);
    let password = req.password;

    let user = run_blocking(&state.conn, move |conn| {
        if user_storage::find_by_email(conn, &email)?.is_some() {
            return Err(ApiError::Conflict("Email is already registered".into()));
        }
        let hash = passwords
            .hash(&password)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        let mut user = User::new(name, email, role);
        user.password_hash = Some(hash);
        Ok(user_storage::insert_user(conn, &user)?)
    })
    .await?;

    info!("Registered user {} ({})", user.id, user.role);
    let tokens = issue_tokens(&state, &user)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { user, tokens })))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = normalize_email(&req.email);
    let passwords = Arc::clone(&state.passwords);

    let user = run_blocking(&state.conn, move |conn| {
        let user = user_storage::find_by_email(conn, &email)?.ok_or_else(invalid_credentials)?;
        let hash = user.password_hash.as_deref().ok_or_else(invalid_credentials)?;
        let valid = passwords
            .verify(&req.password, hash)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        if !valid {
            return Err(invalid_credentials());
        }
        Ok(user)
    })
    .await
    .inspect_err(|e| {
        if matches!(e, ApiError::Unauthorized(_)) {
            warn!("Failed login attempt");
        }
    })?;

    let tokens = issue_tokens(&state, &user)?;
    Ok(Json(AuthResponse { user, tokens }))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let user_id = state
        .jwt
        .consume_refresh_token(&req.refresh_token)
        .await
        .map_err(|_| ApiError::Unauthorized("Invalid or expired refresh token".into()))?;

    // Reload so a role change takes effect on the next pair.
    let user = run_blocking(&state.conn, move |conn| {
        user_storage::find_user(conn, user_id)
            .map_err(|_| ApiError::Unauthorized("User no longer exists".into()))
    })
    .await?;

    Ok(Json(issue_tokens(&state, &user)?))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> StatusCode {
    state.jwt.revoke(&user.claims.jti, user.claims.exp).await;
    state.jwt.cleanup_revoked().await;
    StatusCode::NO_CONTENT
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<User>, ApiError> {
    let user_id = user.user_id;
    let user = run_blocking(&state.conn, move |conn| {
        user_storage::find_user(conn, user_id).map_err(|_| ApiError::not_found("User"))
    })
    .await?;
    Ok(Json(user))
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let issues = state.passwords.validate(&req.new_password);
    if !issues.is_empty() {
        let message = issues
            .iter()
            .map(|i| i.message())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ApiError::BadRequest(message));
    }

    let passwords = Arc::clone(&state.passwords);
    let user_id = user.user_id;
    run_blocking(&state.conn, move |conn| {
        let current =
            user_storage::find_user(conn, user_id).map_err(|_| ApiError::not_found("User"))?;
        // OAuth-only accounts have no password to confirm.
        if let Some(hash) = current.password_hash.as_deref() {
            let valid = passwords
                .verify(&req.current_password, hash)
                .map_err(|e| ApiError::Internal(e.to_string()))?;
            if !valid {
                return Err(ApiError::Unauthorized("Current password is incorrect".into()));
            }
        }
        let hash = passwords
            .hash(&req.new_password)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        user_storage::set_password_hash(conn, user_id, &hash)?;
        Ok(())
    })
    .await?;

    info!("User {user_id} changed password");
    Ok(StatusCode::NO_CONTENT)
}

fn resolve_provider(
    state: &AppState,
    name: &str,
) -> Result<(OAuthProvider, crate::core::config::OAuthClient), ApiError> {
    let provider = OAuthProvider::parse(name)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown OAuth provider: {name}")))?;
    let client = provider
        .client(&state.config.oauth)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("OAuth provider {provider} is not configured")))?;
    Ok((provider, client))
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

pub async fn oauth_start(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
) -> Result<Response, ApiError> {
    let (provider, client) = resolve_provider(&state, &provider)?;
    let oauth_state = state
        .jwt
        .issue_oauth_state(provider.as_str())
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let redirect_uri = provider.redirect_uri(&state.config.oauth);
    Ok(found(&provider.build_auth_url(&client, &redirect_uri, &oauth_state)))
}

pub async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<Response, ApiError> {
    let (provider, client) = resolve_provider(&state, &provider)?;
    let frontend_callback = format!("{}/oauth/callback", state.config.server.frontend_url);

    if let Some(error) = query.error {
        warn!("OAuth {provider} returned error: {error}");
        return Ok(found(&format!(
            "{frontend_callback}#error={}",
            urlencoding::encode(&error)
        )));
    }

    let code = query
        .code
        .ok_or_else(|| ApiError::BadRequest("Missing authorization code".into()))?;
    let oauth_state = query
        .state
        .ok_or_else(|| ApiError::BadRequest("Missing OAuth state".into()))?;
    state
        .jwt
        .verify_oauth_state(&oauth_state, provider.as_str())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let redirect_uri = provider.redirect_uri(&state.config.oauth);
    let profile = match fetch_profile(&state, provider, &client, &redirect_uri, &code).await {
        Ok(profile) => profile,
        Err(e) => {
            warn!("OAuth {provider} sign-in failed: {e}");
            return Ok(found(&format!("{frontend_callback}#error=oauth_failed")));
        }
    };

    let admin_email = profile
        .email
        .as_deref()
        .map(|email| state.config.is_admin_email(email))
        .unwrap_or(false);
    let user = run_blocking(&state.conn, move |conn| {
        upsert_oauth_user(conn, &profile, admin_email)
    })
    .await?;
    let Some(user) = user else {
        warn!("OAuth {provider} sign-in refused: no verified email address");
        return Ok(found(&format!("{frontend_callback}#error=email_not_verified")));
    };

    let tokens = issue_tokens(&state, &user)?;
    info!("User {} signed in with {provider}", user.id);
    Ok(found(&format!(
        "{frontend_callback}#access_token={}&refresh_token={}",
        urlencoding::encode(&tokens.access_token),
        urlencoding::encode(&tokens.refresh_token)
    )))
}

async fn fetch_profile(
    state: &AppState,
    provider: OAuthProvider,
    client: &crate::core::config::OAuthClient,
    redirect_uri: &str,
    code: &str,
) -> anyhow::Result<OAuthUserInfo> {
    let token = provider
        .exchange_code(client, redirect_uri, code, &state.http)
        .await?;
    provider.fetch_user_info(&token.access_token, &state.http).await
}

/// Matches by provider identity first, then by verified email, otherwise creates the account.
/// `None` when the identity is new and the provider vouched for no email address.
fn upsert_oauth_user(
    conn: &mut diesel::PgConnection,
    profile: &OAuthUserInfo,
    admin_email: bool,
) -> Result<Option<User>, ApiError> {
    let provider = profile.provider.as_str();
    if let Some(user) = user_storage::find_by_oauth(conn, provider, &profile.provider_id)? {
        return Ok(Some(user));
    }

    let Some(email) = profile.email.as_deref() else {
        return Ok(None);
    };

    if let Some(existing) = user_storage::find_by_email(conn, email)? {
        let avatar = existing
            .avatar_url
            .as_deref()
            .or(profile.avatar_url.as_deref())
            .map(String::from);
        return Ok(Some(user_storage::link_oauth(
            conn,
            existing.id,
            provider,
            &profile.provider_id,
            avatar.as_deref(),
        )?));
    }

    let name = profile
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string());
    let name = truncate_chars(name.trim(), user_storage::NAME_MAX_CHARS);
    let role = if admin_email { UserRole::Admin } else { UserRole::User };
    let mut user = User::new(name, email.to_string(), role);
    user.oauth_provider = Some(provider.to_string());
    user.oauth_id = Some(profile.provider_id.clone());
    user.avatar_url = profile.avatar_url.clone();
    Ok(Some(user_storage::insert_user(conn, &user)?))
}

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::AUTH_REGISTER, post(register))
        .route(ApiUrls::AUTH_LOGIN, post(login))
        .route(ApiUrls::AUTH_REFRESH, post(refresh))
        .route(ApiUrls::AUTH_LOGOUT, post(logout))
        .route(ApiUrls::AUTH_ME, get(me))
        .route(ApiUrls::AUTH_PASSWORD, put(change_password))
        .route(ApiUrls::AUTH_OAUTH, get(oauth_start))
        .route(ApiUrls::AUTH_OAUTH_CALLBACK, get(oauth_callback))
}
