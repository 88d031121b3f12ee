use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{require_email, require_non_empty, require_password, ApiResponse, ApiResult, JsonBody};
use crate::{
    error::ApiError,
    middleware::AuthUser,
    models::{LoginRequest, NewActivity, NewUser, User, UserChanges, UserResponse},
    permissions::PermissionSet,
    seed::MEMBER_GROUP,
    state::AppState,
    utils::{hash_password, verify_password},
};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// Returned by login and register. Carries the permission set so the client
/// can gate its UI without a follow-up request.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserResponse,
    pub permissions: PermissionSet,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserResponse,
    pub permissions: PermissionSet,
}

#[derive(Debug, Default, Deserialize)]
pub struct MeQuery {
    #[serde(default)]
    pub refresh: bool,
}

const INVALID_CREDENTIALS: &str = "Invalid email or password";

pub async fn register(
    State(state): State<AppState>,
    JsonBody(form): JsonBody<RegisterRequest>,
) -> ApiResult<LoginResponse> {
    let email = form.email.trim().to_lowercase();
    require_email(&email)?;
    require_password(&form.password)?;
    require_non_empty("first_name", &form.first_name)?;
    require_non_empty("last_name", &form.last_name)?;

    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::Conflict("An account with this email already exists".into()));
    }

    let password_hash = hash_password(&form.password, state.config.bcrypt_cost)?;
    let user = state
        .store
        .create_user(NewUser {
            email,
            password_hash,
            first_name: form.first_name.trim().to_string(),
            last_name: form.last_name.trim().to_string(),
            is_active: true,
        })
        .await?;

    match state.store.find_group_by_codename(MEMBER_GROUP).await? {
        Some(group) => {
            state.store.add_group_member(group.id, user.id).await?;
            state.resolver.invalidate_user(user.id).await;
        }
        None => log::warn!(target: "adminhub::auth", "no {MEMBER_GROUP} group; {} registered without permissions", user.email),
    }

    log::info!(target: "adminhub::auth", "registered {}", user.email);
    state.events.user_created(&user);
    state
        .record_activity(NewActivity::new(Some(user.id), "register", "user", Some(user.id)))
        .await;
    state.refresh_dashboard().await;

    let response = start_session(&state, user).await?;
    Ok(ApiResponse::created(response).with_message("Account created"))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(form): JsonBody<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let email = form.email.trim().to_lowercase();
    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| ApiError::unauthorized(INVALID_CREDENTIALS))?;

    if !verify_password(&form.password, &user.password_hash)? {
        log::info!(target: "adminhub::auth", "failed login for {email}");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }
    if !user.can_sign_in() {
        return Err(ApiError::unauthorized("Account is inactive or locked"));
    }

    let user = state
        .store
        .update_user(
            user.id,
            UserChanges {
                last_login: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await?;

    state
        .record_activity(NewActivity::new(Some(user.id), "login", "user", Some(user.id)))
        .await;

    let response = start_session(&state, user).await?;
    Ok(ApiResponse::ok(response).with_message("Login successful"))
}

/// Opens a session and resolves a fresh permission set for the response.
async fn start_session(state: &AppState, user: User) -> Result<LoginResponse, ApiError> {
    let expires_at = Utc::now() + state.tokens.ttl();
    let session = state.store.create_session(user.id, expires_at).await?;
    let token = state.tokens.create_token(user.id, session.id, user.email.clone())?;
    let permissions = state.resolver.refresh(user.id).await?;

    Ok(LoginResponse {
        token,
        session_token: session.token,
        expires_at: session.expires_at,
        user: user.into(),
        permissions,
    })
}

pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> ApiResult<()> {
    state.store.delete_session(auth.session.id).await?;
    state.end_session_sockets(auth.session.id);
    state
        .record_activity(NewActivity::new(Some(auth.id()), "logout", "user", Some(auth.id())))
        .await;
    Ok(ApiResponse::ok(()).with_message("Logged out"))
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<MeQuery>,
) -> ApiResult<MeResponse> {
    let permissions = if query.refresh {
        state.resolver.refresh(auth.id()).await?
    } else {
        state.resolver.resolve(auth.id()).await?
    };
    Ok(ApiResponse::ok(MeResponse {
        user: auth.user.into(),
        permissions,
    }))
}

pub(crate) fn user_details(user: &User) -> serde_json::Value {
    json!({ "email": user.email, "name": user.full_name() })
}
