use axum::extract::{Path, State};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::{auth::user_details, require_email, require_non_empty, require_password, ApiResponse, ApiResult, JsonBody};
use crate::{
    error::ApiError,
    middleware::{check_permission_or_error, AuthUser},
    models::{CreateUser, Group, NewActivity, NewUser, SetGroups, UpdateUser, UserChanges, UserResponse},
    permissions::{codes, PermissionSet},
    state::AppState,
    utils::hash_password,
};

#[derive(Debug, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: UserResponse,
    pub groups: Vec<Group>,
    pub permissions: PermissionSet,
}

pub async fn list_users(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Vec<UserResponse>> {
    check_permission_or_error(&state.resolver, auth.id(), codes::USERS_READ).await?;
    let users = state.store.list_users().await?;
    Ok(ApiResponse::ok(users.into_iter().map(UserResponse::from).collect()))
}

pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<UserDetail> {
    if user_id != auth.id() {
        check_permission_or_error(&state.resolver, auth.id(), codes::USERS_READ).await?;
    }
    let user = state.store.get_user(user_id).await?;
    let groups = state.store.user_groups(user_id).await?;
    let permissions = state.resolver.resolve(user_id).await?;
    Ok(ApiResponse::ok(UserDetail {
        user: user.into(),
        groups,
        permissions,
    }))
}

pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(form): JsonBody<CreateUser>,
) -> ApiResult<UserResponse> {
    check_permission_or_error(&state.resolver, auth.id(), codes::USERS_WRITE).await?;
    let email = form.email.trim().to_lowercase();
    require_email(&email)?;
    require_password(&form.password)?;
    require_non_empty("first_name", &form.first_name)?;
    require_non_empty("last_name", &form.last_name)?;
    if !form.group_ids.is_empty() {
        check_permission_or_error(&state.resolver, auth.id(), codes::GROUPS_WRITE).await?;
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

    if !form.group_ids.is_empty() {
        state.store.set_user_groups(user.id, &form.group_ids).await?;
        state.permissions_changed(&[user.id]).await;
    }

    state.events.user_created(&user);
    state
        .record_activity(
            NewActivity::new(Some(auth.id()), "create", "user", Some(user.id))
                .with_details(user_details(&user)),
        )
        .await;
    state.refresh_dashboard().await;

    Ok(ApiResponse::created(user.into()).with_message("User created"))
}

pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    JsonBody(form): JsonBody<UpdateUser>,
) -> ApiResult<UserResponse> {
    let editing_self = user_id == auth.id();
    if !editing_self {
        check_permission_or_error(&state.resolver, auth.id(), codes::USERS_WRITE).await?;
    }
    if editing_self && form.is_active == Some(false) {
        return Err(ApiError::validation("You cannot deactivate your own account"));
    }

    let email = match form.email {
        Some(email) => {
            let email = email.trim().to_lowercase();
            require_email(&email)?;
            Some(email)
        }
        None => None,
    };
    if let Some(name) = &form.first_name {
        require_non_empty("first_name", name)?;
    }
    if let Some(name) = &form.last_name {
        require_non_empty("last_name", name)?;
    }
    let password_hash = match form.password {
        Some(password) => {
            require_password(&password)?;
            Some(hash_password(&password, state.config.bcrypt_cost)?)
        }
        None => None,
    };

    let before = state.store.get_user(user_id).await?;
    let user = state
        .store
        .update_user(
            user_id,
            UserChanges {
                email,
                password_hash,
                first_name: form.first_name.map(|n| n.trim().to_string()),
                last_name: form.last_name.map(|n| n.trim().to_string()),
                is_active: form.is_active,
                ..Default::default()
            },
        )
        .await?;

    state.events.user_updated(&user);
    if before.is_active && !user.is_active {
        state.end_user_sockets(user.id, "account deactivated");
    }
    state
        .record_activity(
            NewActivity::new(Some(auth.id()), "update", "user", Some(user.id))
                .with_details(user_details(&user)),
        )
        .await;
    if before.is_active != user.is_active {
        state.refresh_dashboard().await;
    }

    Ok(ApiResponse::ok(user.into()).with_message("User updated"))
}

pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<()> {
    check_permission_or_error(&state.resolver, auth.id(), codes::USERS_DELETE).await?;
    if user_id == auth.id() {
        return Err(ApiError::validation("You cannot delete your own account"));
    }

    let user = state.store.get_user(user_id).await?;
    state.store.delete_user(user_id).await?;
    state.resolver.invalidate_user(user_id).await;

    state.events.user_deleted(user_id);
    state.end_user_sockets(user_id, "account deleted");
    state
        .record_activity(
            NewActivity::new(Some(auth.id()), "delete", "user", Some(user_id))
                .with_details(user_details(&user)),
        )
        .await;
    state.refresh_dashboard().await;

    Ok(ApiResponse::ok(()).with_message("User deleted"))
}

pub async fn set_user_groups(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    JsonBody(form): JsonBody<SetGroups>,
) -> ApiResult<Vec<Group>> {
    check_permission_or_error(&state.resolver, auth.id(), codes::GROUPS_WRITE).await?;
    state.store.get_user(user_id).await?;
    state.store.set_user_groups(user_id, &form.group_ids).await?;
    state.permissions_changed(&[user_id]).await;

    let groups = state.store.user_groups(user_id).await?;
    state
        .record_activity(
            NewActivity::new(Some(auth.id()), "set_groups", "user", Some(user_id))
                .with_details(json!({ "group_ids": form.group_ids })),
        )
        .await;

    Ok(ApiResponse::ok(groups).with_message("Groups updated"))
}

pub async fn lock_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<UserResponse> {
    set_locked(state, auth, user_id, true).await
}

pub async fn unlock_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<UserResponse> {
    set_locked(state, auth, user_id, false).await
}

async fn set_locked(state: AppState, auth: AuthUser, user_id: Uuid, locked: bool) -> ApiResult<UserResponse> {
    check_permission_or_error(&state.resolver, auth.id(), codes::USERS_WRITE).await?;
    if user_id == auth.id() {
        return Err(ApiError::validation("You cannot lock or unlock your own account"));
    }

    let user = state
        .store
        .update_user(
            user_id,
            UserChanges {
                is_locked: Some(locked),
                ..Default::default()
            },
        )
        .await?;

    let action = if locked { "lock" } else { "unlock" };
    log::info!(target: "adminhub::users", "{} {action}ed by {}", user.email, auth.user.email);
    state.events.user_updated(&user);
    if locked {
        state.end_user_sockets(user_id, "account locked");
    }
    state
        .record_activity(
            NewActivity::new(Some(auth.id()), action, "user", Some(user_id))
                .with_details(json!({ "locked": locked })),
        )
        .await;
    state.refresh_dashboard().await;

    let message = if locked { "User locked" } else { "User unlocked" };
    Ok(ApiResponse::ok(user.into()).with_message(message))
}
