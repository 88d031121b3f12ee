use axum::extract::{Path, State};
use serde_json::json;
use uuid::Uuid;

use super::{require_codename, require_non_empty, ApiResponse, ApiResult, JsonBody};
use crate::{
    middleware::{check_permission_or_error, AuthUser},
    models::{CreatePermission, NewActivity, Permission, UpdatePermission},
    permissions::codes,
    state::AppState,
};

/// Users holding `permission_id` through any group, or `None` when the lookup
/// failed and the caller has to flush every cached set instead.
async fn holders(state: &AppState, permission_id: Uuid) -> Option<Vec<Uuid>> {
    match state.store.users_with_permission(permission_id).await {
        Ok(users) => Some(users),
        Err(err) => {
            log::error!(target: "adminhub::permissions", "holder lookup for {permission_id} failed: {err}");
            None
        }
    }
}

pub async fn list_permissions(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Vec<Permission>> {
    check_permission_or_error(&state.resolver, auth.id(), codes::PERMISSIONS_READ).await?;
    Ok(ApiResponse::ok(state.store.list_permissions().await?))
}

pub async fn get_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(permission_id): Path<Uuid>,
) -> ApiResult<Permission> {
    check_permission_or_error(&state.resolver, auth.id(), codes::PERMISSIONS_READ).await?;
    Ok(ApiResponse::ok(state.store.get_permission(permission_id).await?))
}

pub async fn create_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(form): JsonBody<CreatePermission>,
) -> ApiResult<Permission> {
    check_permission_or_error(&state.resolver, auth.id(), codes::PERMISSIONS_WRITE).await?;
    require_codename(&form.codename)?;
    require_non_empty("name", &form.name)?;

    let permission = state.store.create_permission(form).await?;
    state
        .record_activity(
            NewActivity::new(Some(auth.id()), "create", "permission", Some(permission.id))
                .with_details(json!({ "codename": permission.codename })),
        )
        .await;
    state.refresh_dashboard().await;

    Ok(ApiResponse::created(permission).with_message("Permission created"))
}

pub async fn update_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(permission_id): Path<Uuid>,
    JsonBody(form): JsonBody<UpdatePermission>,
) -> ApiResult<Permission> {
    check_permission_or_error(&state.resolver, auth.id(), codes::PERMISSIONS_WRITE).await?;
    if let Some(codename) = &form.codename {
        require_codename(codename)?;
    }
    if let Some(name) = &form.name {
        require_non_empty("name", name)?;
    }

    let before = state.store.get_permission(permission_id).await?;
    let permission = state.store.update_permission(permission_id, form).await?;

    if permission.codename != before.codename {
        // Cached sets hold codenames, so every one mentioning the old name is
        // wrong now.
        state.all_permissions_changed().await;
        if let Some(users) = holders(&state, permission_id).await {
            state.events.permissions_changed(&users);
        }
    }

    state
        .record_activity(
            NewActivity::new(Some(auth.id()), "update", "permission", Some(permission.id))
                .with_details(json!({ "codename": permission.codename, "previous": before.codename })),
        )
        .await;

    Ok(ApiResponse::ok(permission).with_message("Permission updated"))
}

pub async fn delete_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(permission_id): Path<Uuid>,
) -> ApiResult<()> {
    check_permission_or_error(&state.resolver, auth.id(), codes::PERMISSIONS_DELETE).await?;
    let permission = state.store.get_permission(permission_id).await?;

    // Holders must be looked up before the assignments disappear.
    let affected = holders(&state, permission_id).await;
    state.store.delete_permission(permission_id).await?;
    match affected {
        Some(users) => state.permissions_changed(&users).await,
        None => state.all_permissions_changed().await,
    }

    state
        .record_activity(
            NewActivity::new(Some(auth.id()), "delete", "permission", Some(permission_id))
                .with_details(json!({ "codename": permission.codename })),
        )
        .await;
    state.refresh_dashboard().await;

    Ok(ApiResponse::ok(()).with_message("Permission deleted"))
}
