use axum::extract::{Path, State};
use serde_json::json;
use uuid::Uuid;

use super::{require_codename, require_non_empty, ApiResponse, ApiResult, JsonBody};
use crate::{
    error::ApiError,
    middleware::{check_permission_or_error, AuthUser},
    models::{
        builtin_permissions, AddMember, CreateGroup, Group, GroupDetail, NewActivity, NewGroup, SetPermissions,
        UpdateGroup,
    },
    permissions::codes,
    seed::ADMIN_GROUP,
    state::AppState,
};

async fn group_detail(state: &AppState, group: Group) -> Result<GroupDetail, ApiError> {
    let permissions = state.store.group_permissions(group.id).await?;
    let member_ids = state.store.group_member_ids(group.id).await?;
    Ok(GroupDetail {
        group,
        permissions,
        member_ids,
    })
}

/// The admin group must keep every built-in permission, or administrators
/// could lock themselves out.
async fn keeps_builtins(state: &AppState, permission_ids: &[Uuid]) -> Result<(), ApiError> {
    let catalog = state.store.list_permissions().await?;
    let missing: Vec<&str> = catalog
        .iter()
        .filter(|p| builtin_permissions().iter().any(|b| b.codename == p.codename))
        .filter(|p| !permission_ids.contains(&p.id))
        .map(|p| p.codename.as_str())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApiError::validation(format!(
            "The admin group must keep its built-in permissions (missing {})",
            missing.join(", ")
        )))
    }
}

pub async fn list_groups(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Vec<Group>> {
    check_permission_or_error(&state.resolver, auth.id(), codes::GROUPS_READ).await?;
    Ok(ApiResponse::ok(state.store.list_groups().await?))
}

pub async fn get_group(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<Uuid>,
) -> ApiResult<GroupDetail> {
    check_permission_or_error(&state.resolver, auth.id(), codes::GROUPS_READ).await?;
    let group = state.store.get_group(group_id).await?;
    Ok(ApiResponse::ok(group_detail(&state, group).await?))
}

pub async fn create_group(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(form): JsonBody<CreateGroup>,
) -> ApiResult<GroupDetail> {
    check_permission_or_error(&state.resolver, auth.id(), codes::GROUPS_WRITE).await?;
    require_non_empty("name", &form.name)?;
    require_codename(&form.codename)?;

    let group = state
        .store
        .create_group(NewGroup {
            name: form.name.trim().to_string(),
            codename: form.codename,
            description: form.description,
            is_active: form.is_active,
            is_system: false,
        })
        .await?;
    if !form.permission_ids.is_empty() {
        state.store.set_group_permissions(group.id, &form.permission_ids).await?;
    }
    // A new group has no members, so no cached set can be affected.

    state.events.group_created(&group);
    state
        .record_activity(
            NewActivity::new(Some(auth.id()), "create", "group", Some(group.id))
                .with_details(json!({ "codename": group.codename })),
        )
        .await;
    state.refresh_dashboard().await;

    Ok(ApiResponse::created(group_detail(&state, group).await?).with_message("Group created"))
}

pub async fn update_group(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<Uuid>,
    JsonBody(form): JsonBody<UpdateGroup>,
) -> ApiResult<GroupDetail> {
    check_permission_or_error(&state.resolver, auth.id(), codes::GROUPS_WRITE).await?;
    let before = state.store.get_group(group_id).await?;

    if let Some(name) = &form.name {
        require_non_empty("name", name)?;
    }
    if let Some(codename) = &form.codename {
        require_codename(codename)?;
        if before.is_system && *codename != before.codename {
            return Err(ApiError::validation("The codename of a system group cannot change"));
        }
    }
    if before.is_system && form.is_active == Some(false) {
        return Err(ApiError::validation("System groups cannot be deactivated"));
    }

    let members = state.store.group_member_ids(group_id).await?;
    let group = state.store.update_group(group_id, form).await?;
    if group.is_active != before.is_active || group.codename != before.codename {
        state.permissions_changed(&members).await;
    }

    state.events.group_updated(&group);
    state
        .record_activity(
            NewActivity::new(Some(auth.id()), "update", "group", Some(group.id))
                .with_details(json!({ "codename": group.codename, "is_active": group.is_active })),
        )
        .await;

    Ok(ApiResponse::ok(group_detail(&state, group).await?).with_message("Group updated"))
}

pub async fn delete_group(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<Uuid>,
) -> ApiResult<()> {
    check_permission_or_error(&state.resolver, auth.id(), codes::GROUPS_DELETE).await?;
    let group = state.store.get_group(group_id).await?;
    if group.is_system {
        return Err(ApiError::validation("System groups cannot be deleted"));
    }

    let members = state.store.group_member_ids(group_id).await?;
    state.store.delete_group(group_id).await?;
    state.permissions_changed(&members).await;

    state.events.group_deleted(group_id);
    state
        .record_activity(
            NewActivity::new(Some(auth.id()), "delete", "group", Some(group_id))
                .with_details(json!({ "codename": group.codename, "members": members.len() })),
        )
        .await;
    state.refresh_dashboard().await;

    Ok(ApiResponse::ok(()).with_message("Group deleted"))
}

pub async fn set_group_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<Uuid>,
    JsonBody(form): JsonBody<SetPermissions>,
) -> ApiResult<GroupDetail> {
    check_permission_or_error(&state.resolver, auth.id(), codes::GROUPS_WRITE).await?;
    let group = state.store.get_group(group_id).await?;
    if group.is_system && group.codename == ADMIN_GROUP {
        keeps_builtins(&state, &form.permission_ids).await?;
    }

    let members = state.store.group_member_ids(group_id).await?;
    state.store.set_group_permissions(group_id, &form.permission_ids).await?;
    state.permissions_changed(&members).await;

    state.events.group_updated(&group);
    state
        .record_activity(
            NewActivity::new(Some(auth.id()), "set_permissions", "group", Some(group_id))
                .with_details(json!({ "permission_ids": form.permission_ids })),
        )
        .await;

    Ok(ApiResponse::ok(group_detail(&state, group).await?).with_message("Permissions updated"))
}

pub async fn add_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<Uuid>,
    JsonBody(form): JsonBody<AddMember>,
) -> ApiResult<GroupDetail> {
    check_permission_or_error(&state.resolver, auth.id(), codes::GROUPS_WRITE).await?;
    let group = state.store.get_group(group_id).await?;
    state.store.get_user(form.user_id).await?;

    if state.store.add_group_member(group_id, form.user_id).await? {
        state.permissions_changed(&[form.user_id]).await;
        state
            .record_activity(
                NewActivity::new(Some(auth.id()), "add_member", "group", Some(group_id))
                    .with_details(json!({ "user_id": form.user_id })),
            )
            .await;
    }

    Ok(ApiResponse::ok(group_detail(&state, group).await?).with_message("Member added"))
}

pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<GroupDetail> {
    check_permission_or_error(&state.resolver, auth.id(), codes::GROUPS_WRITE).await?;
    let group = state.store.get_group(group_id).await?;

    if !state.store.remove_group_member(group_id, user_id).await? {
        return Err(ApiError::not_found("User is not a member of this group"));
    }
    state.permissions_changed(&[user_id]).await;
    state
        .record_activity(
            NewActivity::new(Some(auth.id()), "remove_member", "group", Some(group_id))
                .with_details(json!({ "user_id": user_id })),
        )
        .await;

    Ok(ApiResponse::ok(group_detail(&state, group).await?).with_message("Member removed"))
}
