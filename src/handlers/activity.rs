use axum::extract::{Path, Query, State};
use uuid::Uuid;

use super::{ApiResponse, ApiResult};
use crate::{
    middleware::{check_permission_or_error, AuthUser},
    models::{ActivityEntry, ActivityFilter},
    permissions::codes,
    state::AppState,
};

/// Anyone may page through their own entries; everything else needs
/// `activity:read`.
pub async fn list_activity(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(filter): Query<ActivityFilter>,
) -> ApiResult<Vec<ActivityEntry>> {
    if filter.actor_id != Some(auth.id()) {
        check_permission_or_error(&state.resolver, auth.id(), codes::ACTIVITY_READ).await?;
    }
    Ok(ApiResponse::ok(state.store.list_activity(&filter).await?))
}

pub async fn get_activity(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<ActivityEntry> {
    check_permission_or_error(&state.resolver, auth.id(), codes::ACTIVITY_READ).await?;
    Ok(ApiResponse::ok(state.store.get_activity(id).await?))
}

pub async fn delete_activity(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    check_permission_or_error(&state.resolver, auth.id(), codes::ACTIVITY_DELETE).await?;
    state.store.delete_activity(id).await?;

    log::info!(target: "adminhub::activity", "entry {id} deleted by {}", auth.user.email);
    state.events.activity_deleted(id);

    Ok(ApiResponse::ok(()).with_message("Activity entry deleted"))
}
