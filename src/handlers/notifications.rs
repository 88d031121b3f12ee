use axum::extract::{Path, Query, State};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use super::{require_non_empty, ApiResponse, ApiResult, JsonBody};
use crate::{
    error::ApiError,
    middleware::{check_permission_or_error, AuthUser},
    models::{
        notification::NOTIFICATION_KINDS, CreateNotification, NewActivity, NewNotification, Notification,
        NotificationQuery,
    },
    permissions::codes,
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct ReadAllResult {
    pub updated: usize,
}

/// Loads a notification owned by the caller. Other users' notifications
/// read as missing.
async fn owned(state: &AppState, auth: &AuthUser, id: Uuid) -> Result<Notification, ApiError> {
    let notification = state.store.get_notification(id).await?;
    if notification.user_id != auth.id() {
        return Err(ApiError::not_found("notification not found"));
    }
    Ok(notification)
}

pub async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Vec<Notification>> {
    Ok(ApiResponse::ok(state.store.list_notifications(auth.id(), query).await?))
}

pub async fn unread_count(State(state): State<AppState>, auth: AuthUser) -> ApiResult<UnreadCount> {
    let count = state.store.unread_notification_count(auth.id()).await?;
    Ok(ApiResponse::ok(UnreadCount { count }))
}

pub async fn create_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(form): JsonBody<CreateNotification>,
) -> ApiResult<Notification> {
    check_permission_or_error(&state.resolver, auth.id(), codes::NOTIFICATIONS_CREATE).await?;
    require_non_empty("title", &form.title)?;
    require_non_empty("message", &form.message)?;
    if !NOTIFICATION_KINDS.contains(&form.kind.as_str()) {
        return Err(ApiError::validation(format!(
            "kind must be one of {}",
            NOTIFICATION_KINDS.join(", ")
        )));
    }
    state.store.get_user(form.user_id).await?;

    let notification = state
        .store
        .create_notification(NewNotification {
            user_id: form.user_id,
            title: form.title.trim().to_string(),
            message: form.message,
            kind: form.kind,
            link: form.link,
        })
        .await?;

    state.events.notification_new(&notification);
    state
        .record_activity(
            NewActivity::new(Some(auth.id()), "create", "notification", Some(notification.id))
                .with_details(json!({ "recipient": notification.user_id, "kind": notification.kind })),
        )
        .await;
    state.refresh_dashboard().await;

    Ok(ApiResponse::created(notification).with_message("Notification sent"))
}

pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Notification> {
    let notification = owned(&state, &auth, id).await?;
    if notification.is_read() {
        return Ok(ApiResponse::ok(notification));
    }

    let notification = state.store.mark_notification_read(id, Utc::now()).await?;
    state.events.notification_updated(&notification);
    state.refresh_dashboard().await;

    Ok(ApiResponse::ok(notification).with_message("Notification marked as read"))
}

pub async fn mark_all_read(State(state): State<AppState>, auth: AuthUser) -> ApiResult<ReadAllResult> {
    let changed = state
        .store
        .mark_all_notifications_read(auth.id(), Utc::now())
        .await?;
    for notification in &changed {
        state.events.notification_updated(notification);
    }
    if !changed.is_empty() {
        state.refresh_dashboard().await;
    }

    Ok(ApiResponse::ok(ReadAllResult { updated: changed.len() }))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    let notification = owned(&state, &auth, id).await?;
    state.store.delete_notification(id).await?;

    state.events.notification_deleted(id, notification.user_id);
    if !notification.is_read() {
        state.refresh_dashboard().await;
    }

    Ok(ApiResponse::ok(()).with_message("Notification deleted"))
}
