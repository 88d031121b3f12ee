use axum::extract::State;
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiResponse, ApiResult, JsonBody};
use crate::{
    middleware::{check_permission_or_error, AuthUser},
    models::{MediaFolder, MediaItem},
    permissions::codes,
    state::AppState,
};

/// A change reported by the media storage service, relayed to the `media`
/// room unchanged.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum MediaChange {
    #[serde(rename = "media:created")]
    MediaCreated(MediaItem),
    #[serde(rename = "media:updated")]
    MediaUpdated(MediaItem),
    #[serde(rename = "media:deleted")]
    MediaDeleted { id: Uuid },
    #[serde(rename = "folder:created")]
    FolderCreated(MediaFolder),
    #[serde(rename = "folder:updated")]
    FolderUpdated(MediaFolder),
    #[serde(rename = "folder:deleted")]
    FolderDeleted { id: Uuid },
}

pub async fn report_change(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(change): JsonBody<MediaChange>,
) -> ApiResult<()> {
    check_permission_or_error(&state.resolver, auth.id(), codes::MEDIA_WRITE).await?;

    let events = &state.events;
    match &change {
        MediaChange::MediaCreated(item) => events.media_created(item),
        MediaChange::MediaUpdated(item) => events.media_updated(item),
        MediaChange::MediaDeleted { id } => events.media_deleted(*id),
        MediaChange::FolderCreated(folder) => events.folder_created(folder),
        MediaChange::FolderUpdated(folder) => events.folder_updated(folder),
        MediaChange::FolderDeleted { id } => events.folder_deleted(*id),
    }

    Ok(ApiResponse::ok(()).with_message("Change published"))
}
