use axum::extract::{Path, State};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::{ApiResponse, ApiResult, JsonBody};
use crate::{
    error::ApiError,
    middleware::{check_permission_or_error, AuthUser},
    models::{
        account_share::ACCESS_LEVELS, AccountShare, AccountShareList, CreateAccountShare, NewAccountShare,
        NewActivity,
    },
    permissions::codes,
    state::AppState,
};

pub async fn list_shares(State(state): State<AppState>, auth: AuthUser) -> ApiResult<AccountShareList> {
    let owned = state.store.shares_owned_by(auth.id()).await?;
    let received = state.store.shares_received_by(auth.id()).await?;
    Ok(ApiResponse::ok(AccountShareList { owned, received }))
}

pub async fn create_share(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(form): JsonBody<CreateAccountShare>,
) -> ApiResult<AccountShare> {
    check_permission_or_error(&state.resolver, auth.id(), codes::ACCOUNT_SHARES_MANAGE).await?;
    if !ACCESS_LEVELS.contains(&form.access_level.as_str()) {
        return Err(ApiError::validation(format!(
            "access_level must be one of {}",
            ACCESS_LEVELS.join(", ")
        )));
    }
    if form.expires_at.is_some_and(|at| at <= Utc::now()) {
        return Err(ApiError::validation("expires_at must be in the future"));
    }

    let recipient = state
        .store
        .find_user_by_email(&form.email.trim().to_lowercase())
        .await?
        .ok_or_else(|| ApiError::not_found("No user with that email"))?;
    if recipient.id == auth.id() {
        return Err(ApiError::validation("You cannot share your account with yourself"));
    }

    let share = state
        .store
        .create_share(NewAccountShare {
            owner_id: auth.id(),
            shared_with_id: recipient.id,
            access_level: form.access_level,
            expires_at: form.expires_at,
        })
        .await?;

    state.events.account_share_created(&share);
    state
        .record_activity(
            NewActivity::new(Some(auth.id()), "create", "account_share", Some(share.id))
                .with_details(json!({ "shared_with": recipient.email, "access_level": share.access_level })),
        )
        .await;

    Ok(ApiResponse::created(share).with_message("Account shared"))
}

/// Either side of a share may revoke it.
pub async fn revoke_share(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    let share = state.store.get_share(id).await?;
    if !share.involves(auth.id()) {
        return Err(ApiError::not_found("account share not found"));
    }
    state.store.delete_share(id).await?;

    state.events.account_share_revoked(&share);
    state
        .record_activity(NewActivity::new(Some(auth.id()), "revoke", "account_share", Some(id)))
        .await;

    Ok(ApiResponse::ok(()).with_message("Account share revoked"))
}
