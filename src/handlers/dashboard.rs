use axum::extract::{Query, State};
use serde::Deserialize;

use super::{ApiResponse, ApiResult};
use crate::{
    middleware::{check_permission_or_error, AuthUser},
    models::{ActivityEntry, ActivityFilter, DashboardStats},
    permissions::codes,
    state::AppState,
};

const RECENT_ACTIVITY: i64 = 10;

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub refresh: bool,
}

pub async fn stats(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<StatsQuery>,
) -> ApiResult<DashboardStats> {
    check_permission_or_error(&state.resolver, auth.id(), codes::DASHBOARD_READ).await?;
    let stats = if query.refresh {
        let stats = state.recompute_dashboard().await?;
        state.events.dashboard_stats(&stats);
        stats
    } else {
        state.dashboard_stats().await?
    };
    Ok(ApiResponse::ok(stats))
}

pub async fn recent_activity(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Vec<ActivityEntry>> {
    check_permission_or_error(&state.resolver, auth.id(), codes::DASHBOARD_READ).await?;
    let filter = ActivityFilter {
        limit: Some(RECENT_ACTIVITY),
        ..Default::default()
    };
    Ok(ApiResponse::ok(state.store.list_activity(&filter).await?))
}
