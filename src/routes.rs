use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{handlers, state::AppState, ws};

pub fn create_router(state: AppState) -> Router {
    let api = api_routes();
    let prefix = state.config.api_prefix.clone();
    let router = if prefix == "/" {
        Router::new().merge(api)
    } else {
        Router::new().nest(&prefix, api)
    };

    router
        .route("/health", get(handlers::health::health))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        // Authentication
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))

        // Permissions
        .route(
            "/permissions",
            get(handlers::permissions::list_permissions).post(handlers::permissions::create_permission),
        )
        .route(
            "/permissions/:id",
            get(handlers::permissions::get_permission)
                .put(handlers::permissions::update_permission)
                .delete(handlers::permissions::delete_permission),
        )

        // Groups
        .route("/groups", get(handlers::groups::list_groups).post(handlers::groups::create_group))
        .route(
            "/groups/:id",
            get(handlers::groups::get_group)
                .put(handlers::groups::update_group)
                .delete(handlers::groups::delete_group),
        )
        .route("/groups/:id/permissions", put(handlers::groups::set_group_permissions))
        .route("/groups/:id/members", post(handlers::groups::add_member))
        .route("/groups/:id/members/:user_id", delete(handlers::groups::remove_member))

        // Users
        .route("/users", get(handlers::users::list_users).post(handlers::users::create_user))
        .route(
            "/users/:id",
            get(handlers::users::get_user)
                .put(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        .route("/users/:id/groups", put(handlers::users::set_user_groups))
        .route("/users/:id/lock", post(handlers::users::lock_user))
        .route("/users/:id/unlock", post(handlers::users::unlock_user))

        // Notifications
        .route(
            "/notifications",
            get(handlers::notifications::list_notifications).post(handlers::notifications::create_notification),
        )
        .route("/notifications/unread-count", get(handlers::notifications::unread_count))
        .route("/notifications/read-all", post(handlers::notifications::mark_all_read))
        .route("/notifications/:id/read", patch(handlers::notifications::mark_read))
        .route("/notifications/:id", delete(handlers::notifications::delete_notification))

        // Activity log
        .route("/activity", get(handlers::activity::list_activity))
        .route(
            "/activity/:id",
            get(handlers::activity::get_activity).delete(handlers::activity::delete_activity),
        )

        // Account sharing
        .route(
            "/account-shares",
            get(handlers::account_shares::list_shares).post(handlers::account_shares::create_share),
        )
        .route("/account-shares/:id", delete(handlers::account_shares::revoke_share))

        // Dashboard
        .route("/dashboard/stats", get(handlers::dashboard::stats))
        .route("/dashboard/activity", get(handlers::dashboard::recent_activity))

        // Media change intake
        .route("/media/events", post(handlers::media::report_change))
}
