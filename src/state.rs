use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::cache::{keys, Cache, CacheDuration};
use crate::config::Config;
use crate::error::ApiError;
use crate::events::{EventEmitter, RoomHub};
use crate::models::{DashboardStats, NewActivity};
use crate::permissions::PermissionResolver;
use crate::store::{Store, StoreError};
use crate::utils::TokenIssuer;
use crate::ws::authorize_room;

/// Everything a handler needs, handed out through axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub cache: Cache,
    pub resolver: PermissionResolver,
    pub hub: Arc<RoomHub>,
    pub events: EventEmitter,
    pub tokens: TokenIssuer,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn Store>, cache: Cache) -> Self {
        let hub = Arc::new(RoomHub::new(config.ws_room_history));
        let tokens = TokenIssuer::new(
            &config.jwt_secret,
            Duration::hours(config.session_ttl_hours),
        );
        Self {
            resolver: PermissionResolver::new(Arc::clone(&store), cache.clone()),
            events: EventEmitter::new(Arc::clone(&hub)),
            config: Arc::new(config),
            store,
            cache,
            hub,
            tokens,
        }
    }

    /// Drops the cached permission sets of `user_ids`, tells their clients to
    /// refetch and evicts their sockets from rooms they may no longer read.
    pub async fn permissions_changed(&self, user_ids: &[Uuid]) {
        if user_ids.is_empty() {
            return;
        }
        self.resolver.invalidate_users(user_ids).await;
        self.events.permissions_changed(user_ids);
        for user_id in user_ids {
            self.reauthorize_sockets(*user_id).await;
        }
    }

    /// Flushes every cached permission set. Connected clients are not told
    /// individually since the affected users are unknown, but every open
    /// socket has its rooms re-checked.
    pub async fn all_permissions_changed(&self) {
        self.resolver.invalidate_all().await;
        for user_id in self.hub.connected_users() {
            self.reauthorize_sockets(user_id).await;
        }
    }

    /// Re-runs the join check for every room `user_id`'s sockets hold.
    pub async fn reauthorize_sockets(&self, user_id: Uuid) {
        for (conn, rooms) in self.hub.connections_of(user_id) {
            for room in rooms {
                match authorize_room(self, user_id, room).await {
                    Ok(()) => {}
                    Err(ApiError::Forbidden(_)) => {
                        self.hub.evict(conn, room, &format!("access to {room} was revoked"));
                    }
                    Err(err) => {
                        log::error!(target: "adminhub::ws", "re-checking {room} for {user_id} failed: {err}");
                        self.hub.evict(conn, room, &format!("could not re-check access to {room}"));
                    }
                }
            }
        }
    }

    /// Closes every socket of `user_id`, e.g. after a lock or deletion.
    pub fn end_user_sockets(&self, user_id: Uuid, reason: &str) {
        self.hub.close_user(user_id, reason);
    }

    /// Closes the sockets opened with one session, e.g. on logout.
    pub fn end_session_sockets(&self, session_id: Uuid) {
        self.hub.close_session(session_id, "session ended");
    }

    /// Appends to the activity log and pushes `activity:new`. A failed write
    /// is logged and otherwise ignored.
    pub async fn record_activity(&self, activity: NewActivity) {
        match self.store.append_activity(activity).await {
            Ok(entry) => self.events.activity_new(&entry),
            Err(err) => log::error!(target: "adminhub::activity", "failed to record activity: {err}"),
        }
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError> {
        let store = Arc::clone(&self.store);
        let stats = self
            .cache
            .with_cache(keys::DASHBOARD_STATS, CacheDuration::Short, || async move {
                store.dashboard_stats().await
            })
            .await?;
        Ok(stats)
    }

    pub async fn recompute_dashboard(&self) -> Result<DashboardStats, StoreError> {
        let store = Arc::clone(&self.store);
        self.cache
            .re_cache(keys::DASHBOARD_STATS, CacheDuration::Short, || async move {
                store.dashboard_stats().await
            })
            .await
    }

    /// Recomputes the dashboard counters and pushes them to the dashboard
    /// room.
    pub async fn refresh_dashboard(&self) {
        match self.recompute_dashboard().await {
            Ok(stats) => self.events.dashboard_stats(&stats),
            Err(err) => log::error!(target: "adminhub::dashboard", "failed to refresh stats: {err}"),
        }
    }
}
