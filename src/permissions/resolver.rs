use std::sync::Arc;

use uuid::Uuid;

use super::PermissionSet;
use crate::cache::{keys, Cache, CacheDuration};
use crate::store::{Store, StoreError};

/// Derives a user's effective permission set and keeps it cached under
/// `permission-set:{user_id}`.
///
/// Every mutation of group membership, group activity or group permission
/// assignment must call one of the `invalidate_*` methods for the affected
/// users before it reports success.
#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn Store>,
    cache: Cache,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn Store>, cache: Cache) -> Self {
        Self { store, cache }
    }

    pub async fn resolve(&self, user_id: Uuid) -> Result<PermissionSet, StoreError> {
        let store = Arc::clone(&self.store);
        self.cache
            .with_cache(&keys::permission_set(user_id), CacheDuration::Long, || async move {
                load(store.as_ref(), user_id).await
            })
            .await
    }

    /// Bypasses any cached copy and stores the current set.
    pub async fn refresh(&self, user_id: Uuid) -> Result<PermissionSet, StoreError> {
        let store = Arc::clone(&self.store);
        self.cache
            .re_cache(&keys::permission_set(user_id), CacheDuration::Long, || async move {
                load(store.as_ref(), user_id).await
            })
            .await
    }

    pub async fn invalidate_user(&self, user_id: Uuid) {
        self.cache.invalidate(&keys::permission_set(user_id)).await;
    }

    pub async fn invalidate_users(&self, user_ids: &[Uuid]) {
        for user_id in user_ids {
            self.invalidate_user(*user_id).await;
        }
    }

    /// Flushes every cached set; used when the affected users are unknown.
    pub async fn invalidate_all(&self) {
        self.cache.invalidate_prefix(keys::PERMISSION_SET_PREFIX).await;
    }
}

async fn load(store: &dyn Store, user_id: Uuid) -> Result<PermissionSet, StoreError> {
    let codes = store.effective_permissions(user_id).await?;
    Ok(codes.into_iter().collect())
}
