use uuid::Uuid;

use crate::{
    error::ApiError,
    permissions::{PermissionResolver, PermissionSet, Requirement},
};

/// Resolves the user's effective permissions and checks them against
/// `required`. `Ok(())` means the request may proceed.
pub async fn check_permission_or_error(
    resolver: &PermissionResolver,
    user_id: Uuid,
    required: impl Into<Requirement>,
) -> Result<(), ApiError> {
    let required = required.into();
    let permissions = resolve_permissions(resolver, user_id).await?;
    if permissions.satisfies(&required) {
        Ok(())
    } else {
        log::info!(target: "adminhub::auth", "user {user_id} denied: requires {required}");
        Err(ApiError::Forbidden(required.to_string()))
    }
}

pub async fn resolve_permissions(
    resolver: &PermissionResolver,
    user_id: Uuid,
) -> Result<PermissionSet, ApiError> {
    Ok(resolver.resolve(user_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::models::{CreatePermission, NewGroup, NewUser};
    use crate::store::{MemoryStore, Store};
    use axum::http::StatusCode;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn grant_is_visible_after_invalidation() {
        let store = Arc::new(MemoryStore::new());
        let resolver = PermissionResolver::new(
            store.clone(),
            Cache::memory(Duration::from_secs(60), Duration::from_secs(3600)),
        );
        let user = store
            .create_user(NewUser {
                email: "a@example.com".into(),
                password_hash: "x".into(),
                first_name: "A".into(),
                last_name: "User".into(),
                is_active: true,
            })
            .await
            .unwrap();

        let denied = check_permission_or_error(&resolver, user.id, "edit_profile").await;
        assert_eq!(denied.unwrap_err().status(), StatusCode::FORBIDDEN);

        let editor = store
            .create_group(NewGroup {
                name: "Editor".into(),
                codename: "editor".into(),
                description: None,
                is_active: true,
                is_system: false,
            })
            .await
            .unwrap();
        let permission = store
            .create_permission(CreatePermission {
                codename: "edit_profile".into(),
                name: "Edit profile".into(),
                description: None,
                category: None,
            })
            .await
            .unwrap();
        store.set_group_permissions(editor.id, &[permission.id]).await.unwrap();
        store.add_group_member(editor.id, user.id).await.unwrap();
        resolver.invalidate_user(user.id).await;

        check_permission_or_error(&resolver, user.id, "edit_profile").await.unwrap();
        check_permission_or_error(&resolver, user.id, Requirement::any_of(["nope", "edit_profile"]))
            .await
            .unwrap();
        assert!(check_permission_or_error(&resolver, user.id, Requirement::all_of(["nope", "edit_profile"]))
            .await
            .is_err());
    }
}
