use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{new_session_token, Store, StoreError, StoreResult};
use crate::models::{
    AccountShare, ActivityEntry, ActivityFilter, CreatePermission, DashboardStats, Group,
    NewAccountShare, NewActivity, NewGroup, NewNotification, NewUser, Notification,
    NotificationQuery, Permission, Session, UpdateGroup, UpdatePermission, User, UserChanges,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    sessions: HashMap<Uuid, Session>,
    permissions: HashMap<Uuid, Permission>,
    groups: HashMap<Uuid, Group>,
    /// (group_id, permission_id)
    group_permissions: HashSet<(Uuid, Uuid)>,
    /// (group_id, user_id)
    memberships: HashSet<(Uuid, Uuid)>,
    notifications: HashMap<Uuid, Notification>,
    activity: Vec<ActivityEntry>,
    shares: HashMap<Uuid, AccountShare>,
}

impl Tables {
    fn user(&self, id: Uuid) -> StoreResult<&User> {
        self.users.get(&id).ok_or(StoreError::NotFound("user"))
    }

    fn group(&self, id: Uuid) -> StoreResult<&Group> {
        self.groups.get(&id).ok_or(StoreError::NotFound("group"))
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(email) && Some(u.id) != except)
    }

    fn permission_codename_taken(&self, codename: &str, except: Option<Uuid>) -> bool {
        self.permissions
            .values()
            .any(|p| p.codename == codename && Some(p.id) != except)
    }

    fn group_codename_taken(&self, codename: &str, except: Option<Uuid>) -> bool {
        self.groups
            .values()
            .any(|g| g.codename == codename && Some(g.id) != except)
    }
}

/// In-process store used when no database is configured, and by tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(key);
    items
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let mut t = self.tables.write().await;
        if t.email_taken(&new.email, None) {
            return Err(StoreError::Conflict(format!("email {} is already registered", new.email)));
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            is_active: new.is_active,
            is_locked: false,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<User> {
        self.tables.read().await.user(id).cloned()
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let t = self.tables.read().await;
        Ok(sorted(t.users.values().cloned().collect(), |u: &User| u.email.clone()))
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> StoreResult<User> {
        let mut t = self.tables.write().await;
        t.user(id)?;
        if let Some(email) = &changes.email {
            if t.email_taken(email, Some(id)) {
                return Err(StoreError::Conflict(format!("email {email} is already registered")));
            }
        }
        let user = t.users.get_mut(&id).ok_or(StoreError::NotFound("user"))?;
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        if let Some(first_name) = changes.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = changes.last_name {
            user.last_name = last_name;
        }
        if let Some(is_active) = changes.is_active {
            user.is_active = is_active;
        }
        if let Some(is_locked) = changes.is_locked {
            user.is_locked = is_locked;
        }
        if let Some(last_login) = changes.last_login {
            user.last_login = Some(last_login);
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.users.remove(&id).ok_or(StoreError::NotFound("user"))?;
        t.memberships.retain(|(_, user_id)| *user_id != id);
        t.sessions.retain(|_, s| s.user_id != id);
        t.notifications.retain(|_, n| n.user_id != id);
        t.shares.retain(|_, s| !s.involves(id));
        for entry in t.activity.iter_mut().filter(|e| e.actor_id == Some(id)) {
            entry.actor_id = None;
        }
        Ok(())
    }

    async fn create_session(&self, user_id: Uuid, expires_at: DateTime<Utc>) -> StoreResult<Session> {
        let mut t = self.tables.write().await;
        t.user(user_id)?;
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            token: new_session_token(),
            expires_at,
            created_at: Utc::now(),
        };
        t.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_session(&self, id: Uuid) -> StoreResult<Option<Session>> {
        Ok(self.tables.read().await.sessions.get(&id).cloned())
    }

    async fn find_session_by_token(&self, token: &str) -> StoreResult<Option<Session>> {
        let t = self.tables.read().await;
        Ok(t.sessions.values().find(|s| s.token == token).cloned())
    }

    async fn delete_session(&self, id: Uuid) -> StoreResult<()> {
        self.tables.write().await.sessions.remove(&id);
        Ok(())
    }

    async fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        let t = self.tables.read().await;
        Ok(sorted(t.permissions.values().cloned().collect(), |p: &Permission| p.codename.clone()))
    }

    async fn get_permission(&self, id: Uuid) -> StoreResult<Permission> {
        let t = self.tables.read().await;
        t.permissions.get(&id).cloned().ok_or(StoreError::NotFound("permission"))
    }

    async fn find_permission_by_codename(&self, codename: &str) -> StoreResult<Option<Permission>> {
        let t = self.tables.read().await;
        Ok(t.permissions.values().find(|p| p.codename == codename).cloned())
    }

    async fn create_permission(&self, new: CreatePermission) -> StoreResult<Permission> {
        let mut t = self.tables.write().await;
        if t.permission_codename_taken(&new.codename, None) {
            return Err(StoreError::Conflict(format!("permission {} already exists", new.codename)));
        }
        let permission = Permission {
            id: Uuid::new_v4(),
            codename: new.codename,
            name: new.name,
            description: new.description,
            category: new.category,
            created_at: Utc::now(),
        };
        t.permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }

    async fn update_permission(&self, id: Uuid, changes: UpdatePermission) -> StoreResult<Permission> {
        let mut t = self.tables.write().await;
        if let Some(codename) = &changes.codename {
            if t.permission_codename_taken(codename, Some(id)) {
                return Err(StoreError::Conflict(format!("permission {codename} already exists")));
            }
        }
        let permission = t.permissions.get_mut(&id).ok_or(StoreError::NotFound("permission"))?;
        if let Some(codename) = changes.codename {
            permission.codename = codename;
        }
        if let Some(name) = changes.name {
            permission.name = name;
        }
        if changes.description.is_some() {
            permission.description = changes.description;
        }
        if changes.category.is_some() {
            permission.category = changes.category;
        }
        Ok(permission.clone())
    }

    async fn delete_permission(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.permissions.remove(&id).ok_or(StoreError::NotFound("permission"))?;
        t.group_permissions.retain(|(_, permission_id)| *permission_id != id);
        Ok(())
    }

    async fn list_groups(&self) -> StoreResult<Vec<Group>> {
        let t = self.tables.read().await;
        Ok(sorted(t.groups.values().cloned().collect(), |g: &Group| g.name.clone()))
    }

    async fn get_group(&self, id: Uuid) -> StoreResult<Group> {
        self.tables.read().await.group(id).cloned()
    }

    async fn find_group_by_codename(&self, codename: &str) -> StoreResult<Option<Group>> {
        let t = self.tables.read().await;
        Ok(t.groups.values().find(|g| g.codename == codename).cloned())
    }

    async fn create_group(&self, new: NewGroup) -> StoreResult<Group> {
        let mut t = self.tables.write().await;
        if t.group_codename_taken(&new.codename, None) {
            return Err(StoreError::Conflict(format!("group {} already exists", new.codename)));
        }
        let now = Utc::now();
        let group = Group {
            id: Uuid::new_v4(),
            name: new.name,
            codename: new.codename,
            description: new.description,
            is_active: new.is_active,
            is_system: new.is_system,
            created_at: now,
            updated_at: now,
        };
        t.groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn update_group(&self, id: Uuid, changes: UpdateGroup) -> StoreResult<Group> {
        let mut t = self.tables.write().await;
        if let Some(codename) = &changes.codename {
            if t.group_codename_taken(codename, Some(id)) {
                return Err(StoreError::Conflict(format!("group {codename} already exists")));
            }
        }
        let group = t.groups.get_mut(&id).ok_or(StoreError::NotFound("group"))?;
        if let Some(name) = changes.name {
            group.name = name;
        }
        if let Some(codename) = changes.codename {
            group.codename = codename;
        }
        if changes.description.is_some() {
            group.description = changes.description;
        }
        if let Some(is_active) = changes.is_active {
            group.is_active = is_active;
        }
        group.updated_at = Utc::now();
        Ok(group.clone())
    }

    async fn delete_group(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.groups.remove(&id).ok_or(StoreError::NotFound("group"))?;
        t.group_permissions.retain(|(group_id, _)| *group_id != id);
        t.memberships.retain(|(group_id, _)| *group_id != id);
        Ok(())
    }

    async fn group_permissions(&self, group_id: Uuid) -> StoreResult<Vec<Permission>> {
        let t = self.tables.read().await;
        t.group(group_id)?;
        let permissions = t
            .group_permissions
            .iter()
            .filter(|(g, _)| *g == group_id)
            .filter_map(|(_, p)| t.permissions.get(p).cloned())
            .collect();
        Ok(sorted(permissions, |p: &Permission| p.codename.clone()))
    }

    async fn set_group_permissions(&self, group_id: Uuid, permission_ids: &[Uuid]) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.group(group_id)?;
        if permission_ids.iter().any(|id| !t.permissions.contains_key(id)) {
            return Err(StoreError::NotFound("permission"));
        }
        t.group_permissions.retain(|(g, _)| *g != group_id);
        t.group_permissions
            .extend(permission_ids.iter().map(|p| (group_id, *p)));
        Ok(())
    }

    async fn group_member_ids(&self, group_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let t = self.tables.read().await;
        t.group(group_id)?;
        let mut ids: Vec<Uuid> = t
            .memberships
            .iter()
            .filter(|(g, _)| *g == group_id)
            .map(|(_, u)| *u)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn add_group_member(&self, group_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        let mut t = self.tables.write().await;
        t.group(group_id)?;
        t.user(user_id)?;
        Ok(t.memberships.insert((group_id, user_id)))
    }

    async fn remove_group_member(&self, group_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        let mut t = self.tables.write().await;
        t.group(group_id)?;
        Ok(t.memberships.remove(&(group_id, user_id)))
    }

    async fn user_groups(&self, user_id: Uuid) -> StoreResult<Vec<Group>> {
        let t = self.tables.read().await;
        let groups = t
            .memberships
            .iter()
            .filter(|(_, u)| *u == user_id)
            .filter_map(|(g, _)| t.groups.get(g).cloned())
            .collect();
        Ok(sorted(groups, |g: &Group| g.name.clone()))
    }

    async fn set_user_groups(&self, user_id: Uuid, group_ids: &[Uuid]) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.user(user_id)?;
        if group_ids.iter().any(|id| !t.groups.contains_key(id)) {
            return Err(StoreError::NotFound("group"));
        }
        t.memberships.retain(|(_, u)| *u != user_id);
        t.memberships.extend(group_ids.iter().map(|g| (*g, user_id)));
        Ok(())
    }

    async fn users_with_permission(&self, permission_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let t = self.tables.read().await;
        let groups: HashSet<Uuid> = t
            .group_permissions
            .iter()
            .filter(|(_, p)| *p == permission_id)
            .map(|(g, _)| *g)
            .collect();
        let users: BTreeSet<Uuid> = t
            .memberships
            .iter()
            .filter(|(g, _)| groups.contains(g))
            .map(|(_, u)| *u)
            .collect();
        Ok(users.into_iter().collect())
    }

    async fn effective_permissions(&self, user_id: Uuid) -> StoreResult<Vec<String>> {
        let t = self.tables.read().await;
        let active_groups: HashSet<Uuid> = t
            .memberships
            .iter()
            .filter(|(_, u)| *u == user_id)
            .map(|(g, _)| *g)
            .filter(|g| t.groups.get(g).is_some_and(|group| group.is_active))
            .collect();
        let codes: BTreeSet<String> = t
            .group_permissions
            .iter()
            .filter(|(g, _)| active_groups.contains(g))
            .filter_map(|(_, p)| t.permissions.get(p).map(|p| p.codename.clone()))
            .collect();
        Ok(codes.into_iter().collect())
    }

    async fn create_notification(&self, new: NewNotification) -> StoreResult<Notification> {
        let mut t = self.tables.write().await;
        t.user(new.user_id)?;
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            title: new.title,
            message: new.message,
            kind: new.kind,
            link: new.link,
            read_at: None,
            created_at: Utc::now(),
        };
        t.notifications.insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn get_notification(&self, id: Uuid) -> StoreResult<Notification> {
        let t = self.tables.read().await;
        t.notifications.get(&id).cloned().ok_or(StoreError::NotFound("notification"))
    }

    async fn list_notifications(&self, user_id: Uuid, query: NotificationQuery) -> StoreResult<Vec<Notification>> {
        let t = self.tables.read().await;
        let mut items: Vec<Notification> = t
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && (!query.unread_only || !n.is_read()))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(query.limit() as usize);
        Ok(items)
    }

    async fn mark_notification_read(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<Notification> {
        let mut t = self.tables.write().await;
        let notification = t.notifications.get_mut(&id).ok_or(StoreError::NotFound("notification"))?;
        notification.read_at.get_or_insert(at);
        Ok(notification.clone())
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid, at: DateTime<Utc>) -> StoreResult<Vec<Notification>> {
        let mut t = self.tables.write().await;
        let changed = t
            .notifications
            .values_mut()
            .filter(|n| n.user_id == user_id && n.read_at.is_none())
            .map(|n| {
                n.read_at = Some(at);
                n.clone()
            })
            .collect();
        Ok(changed)
    }

    async fn delete_notification(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.notifications.remove(&id).ok_or(StoreError::NotFound("notification"))?;
        Ok(())
    }

    async fn unread_notification_count(&self, user_id: Uuid) -> StoreResult<i64> {
        let t = self.tables.read().await;
        Ok(t.notifications.values().filter(|n| n.user_id == user_id && !n.is_read()).count() as i64)
    }

    async fn append_activity(&self, new: NewActivity) -> StoreResult<ActivityEntry> {
        let entry = ActivityEntry {
            id: Uuid::new_v4(),
            actor_id: new.actor_id,
            action: new.action,
            resource_type: new.resource_type,
            resource_id: new.resource_id,
            details: sqlx::types::Json(new.details),
            created_at: Utc::now(),
        };
        self.tables.write().await.activity.push(entry.clone());
        Ok(entry)
    }

    async fn list_activity(&self, filter: &ActivityFilter) -> StoreResult<Vec<ActivityEntry>> {
        let t = self.tables.read().await;
        // Entries are appended in order, so reverse iteration is newest first.
        Ok(t.activity
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .cloned()
            .collect())
    }

    async fn get_activity(&self, id: Uuid) -> StoreResult<ActivityEntry> {
        let t = self.tables.read().await;
        t.activity.iter().find(|e| e.id == id).cloned().ok_or(StoreError::NotFound("activity entry"))
    }

    async fn delete_activity(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        let before = t.activity.len();
        t.activity.retain(|e| e.id != id);
        if t.activity.len() == before {
            return Err(StoreError::NotFound("activity entry"));
        }
        Ok(())
    }

    async fn create_share(&self, new: NewAccountShare) -> StoreResult<AccountShare> {
        let mut t = self.tables.write().await;
        t.user(new.owner_id)?;
        t.user(new.shared_with_id)?;
        if t
            .shares
            .values()
            .any(|s| s.owner_id == new.owner_id && s.shared_with_id == new.shared_with_id)
        {
            return Err(StoreError::Conflict("account is already shared with this user".into()));
        }
        let share = AccountShare {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            shared_with_id: new.shared_with_id,
            access_level: new.access_level,
            expires_at: new.expires_at,
            created_at: Utc::now(),
        };
        t.shares.insert(share.id, share.clone());
        Ok(share)
    }

    async fn get_share(&self, id: Uuid) -> StoreResult<AccountShare> {
        let t = self.tables.read().await;
        t.shares.get(&id).cloned().ok_or(StoreError::NotFound("account share"))
    }

    async fn shares_owned_by(&self, user_id: Uuid) -> StoreResult<Vec<AccountShare>> {
        let t = self.tables.read().await;
        let shares = t.shares.values().filter(|s| s.owner_id == user_id).cloned().collect();
        Ok(sorted(shares, |s: &AccountShare| s.created_at))
    }

    async fn shares_received_by(&self, user_id: Uuid) -> StoreResult<Vec<AccountShare>> {
        let t = self.tables.read().await;
        let shares = t.shares.values().filter(|s| s.shared_with_id == user_id).cloned().collect();
        Ok(sorted(shares, |s: &AccountShare| s.created_at))
    }

    async fn delete_share(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.shares.remove(&id).ok_or(StoreError::NotFound("account share"))?;
        Ok(())
    }

    async fn dashboard_stats(&self) -> StoreResult<DashboardStats> {
        let t = self.tables.read().await;
        let now = Utc::now();
        let since = now - Duration::hours(24);
        let count = |n: usize| n as i64;
        Ok(DashboardStats {
            total_users: count(t.users.len()),
            active_users: count(t.users.values().filter(|u| u.is_active).count()),
            locked_users: count(t.users.values().filter(|u| u.is_locked).count()),
            total_groups: count(t.groups.len()),
            total_permissions: count(t.permissions.len()),
            unread_notifications: count(t.notifications.values().filter(|n| !n.is_read()).count()),
            activity_last_24h: count(t.activity.iter().filter(|e| e.created_at >= since).count()),
            generated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "hash".into(),
            first_name: "Test".into(),
            last_name: "User".into(),
            is_active: true,
        }
    }

    fn new_group(codename: &str, is_active: bool) -> NewGroup {
        NewGroup {
            name: codename.to_string(),
            codename: codename.to_string(),
            description: None,
            is_active,
            is_system: false,
        }
    }

    fn new_permission(codename: &str) -> CreatePermission {
        CreatePermission {
            codename: codename.to_string(),
            name: codename.to_string(),
            description: None,
            category: None,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let store = MemoryStore::new();
        store.create_user(new_user("a@example.com")).await.unwrap();
        let err = store.create_user(new_user("A@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn effective_permissions_union_active_groups_only() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@example.com")).await.unwrap();
        let editors = store.create_group(new_group("editor", true)).await.unwrap();
        let retired = store.create_group(new_group("retired", false)).await.unwrap();
        let edit = store.create_permission(new_permission("edit_profile")).await.unwrap();
        let view = store.create_permission(new_permission("view_profile")).await.unwrap();
        let purge = store.create_permission(new_permission("purge")).await.unwrap();

        store.set_group_permissions(editors.id, &[edit.id, view.id]).await.unwrap();
        store.set_group_permissions(retired.id, &[view.id, purge.id]).await.unwrap();
        store.add_group_member(editors.id, user.id).await.unwrap();
        store.add_group_member(retired.id, user.id).await.unwrap();

        let codes = store.effective_permissions(user.id).await.unwrap();
        assert_eq!(codes, vec!["edit_profile".to_string(), "view_profile".to_string()]);
    }

    #[tokio::test]
    async fn deleting_permission_removes_group_assignments() {
        let store = MemoryStore::new();
        let group = store.create_group(new_group("editor", true)).await.unwrap();
        let edit = store.create_permission(new_permission("edit_profile")).await.unwrap();
        store.set_group_permissions(group.id, &[edit.id]).await.unwrap();

        store.delete_permission(edit.id).await.unwrap();
        assert!(store.group_permissions(group.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_read_keeps_first_timestamp() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@example.com")).await.unwrap();
        let n = store
            .create_notification(NewNotification {
                user_id: user.id,
                title: "Hi".into(),
                message: "There".into(),
                kind: "info".into(),
                link: None,
            })
            .await
            .unwrap();
        let first = Utc::now();
        let read = store.mark_notification_read(n.id, first).await.unwrap();
        let again = store.mark_notification_read(n.id, first + Duration::minutes(5)).await.unwrap();
        assert_eq!(read.read_at, Some(first));
        assert_eq!(again.read_at, Some(first));
        assert_eq!(store.unread_notification_count(user.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn deleting_user_cascades() {
        let store = MemoryStore::new();
        let a = store.create_user(new_user("a@example.com")).await.unwrap();
        let b = store.create_user(new_user("b@example.com")).await.unwrap();
        let group = store.create_group(new_group("editor", true)).await.unwrap();
        store.add_group_member(group.id, a.id).await.unwrap();
        store
            .create_share(NewAccountShare {
                owner_id: a.id,
                shared_with_id: b.id,
                access_level: "view".into(),
                expires_at: None,
            })
            .await
            .unwrap();

        store.delete_user(a.id).await.unwrap();
        assert!(store.group_member_ids(group.id).await.unwrap().is_empty());
        assert!(store.shares_received_by(b.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn activity_lists_newest_first_with_paging() {
        let store = MemoryStore::new();
        for action in ["one", "two", "three"] {
            store.append_activity(NewActivity::new(None, action, "test", None)).await.unwrap();
        }
        let filter = ActivityFilter { limit: Some(2), ..Default::default() };
        let page: Vec<String> = store
            .list_activity(&filter)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(page, vec!["three", "two"]);
    }
}
