use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{new_session_token, Store, StoreError, StoreResult};
use crate::database::Database;
use crate::models::{
    AccountShare, ActivityEntry, ActivityFilter, CreatePermission, DashboardStats, Group,
    NewAccountShare, NewActivity, NewGroup, NewNotification, NewUser, Notification,
    NotificationQuery, Permission, Session, UpdateGroup, UpdatePermission, User, UserChanges,
};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    db: Database,
}

impl PgStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

/// Maps constraint violations onto domain errors; `what` names the row the
/// caller was writing.
fn map_write_error(err: sqlx::Error, what: &'static str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some(UNIQUE_VIOLATION) => return StoreError::Conflict(format!("{what} already exists")),
            Some(FOREIGN_KEY_VIOLATION) => return StoreError::NotFound("referenced record"),
            _ => {}
        }
    }
    StoreError::Database(err)
}

fn expect_row<T>(row: Option<T>, what: &'static str) -> StoreResult<T> {
    row.ok_or(StoreError::NotFound(what))
}

fn expect_affected(rows: u64, what: &'static str) -> StoreResult<()> {
    if rows == 0 {
        Err(StoreError::NotFound(what))
    } else {
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash, first_name, last_name, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, email, password_hash, first_name, last_name, is_active, is_locked,
                      last_login, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(new.is_active)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_write_error(e, "user with this email"))
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        expect_row(user, "user")
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY email")
            .fetch_all(&self.db)
            .await?)
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                email = COALESCE($2, email),
                password_hash = COALESCE($3, password_hash),
                first_name = COALESCE($4, first_name),
                last_name = COALESCE($5, last_name),
                is_active = COALESCE($6, is_active),
                is_locked = COALESCE($7, is_locked),
                last_login = COALESCE($8, last_login),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&changes.email)
        .bind(&changes.password_hash)
        .bind(&changes.first_name)
        .bind(&changes.last_name)
        .bind(changes.is_active)
        .bind(changes.is_locked)
        .bind(changes.last_login)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_write_error(e, "user with this email"))?;
        expect_row(user, "user")
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<()> {
        // Memberships, sessions, notifications and shares cascade.
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        expect_affected(result.rows_affected(), "user")
    }

    async fn create_session(&self, user_id: Uuid, expires_at: DateTime<Utc>) -> StoreResult<Session> {
        sqlx::query_as::<_, Session>(
            "INSERT INTO sessions (id, user_id, token, expires_at) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(new_session_token())
        .bind(expires_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_write_error(e, "session"))
    }

    async fn find_session(&self, id: Uuid) -> StoreResult<Option<Session>> {
        Ok(sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn find_session_by_token(&self, token: &str) -> StoreResult<Option<Session>> {
        Ok(sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn delete_session(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        Ok(sqlx::query_as::<_, Permission>("SELECT * FROM permissions ORDER BY codename")
            .fetch_all(&self.db)
            .await?)
    }

    async fn get_permission(&self, id: Uuid) -> StoreResult<Permission> {
        let permission = sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        expect_row(permission, "permission")
    }

    async fn find_permission_by_codename(&self, codename: &str) -> StoreResult<Option<Permission>> {
        Ok(sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE codename = $1")
            .bind(codename)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn create_permission(&self, new: CreatePermission) -> StoreResult<Permission> {
        sqlx::query_as::<_, Permission>(
            r#"
            INSERT INTO permissions (id, codename, name, description, category)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.codename)
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.category)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_write_error(e, "permission"))
    }

    async fn update_permission(&self, id: Uuid, changes: UpdatePermission) -> StoreResult<Permission> {
        let permission = sqlx::query_as::<_, Permission>(
            r#"
            UPDATE permissions SET
                codename = COALESCE($2, codename),
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                category = COALESCE($5, category)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&changes.codename)
        .bind(&changes.name)
        .bind(&changes.description)
        .bind(&changes.category)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_write_error(e, "permission"))?;
        expect_row(permission, "permission")
    }

    async fn delete_permission(&self, id: Uuid) -> StoreResult<()> {
        // group_permissions rows cascade.
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        expect_affected(result.rows_affected(), "permission")
    }

    async fn list_groups(&self) -> StoreResult<Vec<Group>> {
        Ok(sqlx::query_as::<_, Group>("SELECT * FROM access_groups ORDER BY name")
            .fetch_all(&self.db)
            .await?)
    }

    async fn get_group(&self, id: Uuid) -> StoreResult<Group> {
        let group = sqlx::query_as::<_, Group>("SELECT * FROM access_groups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        expect_row(group, "group")
    }

    async fn find_group_by_codename(&self, codename: &str) -> StoreResult<Option<Group>> {
        Ok(sqlx::query_as::<_, Group>("SELECT * FROM access_groups WHERE codename = $1")
            .bind(codename)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn create_group(&self, new: NewGroup) -> StoreResult<Group> {
        sqlx::query_as::<_, Group>(
            r#"
            INSERT INTO access_groups (id, name, codename, description, is_active, is_system)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.codename)
        .bind(&new.description)
        .bind(new.is_active)
        .bind(new.is_system)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_write_error(e, "group"))
    }

    async fn update_group(&self, id: Uuid, changes: UpdateGroup) -> StoreResult<Group> {
        let group = sqlx::query_as::<_, Group>(
            r#"
            UPDATE access_groups SET
                name = COALESCE($2, name),
                codename = COALESCE($3, codename),
                description = COALESCE($4, description),
                is_active = COALESCE($5, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.codename)
        .bind(&changes.description)
        .bind(changes.is_active)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_write_error(e, "group"))?;
        expect_row(group, "group")
    }

    async fn delete_group(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM access_groups WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        expect_affected(result.rows_affected(), "group")
    }

    async fn group_permissions(&self, group_id: Uuid) -> StoreResult<Vec<Permission>> {
        self.get_group(group_id).await?;
        Ok(sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.* FROM permissions p
            JOIN group_permissions gp ON gp.permission_id = p.id
            WHERE gp.group_id = $1
            ORDER BY p.codename
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.db)
        .await?)
    }

    async fn set_group_permissions(&self, group_id: Uuid, permission_ids: &[Uuid]) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;

        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM access_groups WHERE id = $1 FOR UPDATE")
            .bind(group_id)
            .fetch_optional(&mut *tx)
            .await?;
        expect_row(exists, "group")?;

        sqlx::query("DELETE FROM group_permissions WHERE group_id = $1")
            .bind(group_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO group_permissions (group_id, permission_id)
            SELECT $1, UNNEST($2::uuid[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(group_id)
        .bind(permission_ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, "permission assignment"))?;

        tx.commit().await?;
        Ok(())
    }

    async fn group_member_ids(&self, group_id: Uuid) -> StoreResult<Vec<Uuid>> {
        self.get_group(group_id).await?;
        Ok(sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM user_groups WHERE group_id = $1 ORDER BY user_id",
        )
        .bind(group_id)
        .fetch_all(&self.db)
        .await?)
    }

    async fn add_group_member(&self, group_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO user_groups (group_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(group_id)
        .bind(user_id)
        .execute(&self.db)
        .await
        .map_err(|e| map_write_error(e, "membership"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_group_member(&self, group_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        self.get_group(group_id).await?;
        let result = sqlx::query("DELETE FROM user_groups WHERE group_id = $1 AND user_id = $2")
            .bind(group_id)
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn user_groups(&self, user_id: Uuid) -> StoreResult<Vec<Group>> {
        Ok(sqlx::query_as::<_, Group>(
            r#"
            SELECT g.* FROM access_groups g
            JOIN user_groups ug ON ug.group_id = g.id
            WHERE ug.user_id = $1
            ORDER BY g.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?)
    }

    async fn set_user_groups(&self, user_id: Uuid, group_ids: &[Uuid]) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;

        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        expect_row(exists, "user")?;

        sqlx::query("DELETE FROM user_groups WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO user_groups (group_id, user_id)
            SELECT UNNEST($1::uuid[]), $2
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(group_ids)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, "membership"))?;

        tx.commit().await?;
        Ok(())
    }

    async fn users_with_permission(&self, permission_id: Uuid) -> StoreResult<Vec<Uuid>> {
        Ok(sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT DISTINCT ug.user_id
            FROM user_groups ug
            JOIN group_permissions gp ON gp.group_id = ug.group_id
            WHERE gp.permission_id = $1
            ORDER BY ug.user_id
            "#,
        )
        .bind(permission_id)
        .fetch_all(&self.db)
        .await?)
    }

    async fn effective_permissions(&self, user_id: Uuid) -> StoreResult<Vec<String>> {
        Ok(sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT p.codename
            FROM permissions p
            JOIN group_permissions gp ON gp.permission_id = p.id
            JOIN access_groups g ON g.id = gp.group_id
            JOIN user_groups ug ON ug.group_id = g.id
            WHERE ug.user_id = $1 AND g.is_active = true
            ORDER BY p.codename
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?)
    }

    async fn create_notification(&self, new: NewNotification) -> StoreResult<Notification> {
        sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (id, user_id, title, message, kind, link)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(&new.title)
        .bind(&new.message)
        .bind(&new.kind)
        .bind(&new.link)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_write_error(e, "notification"))
    }

    async fn get_notification(&self, id: Uuid) -> StoreResult<Notification> {
        let notification = sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        expect_row(notification, "notification")
    }

    async fn list_notifications(&self, user_id: Uuid, query: NotificationQuery) -> StoreResult<Vec<Notification>> {
        Ok(sqlx::query_as::<_, Notification>(
            r#"
            SELECT * FROM notifications
            WHERE user_id = $1 AND ($2 = false OR read_at IS NULL)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(query.unread_only)
        .bind(query.limit())
        .fetch_all(&self.db)
        .await?)
    }

    async fn mark_notification_read(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<Notification> {
        let notification = sqlx::query_as::<_, Notification>(
            "UPDATE notifications SET read_at = COALESCE(read_at, $2) WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(at)
        .fetch_optional(&self.db)
        .await?;
        expect_row(notification, "notification")
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid, at: DateTime<Utc>) -> StoreResult<Vec<Notification>> {
        Ok(sqlx::query_as::<_, Notification>(
            "UPDATE notifications SET read_at = $2 WHERE user_id = $1 AND read_at IS NULL RETURNING *",
        )
        .bind(user_id)
        .bind(at)
        .fetch_all(&self.db)
        .await?)
    }

    async fn delete_notification(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        expect_affected(result.rows_affected(), "notification")
    }

    async fn unread_notification_count(&self, user_id: Uuid) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await?)
    }

    async fn append_activity(&self, new: NewActivity) -> StoreResult<ActivityEntry> {
        sqlx::query_as::<_, ActivityEntry>(
            r#"
            INSERT INTO activity_log (id, actor_id, action, resource_type, resource_id, details)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.actor_id)
        .bind(&new.action)
        .bind(&new.resource_type)
        .bind(new.resource_id)
        .bind(sqlx::types::Json(&new.details))
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_write_error(e, "activity entry"))
    }

    async fn list_activity(&self, filter: &ActivityFilter) -> StoreResult<Vec<ActivityEntry>> {
        Ok(sqlx::query_as::<_, ActivityEntry>(
            r#"
            SELECT * FROM activity_log
            WHERE ($1::uuid IS NULL OR actor_id = $1)
              AND ($2::text IS NULL OR resource_type = $2)
              AND ($3::uuid IS NULL OR resource_id = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.actor_id)
        .bind(&filter.resource_type)
        .bind(filter.resource_id)
        .bind(filter.limit())
        .bind(filter.offset())
        .fetch_all(&self.db)
        .await?)
    }

    async fn get_activity(&self, id: Uuid) -> StoreResult<ActivityEntry> {
        let entry = sqlx::query_as::<_, ActivityEntry>("SELECT * FROM activity_log WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        expect_row(entry, "activity entry")
    }

    async fn delete_activity(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM activity_log WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        expect_affected(result.rows_affected(), "activity entry")
    }

    async fn create_share(&self, new: NewAccountShare) -> StoreResult<AccountShare> {
        sqlx::query_as::<_, AccountShare>(
            r#"
            INSERT INTO account_shares (id, owner_id, shared_with_id, access_level, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.owner_id)
        .bind(new.shared_with_id)
        .bind(&new.access_level)
        .bind(new.expires_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_write_error(e, "account share for this user"))
    }

    async fn get_share(&self, id: Uuid) -> StoreResult<AccountShare> {
        let share = sqlx::query_as::<_, AccountShare>("SELECT * FROM account_shares WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        expect_row(share, "account share")
    }

    async fn shares_owned_by(&self, user_id: Uuid) -> StoreResult<Vec<AccountShare>> {
        Ok(sqlx::query_as::<_, AccountShare>(
            "SELECT * FROM account_shares WHERE owner_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?)
    }

    async fn shares_received_by(&self, user_id: Uuid) -> StoreResult<Vec<AccountShare>> {
        Ok(sqlx::query_as::<_, AccountShare>(
            "SELECT * FROM account_shares WHERE shared_with_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?)
    }

    async fn delete_share(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM account_shares WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        expect_affected(result.rows_affected(), "account share")
    }

    async fn dashboard_stats(&self) -> StoreResult<DashboardStats> {
        let since = Utc::now() - Duration::hours(24);
        let row: (i64, i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users),
                (SELECT COUNT(*) FROM users WHERE is_active = true),
                (SELECT COUNT(*) FROM users WHERE is_locked = true),
                (SELECT COUNT(*) FROM access_groups),
                (SELECT COUNT(*) FROM permissions),
                (SELECT COUNT(*) FROM notifications WHERE read_at IS NULL),
                (SELECT COUNT(*) FROM activity_log WHERE created_at >= $1)
            "#,
        )
        .bind(since)
        .fetch_one(&self.db)
        .await?;

        Ok(DashboardStats {
            total_users: row.0,
            active_users: row.1,
            locked_users: row.2,
            total_groups: row.3,
            total_permissions: row.4,
            unread_notifications: row.5,
            activity_last_24h: row.6,
            generated_at: Utc::now(),
        })
    }
}
