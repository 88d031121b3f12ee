use std::collections::BTreeSet;

use thiserror::Error;
use uuid::Uuid;

use crate::{
    config::Config,
    models::{builtin_permissions, member_permissions, CreatePermission, Group, NewGroup, NewUser},
    store::{Store, StoreError},
    utils::{hash_password, AuthError},
};

/// System group holding every built-in permission.
pub const ADMIN_GROUP: &str = "admin";
/// System group every self-registered account joins.
pub const MEMBER_GROUP: &str = "member";

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions_created: usize,
    pub groups_created: usize,
    pub admin_created: bool,
}

/// Makes sure the permission catalog, the system groups and (when
/// configured) the bootstrap admin exist. Safe to run on every start.
pub async fn seed(store: &dyn Store, config: &Config) -> Result<SeedReport, SeedError> {
    let mut report = SeedReport::default();

    let mut builtin_ids = Vec::new();
    let mut member_ids = Vec::new();
    for builtin in builtin_permissions() {
        let permission = match store.find_permission_by_codename(builtin.codename).await? {
            Some(existing) => existing,
            None => {
                report.permissions_created += 1;
                store
                    .create_permission(CreatePermission {
                        codename: builtin.codename.to_string(),
                        name: builtin.name.to_string(),
                        description: Some(builtin.description.to_string()),
                        category: Some(builtin.category.to_string()),
                    })
                    .await?
            }
        };
        if member_permissions().contains(&builtin.codename) {
            member_ids.push(permission.id);
        }
        builtin_ids.push(permission.id);
    }

    let (admin, _) = ensure_group(store, ADMIN_GROUP, "Administrators", "Full access", &mut report).await?;
    // Custom grants on the admin group survive; missing built-ins are added.
    let mut admin_permissions: BTreeSet<Uuid> = store
        .group_permissions(admin.id)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();
    admin_permissions.extend(builtin_ids);
    let admin_permissions: Vec<Uuid> = admin_permissions.into_iter().collect();
    store.set_group_permissions(admin.id, &admin_permissions).await?;

    let (member, created) =
        ensure_group(store, MEMBER_GROUP, "Members", "Default group for new accounts", &mut report).await?;
    if created {
        store.set_group_permissions(member.id, &member_ids).await?;
    }

    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        let email = email.trim().to_lowercase();
        if store.find_user_by_email(&email).await?.is_none() {
            let user = store
                .create_user(NewUser {
                    email,
                    password_hash: hash_password(password, config.bcrypt_cost)?,
                    first_name: "Admin".into(),
                    last_name: "User".into(),
                    is_active: true,
                })
                .await?;
            store.add_group_member(admin.id, user.id).await?;
            store.add_group_member(member.id, user.id).await?;
            log::info!(target: "adminhub::seed", "created bootstrap admin {}", user.email);
            report.admin_created = true;
        }
    }

    log::info!(
        target: "adminhub::seed",
        "seeded {} permissions, {} groups",
        report.permissions_created,
        report.groups_created
    );
    Ok(report)
}

async fn ensure_group(
    store: &dyn Store,
    codename: &str,
    name: &str,
    description: &str,
    report: &mut SeedReport,
) -> Result<(Group, bool), StoreError> {
    if let Some(group) = store.find_group_by_codename(codename).await? {
        return Ok((group, false));
    }
    let group = store
        .create_group(NewGroup {
            name: name.to_string(),
            codename: codename.to_string(),
            description: Some(description.to_string()),
            is_active: true,
            is_system: true,
        })
        .await?;
    report.groups_created += 1;
    Ok((group, true))
}
