//! Where roles and role assignments come from
//!
//! The engine only sees the [`RoleDirectory`] trait. Production uses the
//! SQLite-backed [`StoreRoleDirectory`]; tests and embedded setups can use
//! [`InMemoryRoleDirectory`], which is seeded with the same default roles.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use database_layer::repository::{roles, users};
use database_layer::{CredentialStore, DatabaseError, Role, DEFAULT_ROLES};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{RbacError, RbacResult};
use crate::models::{NewRole, PrincipalGrant};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn principal(&self, id: Uuid) -> RbacResult<Option<PrincipalGrant>>;

    async fn role(&self, id: &str) -> RbacResult<Option<Role>>;

    /// Persist a role that has already been validated
    async fn create_role(&self, role: &NewRole) -> RbacResult<()>;

    /// Returns false when the principal does not exist
    async fn assign_role(&self, principal: Uuid, role_id: &str) -> RbacResult<bool>;

    /// Returns false when the role already held the permission
    async fn grant(&self, role_id: &str, permission: &str) -> RbacResult<bool>;

    /// Returns false when the role did not hold the permission
    async fn revoke(&self, role_id: &str, permission: &str) -> RbacResult<bool>;
}

/// Roles and principals read from the credential store
#[derive(Clone)]
pub struct StoreRoleDirectory {
    store: CredentialStore,
}

impl StoreRoleDirectory {
    pub fn new(store: CredentialStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RoleDirectory for StoreRoleDirectory {
    async fn principal(&self, id: Uuid) -> RbacResult<Option<PrincipalGrant>> {
        let principal = users::find_by_id(self.store.pool(), id).await?;
        Ok(principal.as_ref().map(PrincipalGrant::from))
    }

    async fn role(&self, id: &str) -> RbacResult<Option<Role>> {
        let mut conn = self.store.pool().acquire().await.map_err(DatabaseError::from)?;
        Ok(roles::find(&mut conn, id).await?)
    }

    async fn create_role(&self, role: &NewRole) -> RbacResult<()> {
        let mut tx = self.store.begin().await?;
        let inserted = roles::insert(
            &mut tx,
            &role.id,
            &role.display_name,
            role.inherits_from.as_deref(),
            &role.permissions,
        )
        .await;
        match inserted {
            Err(e) if e.is_unique_violation() => return Err(RbacError::RoleExists(role.id.clone())),
            other => other?,
        }
        tx.commit().await.map_err(DatabaseError::from)?;
        Ok(())
    }

    async fn assign_role(&self, principal: Uuid, role_id: &str) -> RbacResult<bool> {
        Ok(users::update_role(self.store.pool(), principal, role_id).await?)
    }

    async fn grant(&self, role_id: &str, permission: &str) -> RbacResult<bool> {
        let mut tx = self.store.begin().await?;
        let added = roles::add_permission(&mut tx, role_id, permission).await?;
        tx.commit().await.map_err(DatabaseError::from)?;
        Ok(added)
    }

    async fn revoke(&self, role_id: &str, permission: &str) -> RbacResult<bool> {
        let mut tx = self.store.begin().await?;
        let removed = roles::remove_permission(&mut tx, role_id, permission).await?;
        tx.commit().await.map_err(DatabaseError::from)?;
        Ok(removed)
    }
}

/// Directory held entirely in memory
#[derive(Clone, Default)]
pub struct InMemoryRoleDirectory {
    roles: Arc<DashMap<String, Role>>,
    principals: Arc<DashMap<Uuid, PrincipalGrant>>,
}

impl InMemoryRoleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A directory holding the default system roles
    pub fn seeded() -> Self {
        let directory = Self::new();
        let now = Utc::now();
        for seed in DEFAULT_ROLES {
            directory.roles.insert(
                seed.id.to_string(),
                Role {
                    id: seed.id.to_string(),
                    display_name: seed.display_name.to_string(),
                    permissions: seed.permissions.iter().map(|p| (*p).to_string()).collect(),
                    inherits_from: seed.inherits_from.map(str::to_string),
                    is_system: true,
                    created_at: now,
                },
            );
        }
        directory
    }

    pub fn insert_role(&self, role: Role) {
        self.roles.insert(role.id.clone(), role);
    }

    pub fn upsert_principal(&self, principal: PrincipalGrant) {
        self.principals.insert(principal.id, principal);
    }

    /// Add an active principal holding `role_id` and return its id
    pub fn add_principal(&self, role_id: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.upsert_principal(PrincipalGrant::new(id, role_id));
        id
    }
}

#[async_trait]
impl RoleDirectory for InMemoryRoleDirectory {
    async fn principal(&self, id: Uuid) -> RbacResult<Option<PrincipalGrant>> {
        Ok(self.principals.get(&id).map(|entry| entry.value().clone()))
    }

    async fn role(&self, id: &str) -> RbacResult<Option<Role>> {
        Ok(self.roles.get(id).map(|entry| entry.value().clone()))
    }

    async fn create_role(&self, role: &NewRole) -> RbacResult<()> {
        if self.roles.contains_key(&role.id) {
            return Err(RbacError::RoleExists(role.id.clone()));
        }
        let mut permissions: Vec<String> = Vec::with_capacity(role.permissions.len());
        for permission in &role.permissions {
            if !permissions.contains(permission) {
                permissions.push(permission.clone());
            }
        }
        self.roles.insert(
            role.id.clone(),
            Role {
                id: role.id.clone(),
                display_name: role.display_name.clone(),
                permissions,
                inherits_from: role.inherits_from.clone(),
                is_system: false,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn assign_role(&self, principal: Uuid, role_id: &str) -> RbacResult<bool> {
        Ok(match self.principals.get_mut(&principal) {
            Some(mut entry) => {
                entry.role_id = role_id.to_string();
                true
            }
            None => false,
        })
    }

    async fn grant(&self, role_id: &str, permission: &str) -> RbacResult<bool> {
        let mut role = self
            .roles
            .get_mut(role_id)
            .ok_or_else(|| RbacError::RoleNotFound(role_id.to_string()))?;
        if role.permissions.iter().any(|p| p == permission) {
            return Ok(false);
        }
        role.permissions.push(permission.to_string());
        Ok(true)
    }

    async fn revoke(&self, role_id: &str, permission: &str) -> RbacResult<bool> {
        let mut role = self
            .roles
            .get_mut(role_id)
            .ok_or_else(|| RbacError::RoleNotFound(role_id.to_string()))?;
        let before = role.permissions.len();
        role.permissions.retain(|p| p != permission);
        Ok(role.permissions.len() != before)
    }
}
