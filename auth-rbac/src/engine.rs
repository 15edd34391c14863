use audit_engine::{actions, AuditEvent, AuditLogger};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::{EffectivePermissions, PermissionCache};
use crate::config::RbacConfig;
use crate::context::ContextRules;
use crate::directory::RoleDirectory;
use crate::error::{RbacError, RbacResult};
use crate::models::{AccessContext, AccessDecision, DecisionReason, NewRole};
use crate::permission::{Permission, PermissionMatch, PermissionMatcher};
use crate::resolver;

/// Role-based permission engine
///
/// Resolves a principal's role chain into a compiled permission set, caches
/// it per principal, and layers ownership grants and contextual denials on
/// top of plain role matching.
pub struct RbacEngine {
    directory: Arc<dyn RoleDirectory>,
    cache: PermissionCache,
    rules: ContextRules,
    config: RbacConfig,
    audit: Option<AuditLogger>,
}

impl RbacEngine {
    pub fn new(directory: Arc<dyn RoleDirectory>, config: RbacConfig) -> Self {
        Self {
            directory,
            cache: PermissionCache::new(config.cache_ttl),
            rules: ContextRules::compile(&config.context),
            config,
            audit: None,
        }
    }

    /// Record role administration in the audit log
    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(&self) -> &RbacConfig {
        &self.config
    }

    pub async fn check(
        &self,
        principal: Uuid,
        permission: &str,
        context: &AccessContext,
    ) -> RbacResult<AccessDecision> {
        let requested = match Permission::parse(permission) {
            Ok(Permission::Exact(exact)) => exact,
            // Patterns are grants, not requests
            Ok(_) | Err(_) => return Ok(AccessDecision::deny(DecisionReason::InvalidPermission)),
        };

        let Some(effective) = self.load(principal).await? else {
            return Ok(AccessDecision::deny(DecisionReason::PrincipalInactive));
        };
        let now = context.at.unwrap_or_else(Utc::now);
        if !effective.principal.is_active {
            return Ok(AccessDecision::deny(DecisionReason::PrincipalInactive));
        }
        if effective.principal.is_locked_at(now) {
            return Ok(AccessDecision::deny(DecisionReason::PrincipalLocked));
        }

        let tentative = match effective.matcher.matches(&requested) {
            Some(PermissionMatch::Direct(p)) => AccessDecision::grant(DecisionReason::DirectMatch, p),
            Some(PermissionMatch::Wildcard(p)) => AccessDecision::grant(DecisionReason::WildcardMatch, p),
            None if owns_resource(principal, &requested, context) => {
                AccessDecision::grant(DecisionReason::ResourceOwner, requested.clone())
            }
            None => return Ok(AccessDecision::deny(DecisionReason::NoMatch)),
        };

        let role_id = effective.principal.role_id.as_str();
        if let Some(reason) = self.rules.denial(role_id, &requested, context, now) {
            debug!(principal_id = %principal, permission = %requested, reason = %reason, "Grant overridden by context");
            return Ok(AccessDecision::deny(reason));
        }
        Ok(tentative)
    }

    /// The principal's resolved permissions, own role first
    pub async fn effective_permissions(&self, principal: Uuid) -> RbacResult<Vec<String>> {
        self.load(principal)
            .await?
            .map(|effective| effective.permissions.clone())
            .ok_or(RbacError::PrincipalNotFound)
    }

    /// The principal's role id and resolved permissions, for session snapshots
    pub async fn snapshot(&self, principal: Uuid) -> RbacResult<(String, Vec<String>)> {
        let effective = self.load(principal).await?.ok_or(RbacError::PrincipalNotFound)?;
        Ok((effective.principal.role_id.clone(), effective.permissions.clone()))
    }

    /// Whether `actor` holds every permission `target` holds.
    ///
    /// Administrative writes to another principal go through this so nobody
    /// can take over an account that is more privileged than their own. An
    /// unknown target is reported as covered and left to the operation itself.
    pub async fn covers_principal(&self, actor: Uuid, target: Uuid) -> RbacResult<bool> {
        let Some(actor_set) = self.load(actor).await? else {
            return Ok(false);
        };
        let Some(target_set) = self.load(target).await? else {
            return Ok(true);
        };
        Ok(actor_set.matcher.covers_all(&target_set.permissions))
    }

    /// Whether `actor` holds every permission `role_id` resolves to
    pub async fn covers_role(&self, actor: Uuid, role_id: &str) -> RbacResult<bool> {
        let Some(actor_set) = self.load(actor).await? else {
            return Ok(false);
        };
        if self.directory.role(role_id).await?.is_none() {
            return Err(RbacError::RoleNotFound(role_id.to_string()));
        }
        let resolved = resolver::resolve(self.directory.as_ref(), role_id, self.config.max_inheritance_depth).await?;
        Ok(actor_set.matcher.covers_all(&resolved.permissions))
    }

    /// Whether `actor` holds every one of `permissions`
    pub async fn covers_permissions(&self, actor: Uuid, permissions: &[String]) -> RbacResult<bool> {
        Ok(self
            .load(actor)
            .await?
            .is_some_and(|actor_set| actor_set.matcher.covers_all(permissions)))
    }

    async fn load(&self, principal: Uuid) -> RbacResult<Option<Arc<EffectivePermissions>>> {
        if let Some(cached) = self.cache.get(principal) {
            return Ok(Some(cached));
        }

        let generation = self.cache.generation();
        let Some(grant) = self.directory.principal(principal).await? else {
            return Ok(None);
        };
        let resolved =
            resolver::resolve(self.directory.as_ref(), &grant.role_id, self.config.max_inheritance_depth).await?;
        let effective = Arc::new(EffectivePermissions {
            principal: grant,
            matcher: PermissionMatcher::compile(&resolved.permissions),
            role_chain: resolved.chain,
            permissions: resolved.permissions,
        });

        if !self.cache.insert(principal, Arc::clone(&effective), generation) {
            debug!(principal_id = %principal, "Permission load raced an invalidation, not cached");
        }
        Ok(Some(effective))
    }

    pub async fn create_role(&self, new: NewRole, created_by: Uuid) -> RbacResult<()> {
        if !valid_role_id(&new.id) {
            return Err(RbacError::InvalidRole(new.id));
        }
        if new.display_name.trim().is_empty() {
            return Err(RbacError::InvalidRole(format!("{}: empty display name", new.id)));
        }
        for permission in &new.permissions {
            Permission::parse(permission)?;
        }
        if self.directory.role(&new.id).await?.is_some() {
            return Err(RbacError::RoleExists(new.id));
        }
        if let Some(parent) = &new.inherits_from {
            if *parent == new.id {
                return Err(RbacError::CircularInheritance(new.id));
            }
            if self.directory.role(parent).await?.is_none() {
                return Err(RbacError::RoleNotFound(parent.clone()));
            }
            if resolver::creates_cycle(self.directory.as_ref(), &new.id, parent, self.config.max_inheritance_depth)
                .await?
            {
                return Err(RbacError::CircularInheritance(new.id));
            }
        }

        self.directory.create_role(&new).await?;
        info!(role = %new.id, parent = ?new.inherits_from, created_by = %created_by, "Role created");
        self.audit(
            AuditEvent::success(actions::ROLE_CREATE)
                .principal(created_by)
                .resource(format!("role/{}", new.id))
                .detail("inherits_from", new.inherits_from.clone())
                .detail("permissions", new.permissions.clone()),
        )
        .await;
        Ok(())
    }

    pub async fn assign_role(&self, principal: Uuid, role_id: &str, assigned_by: Uuid) -> RbacResult<()> {
        if self.directory.role(role_id).await?.is_none() {
            return Err(RbacError::RoleNotFound(role_id.to_string()));
        }
        if !self.directory.assign_role(principal, role_id).await? {
            return Err(RbacError::PrincipalNotFound);
        }
        self.cache.invalidate(principal);

        info!(principal_id = %principal, role = %role_id, assigned_by = %assigned_by, "Role assigned");
        self.audit(
            AuditEvent::success(actions::ROLE_ASSIGN)
                .principal(assigned_by)
                .resource(format!("principal/{principal}"))
                .detail("role", role_id),
        )
        .await;
        Ok(())
    }

    /// Add a permission to a custom role. Returns false if it was already held.
    pub async fn grant_permission(&self, role_id: &str, permission: &str, granted_by: Uuid) -> RbacResult<bool> {
        Permission::parse(permission)?;
        self.mutable_role(role_id).await?;
        let added = self.directory.grant(role_id, permission).await?;
        // Descendant roles inherit the change, so every principal may be affected
        self.cache.invalidate_all();

        if added {
            info!(role = %role_id, permission = %permission, "Permission granted");
            self.audit(
                AuditEvent::success(actions::PERMISSION_GRANT)
                    .principal(granted_by)
                    .resource(format!("role/{role_id}"))
                    .detail("permission", permission),
            )
            .await;
        }
        Ok(added)
    }

    pub async fn revoke_permission(&self, role_id: &str, permission: &str, revoked_by: Uuid) -> RbacResult<bool> {
        self.mutable_role(role_id).await?;
        let removed = self.directory.revoke(role_id, permission).await?;
        self.cache.invalidate_all();

        if removed {
            info!(role = %role_id, permission = %permission, "Permission revoked");
            self.audit(
                AuditEvent::success(actions::PERMISSION_REVOKE)
                    .principal(revoked_by)
                    .resource(format!("role/{role_id}"))
                    .detail("permission", permission),
            )
            .await;
        }
        Ok(removed)
    }

    async fn mutable_role(&self, role_id: &str) -> RbacResult<()> {
        match self.directory.role(role_id).await? {
            None => Err(RbacError::RoleNotFound(role_id.to_string())),
            Some(role) if role.is_system => Err(RbacError::SystemRole(role_id.to_string())),
            Some(_) => Ok(()),
        }
    }

    /// Forget one principal's cached permissions
    pub fn invalidate(&self, principal: Uuid) {
        self.cache.invalidate(principal);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn sweep_expired(&self) -> usize {
        self.cache.sweep_expired()
    }

    pub fn cached_principals(&self) -> usize {
        self.cache.len()
    }

    async fn audit(&self, event: AuditEvent) {
        if let Some(audit) = &self.audit {
            audit.record(event).await;
        }
    }
}

fn owns_resource(principal: Uuid, permission: &str, context: &AccessContext) -> bool {
    context.resource_owner == Some(principal)
        && (permission.ends_with(".read") || permission.ends_with(".update"))
}

fn valid_role_id(id: &str) -> bool {
    (2..=32).contains(&id.len())
        && id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}
