//! Role inheritance resolution

use std::collections::HashSet;
use tracing::warn;

use crate::directory::RoleDirectory;
use crate::error::RbacResult;

/// A role with its inherited permissions flattened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRole {
    /// The role itself first, then each ancestor
    pub chain: Vec<String>,
    /// Own permissions first, then each ancestor's, without duplicates
    pub permissions: Vec<String>,
}

/// Walk `role_id` and its ancestors.
///
/// A missing role ends the chain, and so does a role already visited or a
/// chain longer than `max_depth`. Stored data can only get into those states
/// through manual edits, so they are logged rather than returned as errors.
pub async fn resolve(directory: &dyn RoleDirectory, role_id: &str, max_depth: usize) -> RbacResult<ResolvedRole> {
    let mut visited = HashSet::new();
    let mut resolved = ResolvedRole {
        chain: Vec::new(),
        permissions: Vec::new(),
    };
    let mut seen_permissions = HashSet::new();
    let mut next = Some(role_id.to_string());

    while let Some(current) = next.take() {
        if resolved.chain.len() >= max_depth {
            warn!(role = %role_id, depth = max_depth, "Role inheritance chain truncated at depth limit");
            break;
        }
        if !visited.insert(current.clone()) {
            warn!(role = %role_id, repeated = %current, "Role inheritance cycle detected");
            break;
        }
        let Some(role) = directory.role(&current).await? else {
            warn!(role = %role_id, missing = %current, "Role in inheritance chain not found");
            break;
        };

        for permission in role.permissions {
            if seen_permissions.insert(permission.clone()) {
                resolved.permissions.push(permission);
            }
        }
        resolved.chain.push(role.id);
        next = role.inherits_from;
    }

    Ok(resolved)
}

/// Whether making `parent` the parent of `role_id` would close a loop
pub async fn creates_cycle(
    directory: &dyn RoleDirectory,
    role_id: &str,
    parent: &str,
    max_depth: usize,
) -> RbacResult<bool> {
    if role_id == parent {
        return Ok(true);
    }
    let ancestors = resolve(directory, parent, max_depth).await?;
    Ok(ancestors.chain.iter().any(|id| id == role_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{InMemoryRoleDirectory, MockRoleDirectory};
    use chrono::Utc;
    use database_layer::Role;

    fn role(id: &str, parent: Option<&str>, permissions: &[&str]) -> Role {
        Role {
            id: id.into(),
            display_name: id.into(),
            permissions: permissions.iter().map(|p| (*p).to_string()).collect(),
            inherits_from: parent.map(str::to_string),
            is_system: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_parent_chain_flattened_in_order() {
        let directory = InMemoryRoleDirectory::seeded();
        let parent = resolve(&directory, "parent", 10).await.unwrap();

        assert_eq!(parent.chain, vec!["parent", "member", "child", "guest"]);
        assert_eq!(parent.permissions.first().map(String::as_str), Some("family.*"));
        assert!(parent.permissions.iter().any(|p| p == "music.play"));
    }

    #[tokio::test]
    async fn test_cycle_in_stored_data_terminates() {
        let directory = InMemoryRoleDirectory::new();
        directory.insert_role(role("a", Some("b"), &["x.read"]));
        directory.insert_role(role("b", Some("a"), &["y.read"]));

        let resolved = resolve(&directory, "a", 10).await.unwrap();
        assert_eq!(resolved.chain, vec!["a", "b"]);
        assert_eq!(resolved.permissions, vec!["x.read", "y.read"]);
    }

    #[tokio::test]
    async fn test_depth_limit_truncates() {
        let directory = InMemoryRoleDirectory::new();
        directory.insert_role(role("r0", None, &["r0.read"]));
        for i in 1..6 {
            let parent = format!("r{}", i - 1);
            directory.insert_role(role(&format!("r{i}"), Some(&parent), &[]));
        }

        let resolved = resolve(&directory, "r5", 3).await.unwrap();
        assert_eq!(resolved.chain.len(), 3);
        assert!(resolved.permissions.is_empty());
    }

    #[tokio::test]
    async fn test_missing_role_is_looked_up_once() {
        let mut directory = MockRoleDirectory::new();
        directory
            .expect_role()
            .withf(|id| id == "ghost")
            .times(1)
            .returning(|_| Ok(None));

        let resolved = resolve(&directory, "ghost", 10).await.unwrap();
        assert!(resolved.chain.is_empty());
    }

    #[tokio::test]
    async fn test_creates_cycle() {
        let directory = InMemoryRoleDirectory::seeded();
        assert!(creates_cycle(&directory, "guest", "parent", 10).await.unwrap());
        assert!(creates_cycle(&directory, "tutor", "tutor", 10).await.unwrap());
        assert!(!creates_cycle(&directory, "tutor", "child", 10).await.unwrap());
    }
}
