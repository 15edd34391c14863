//! Durable sessions with an in-process index
//!
//! The store is the source of truth. Every mutation is written there first
//! and the index is updated after the write succeeds, so the index can lag
//! only by a missing entry, which the next lookup fills from the store.

use chrono::{DateTime, Utc};
use database_layer::repository::sessions;
use database_layer::{AuthSession, CredentialStore, SessionMetadata, SessionType};
use error_common::CoreError;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

pub type GatewayError = CoreError;
pub type GatewayResult<T> = Result<T, GatewayError>;

pub struct SessionManager {
    store: CredentialStore,
    index: RwLock<HashMap<String, AuthSession>>,
}

impl SessionManager {
    pub fn new(store: CredentialStore) -> Self {
        Self {
            store,
            index: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, session: AuthSession) -> GatewayResult<()> {
        sessions::insert(self.store.pool(), &session)
            .await
            .map_err(CoreError::unavailable)?;
        self.index.write().insert(session.id.clone(), session);
        Ok(())
    }

    /// A valid session, or `None`. An expired or inactive one is reaped on sight.
    pub async fn get(&self, token: &str, now: DateTime<Utc>) -> GatewayResult<Option<AuthSession>> {
        let indexed = self.index.read().get(token).cloned();
        let session = match indexed {
            Some(session) => Some(session),
            None => sessions::find(self.store.pool(), token)
                .await
                .map_err(CoreError::unavailable)?,
        };

        let Some(session) = session else {
            return Ok(None);
        };
        if !session.is_valid_at(now) {
            debug!(principal_id = %session.principal_id, "Reaping expired session on lookup");
            self.remove(token).await?;
            return Ok(None);
        }

        self.index
            .write()
            .entry(session.id.clone())
            .or_insert_with(|| session.clone());
        Ok(Some(session))
    }

    /// Push expiry forward; it never moves back. `None` if the session is gone.
    pub async fn extend(
        &self,
        token: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> GatewayResult<Option<DateTime<Utc>>> {
        let extended = sessions::extend(self.store.pool(), token, expires_at, now)
            .await
            .map_err(CoreError::unavailable)?;
        if let Some(new_expiry) = extended {
            if let Some(session) = self.index.write().get_mut(token) {
                session.expires_at = new_expiry;
                session.last_activity_at = now;
            }
        }
        Ok(extended)
    }

    /// Change the session tier in place, keeping the token
    pub async fn escalate(
        &self,
        token: &str,
        session_type: SessionType,
        expires_at: DateTime<Utc>,
        metadata: SessionMetadata,
        now: DateTime<Utc>,
    ) -> GatewayResult<Option<DateTime<Utc>>> {
        let escalated = sessions::escalate(self.store.pool(), token, session_type, expires_at, &metadata, now)
            .await
            .map_err(CoreError::unavailable)?;
        match escalated {
            Some(new_expiry) => {
                if let Some(session) = self.index.write().get_mut(token) {
                    session.session_type = session_type;
                    session.expires_at = new_expiry;
                    session.last_activity_at = now;
                    session.metadata = metadata;
                }
            }
            None => {
                self.index.write().remove(token);
            }
        }
        Ok(escalated)
    }

    pub async fn deactivate(&self, token: &str) -> GatewayResult<bool> {
        let deactivated = sessions::deactivate(self.store.pool(), token)
            .await
            .map_err(CoreError::unavailable)?;
        self.index.write().remove(token);
        Ok(deactivated)
    }

    pub async fn deactivate_for_principal(&self, principal: Uuid) -> GatewayResult<usize> {
        let ids = sessions::deactivate_for_principal(self.store.pool(), principal)
            .await
            .map_err(CoreError::unavailable)?;
        let mut index = self.index.write();
        for id in &ids {
            index.remove(id);
        }
        index.retain(|_, session| session.principal_id != principal);
        Ok(ids.len())
    }

    pub async fn count_valid(&self, principal: Uuid, session_type: SessionType, now: DateTime<Utc>) -> GatewayResult<u32> {
        let count = sessions::count_valid(self.store.pool(), principal, session_type, now)
            .await
            .map_err(CoreError::unavailable)?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    pub async fn list_for_principal(&self, principal: Uuid) -> GatewayResult<Vec<AuthSession>> {
        sessions::list_for_principal(self.store.pool(), principal)
            .await
            .map_err(CoreError::unavailable)
    }

    /// Delete expired and inactive sessions from the store and the index
    pub async fn reap_expired(&self, now: DateTime<Utc>) -> GatewayResult<usize> {
        let reaped = sessions::delete_expired(self.store.pool(), now)
            .await
            .map_err(CoreError::unavailable)?;
        let mut index = self.index.write();
        for id in &reaped {
            index.remove(id);
        }
        index.retain(|_, session| session.is_valid_at(now));
        drop(index);

        if !reaped.is_empty() {
            info!(count = reaped.len(), "Reaped expired sessions");
        }
        Ok(reaped.len())
    }

    pub fn indexed(&self) -> usize {
        self.index.read().len()
    }

    async fn remove(&self, token: &str) -> GatewayResult<()> {
        sessions::delete(self.store.pool(), token)
            .await
            .map_err(CoreError::unavailable)?;
        self.index.write().remove(token);
        Ok(())
    }
}
