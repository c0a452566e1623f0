//! Consent grants
//!
//! A grant records which scopes a user approved for one client. At most one
//! active grant exists per (user, client) pair: first consent creates it,
//! re-consent replaces its scope set in place, revocation frees the pair for
//! a future fresh consent.

use crate::errors::AuthError;
use crate::models::{Grant, Lifecycle, ServiceClient};
use crate::scopes;
use crate::store::{AuthStore, GrantRecord, Store, StoreError};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

const MAX_UPDATE_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct GrantService {
    store: Arc<Store>,
}

impl GrantService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Records consent for (user, client). Creates the grant if none is
    /// active, otherwise replaces the existing scope set, widening or
    /// narrowing it to exactly what was approved now.
    pub async fn upsert_grant(
        &self,
        user_id: &str,
        client: &ServiceClient,
        requested: &[String],
    ) -> Result<Grant, AuthError> {
        if !client.lifecycle.is_active() {
            return Err(AuthError::NotFound("client"));
        }
        let approved = scopes::normalize(requested);
        if approved.is_empty() {
            return Err(AuthError::Scope { scopes: vec![] });
        }
        let offending = scopes::missing_from(&approved, &client.scopes);
        if !offending.is_empty() {
            return Err(AuthError::Scope { scopes: offending });
        }

        for _ in 0..MAX_UPDATE_ATTEMPTS {
            if let Some(existing) = self
                .store
                .find_active_grant(user_id, &client.client_id)
                .await?
            {
                let mut updated: Grant = existing.clone().into();
                updated.scopes = approved.clone();
                updated.version = existing.version + 1;
                if self
                    .store
                    .update_grant(&GrantRecord::from(&updated), existing.version)
                    .await?
                {
                    log::info!(
                        "replaced consent of user {} for client {}: [{}]",
                        user_id,
                        client.client_id,
                        approved.join(", ")
                    );
                    return Ok(updated);
                }
                continue;
            }

            let grant = Grant {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                client_id: client.client_id.clone(),
                scopes: approved.clone(),
                created_at: Utc::now(),
                last_used_at: None,
                lifecycle: Lifecycle::Active,
                version: 1,
            };
            match self
                .store
                .insert_grant_if_absent(&GrantRecord::from(&grant))
                .await?
            {
                None => {
                    log::info!(
                        "recorded consent of user {} for client {}: [{}]",
                        user_id,
                        client.client_id,
                        approved.join(", ")
                    );
                    return Ok(grant);
                }
                // Lost the race to a concurrent consent, retry on the
                // update path
                Some(_) => continue,
            }
        }
        Err(AuthError::Store(StoreError::Conflict))
    }

    /// The active grant for a (user, client) pair, if any.
    pub async fn find_active(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> Result<Option<Grant>, AuthError> {
        Ok(self
            .store
            .find_active_grant(user_id, client_id)
            .await?
            .map(Grant::from))
    }

    pub async fn get_grant(&self, grant_id: &str) -> Result<Grant, AuthError> {
        match self.store.get_grant(grant_id).await? {
            Some(record) => Ok(record.into()),
            None => Err(AuthError::NotFound("grant")),
        }
    }

    /// Active grants of a user. Revoked grants stay in the store for audit
    /// but are not listed.
    pub async fn list_active_grants(&self, user_id: &str) -> Result<Vec<Grant>, AuthError> {
        let grants = self.store.list_grants(user_id).await?;
        Ok(grants
            .into_iter()
            .filter(|g| g.revoked_at.is_none())
            .map(Grant::from)
            .collect())
    }

    /// Revokes a grant. Only the user who gave the consent may take it back;
    /// an already revoked or unknown grant reads as NotFound.
    pub async fn revoke_grant(&self, grant_id: &str, requester_id: &str) -> Result<(), AuthError> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let grant = self.get_grant(grant_id).await?;
            if !grant.lifecycle.is_active() {
                return Err(AuthError::NotFound("grant"));
            }
            if grant.user_id != requester_id {
                return Err(AuthError::NoPermission(
                    "only the granting user may revoke a grant".to_string(),
                ));
            }

            let mut updated = grant.clone();
            updated.lifecycle = Lifecycle::Revoked(Utc::now());
            updated.version = grant.version + 1;
            if self
                .store
                .update_grant(&GrantRecord::from(&updated), grant.version)
                .await?
            {
                log::info!(
                    "revoked grant {} of user {} for client {}",
                    grant_id,
                    grant.user_id,
                    grant.client_id
                );
                return Ok(());
            }
        }
        Err(AuthError::Store(StoreError::Conflict))
    }

    /// Opportunistic last-used stamp. Never fails the caller: losing a
    /// compare-and-swap race or hitting a store error just skips the update.
    pub async fn touch_last_used(&self, grant_id: &str) {
        let record = match self.store.get_grant(grant_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(err) => {
                log::debug!("skipping last-used update for grant {}: {}", grant_id, err);
                return;
            }
        };
        if record.revoked_at.is_some() {
            return;
        }
        let mut updated = record.clone();
        updated.last_used_at = Some(Utc::now());
        updated.version = record.version + 1;
        if let Err(err) = self.store.update_grant(&updated, record.version).await {
            log::debug!("failed last-used update for grant {}: {}", grant_id, err);
        }
    }
}
