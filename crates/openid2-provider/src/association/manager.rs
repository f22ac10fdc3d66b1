//! Association lifecycle
//!
//! Creation, lookup and single-use verification of associations on top of
//! an injected [`AssociationStore`].

use super::store::AssociationStore;
use super::{random_bytes, random_token, Association};
use crate::config::ProviderConfig;
use crate::encoding::{Params, NAMESPACE};
use crate::error::{ProviderError, ProviderResult, StoreError};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Creates, retrieves and verifies associations.
#[derive(Clone)]
pub struct AssociationManager {
    store: Arc<dyn AssociationStore>,
    config: ProviderConfig,
}

impl std::fmt::Debug for AssociationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssociationManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AssociationManager {
    /// Create a manager over `store`.
    pub fn new(store: Arc<dyn AssociationStore>, config: ProviderConfig) -> Self {
        Self { store, config }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn AssociationStore> {
        &self.store
    }

    /// Return the unexpired association named by `requested_handle`, or a
    /// new one.
    ///
    /// An expired association found under `requested_handle` is deleted
    /// before the replacement is created.
    #[instrument(skip(self))]
    pub async fn get_or_create(
        &self,
        endpoint: &str,
        requested_handle: &str,
    ) -> ProviderResult<Association> {
        if !requested_handle.is_empty() {
            if let Some(existing) = self.store.get(endpoint, requested_handle).await? {
                if !existing.is_expired() {
                    return Ok(existing);
                }
                debug!(handle = %requested_handle, "association expired");
                self.store.delete(endpoint, requested_handle).await?;
            }
        }
        self.create(endpoint).await
    }

    /// Generate and store a new association for `endpoint`.
    ///
    /// Handle generation is retried on collision up to the configured
    /// number of attempts.
    #[instrument(skip(self))]
    pub async fn create(&self, endpoint: &str) -> ProviderResult<Association> {
        let expires = Utc::now()
            .checked_add_signed(self.config.association_ttl)
            .ok_or_else(|| {
                ProviderError::Internal("association expiry out of range".to_string())
            })?;
        let mut association = Association {
            endpoint: endpoint.to_string(),
            handle: String::new(),
            secret: random_bytes(self.config.secret_len),
            assoc_type: self.config.association_type,
            expires,
        };

        for attempt in 1..=self.config.handle_attempts {
            association.handle = random_token();
            match self.store.add(association.clone()).await {
                Ok(()) => {
                    debug!(handle = %association.handle, "association created");
                    return Ok(association);
                }
                Err(StoreError::DuplicateHandle) => {
                    warn!(attempt, "association handle collision");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ProviderError::HandleExhausted(self.config.handle_attempts))
    }

    /// Handle `mode=associate`.
    ///
    /// Only unencrypted provider-created associations are produced by this
    /// engine, so every association session type is refused.
    pub fn associate(&self, params: &Params) -> ProviderResult<Params> {
        let session_type = params.get("session_type").cloned().unwrap_or_default();
        Err(ProviderError::UnsupportedSessionType(session_type))
    }

    /// Handle `mode=check_authentication`.
    ///
    /// Recomputes the signature over the caller's `signed` list with the
    /// association named by `assoc_handle`. A matching association is
    /// deleted, so repeating the same call yields `is_valid:false`.
    #[instrument(skip(self, params), fields(handle = params.get("assoc_handle").map(String::as_str).unwrap_or("")))]
    pub async fn check_authentication(&self, params: &Params) -> ProviderResult<Params> {
        let handle = params.get("assoc_handle").map(String::as_str).unwrap_or("");

        let association = match self.store.get("", handle).await? {
            Some(association) if association.is_expired() => {
                debug!("association expired");
                self.store.delete("", handle).await?;
                return Ok(validity(false));
            }
            Some(association) => association,
            None => {
                debug!("association not found");
                return Ok(validity(false));
            }
        };

        let signed: Vec<&str> = params
            .get("signed")
            .map(String::as_str)
            .unwrap_or("")
            .split(',')
            .collect();
        let sig = params.get("sig").map(String::as_str).unwrap_or("");

        if !association.verify(sig, &signed, params)? {
            debug!("signature mismatch");
            return Ok(validity(false));
        }

        // Only the caller whose delete removed the association may succeed.
        let removed = self.store.delete("", &association.handle).await?;
        if !removed {
            debug!("association already consumed");
        }
        Ok(validity(removed))
    }
}

fn validity(is_valid: bool) -> Params {
    let mut params = Params::new();
    params.insert("ns".to_string(), NAMESPACE.to_string());
    params.insert("is_valid".to_string(), is_valid.to_string());
    params
}
