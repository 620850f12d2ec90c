//! Replicated read index of current realms, last-writer-wins by revision.
//!
//! # Purpose
//! Serves the read side of the realm subsystem: local, non-blocking lookups
//! by label or issuer, plus the listing the API sorts by creation time. The
//! write path goes through the `KeyValueStore` seam so a cluster replicator
//! can be plugged in behind the same semantics; consistency is eventual and
//! replayed writes are no-ops.

use crate::error::IamError;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use keygate_auth::{IssuerRealms, RealmKeys};
use keygate_realm::retry::{self, RetryStrategy};
use keygate_realm::{IssuerDirectory, Label, RealmProjection, RealmResource};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyValueStoreError {
    #[error("distributed data operation timed out")]
    Timeout,
    #[error("unexpected replicator failure: {0}")]
    Internal(String),
}

/// Semantic interface of the replicated map backing the index.
///
/// An upsert whose revision is equal to or lower than the stored one must be
/// a no-op; that property is what makes the at-least-once projector safe.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn put(&self, value: RealmResource) -> Result<(), KeyValueStoreError>;
    fn get(&self, key: &Label) -> Option<RealmResource>;
    fn values(&self) -> Vec<RealmResource>;
}

/// In-process store: a `DashMap` so reads never block writers.
#[derive(Debug, Default)]
pub struct LocalKeyValueStore {
    entries: DashMap<Label, RealmResource>,
}

impl LocalKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for LocalKeyValueStore {
    async fn put(&self, value: RealmResource) -> Result<(), KeyValueStoreError> {
        match self.entries.entry(value.id.clone()) {
            Entry::Occupied(mut current) => {
                if value.rev > current.get().rev {
                    current.insert(value);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
        }
        Ok(())
    }

    fn get(&self, key: &Label) -> Option<RealmResource> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn values(&self) -> Vec<RealmResource> {
        self.entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

/// Settings for index writes (`key_value_store.*` in the configuration).
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub ask_timeout: Duration,
    pub consistency_timeout: Duration,
    pub retry: RetryStrategy,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            ask_timeout: Duration::from_secs(5),
            consistency_timeout: Duration::from_secs(3),
            retry: RetryStrategy::exponential(
                Duration::from_millis(100),
                Duration::from_secs(2),
                3,
            ),
        }
    }
}

/// The realm read index.
pub struct RealmIndex {
    store: Arc<dyn KeyValueStore>,
    config: IndexConfig,
}

impl RealmIndex {
    pub fn new(store: Arc<dyn KeyValueStore>, config: IndexConfig) -> Self {
        Self { store, config }
    }

    /// Upsert a resource; timeouts are retried per the configured strategy
    /// before surfacing as `OperationTimedOut`.
    pub async fn put(&self, resource: RealmResource) -> Result<(), IamError> {
        let outcome = retry::retry(
            &self.config.retry,
            |err| matches!(err, KeyValueStoreError::Timeout),
            || {
                let resource = resource.clone();
                async move {
                    match tokio::time::timeout(
                        self.config.consistency_timeout,
                        self.store.put(resource),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(KeyValueStoreError::Timeout),
                    }
                }
            },
        )
        .await;

        match outcome {
            Ok(()) => {
                metrics::gauge!("keygate_realms_indexed").set(self.store.values().len() as f64);
                Ok(())
            }
            Err(KeyValueStoreError::Timeout) => Err(IamError::OperationTimedOut(
                "realm index update".to_string(),
            )),
            Err(KeyValueStoreError::Internal(reason)) => Err(IamError::InternalError(reason)),
        }
    }

    pub fn get(&self, id: &Label) -> Option<RealmResource> {
        self.store.get(id)
    }

    /// Index values sorted by creation time, ties broken by label.
    pub fn list(&self) -> Vec<RealmResource> {
        let mut values = self.store.values();
        values.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        values
    }

    /// The active realm claiming `issuer`, if any. Deprecated realms are
    /// invisible here.
    pub fn active_by_issuer(&self, issuer: &str) -> Option<RealmResource> {
        self.store
            .values()
            .into_iter()
            .find(|resource| !resource.deprecated && resource.issuer() == Some(issuer))
    }
}

impl IssuerDirectory for RealmIndex {
    fn claimed_by(&self, issuer: &str, requester: &Label) -> Option<Label> {
        self.active_by_issuer(issuer)
            .filter(|resource| resource.id != *requester)
            .map(|resource| resource.id)
    }
}

impl IssuerRealms for RealmIndex {
    fn active_realm(&self, issuer: &str) -> Option<RealmKeys> {
        self.active_by_issuer(issuer).and_then(|resource| {
            let id = resource.id;
            match resource.value {
                RealmProjection::Active(projection) => Some(RealmKeys {
                    realm: id,
                    issuer: projection.issuer,
                    keys: projection.keys,
                }),
                RealmProjection::Deprecated(_) => None,
            }
        })
    }
}
