//! Process-wide registry of shared venue adapters.
//!
//! Bots trading on the same venue share one adapter handle. Construction
//! is lazy and serialized: the first requester builds and initializes the
//! adapter, later requesters get the same `Arc`. An adapter is closed
//! when the last bot hands its reference back.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::adapter::{AdapterError, ExchangeAdapter};
use crate::extended::ExtendedAdapter;
use crate::paradex::ParadexAdapter;

/// Credentials for one venue, loaded from the environment by the binary.
#[derive(Debug, Clone, Default)]
pub struct VenueCredentials {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

impl VenueCredentials {
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Lazy venue-id -> adapter map shared by all bots in the process.
pub struct AdapterRegistry {
    adapters: DashMap<String, Arc<dyn ExchangeAdapter>>,
    // Serializes first-construction so two bots racing on the same venue
    // cannot both initialize it.
    build_lock: Mutex<()>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: DashMap::new(),
            build_lock: Mutex::new(()),
        }
    }

    /// Get the shared handle for `exchange_id`, building and initializing
    /// the adapter on first request.
    pub async fn get_or_init(
        &self,
        exchange_id: &str,
        credentials: &VenueCredentials,
    ) -> Result<Arc<dyn ExchangeAdapter>, AdapterError> {
        if let Some(existing) = self.adapters.get(exchange_id) {
            return Ok(existing.clone());
        }

        let _guard = self.build_lock.lock().await;
        // Re-check under the lock: another requester may have won the race.
        if let Some(existing) = self.adapters.get(exchange_id) {
            return Ok(existing.clone());
        }

        let adapter: Arc<dyn ExchangeAdapter> = match exchange_id {
            "paradex" => Arc::new(ParadexAdapter::new(credentials.clone())),
            "extended" => Arc::new(ExtendedAdapter::new(credentials.clone())),
            other => return Err(AdapterError::UnknownVenue(other.to_string())),
        };

        adapter.initialize().await?;
        info!(venue = exchange_id, "adapter initialized");
        self.adapters
            .insert(exchange_id.to_string(), adapter.clone());
        Ok(adapter)
    }

    /// Insert a pre-built adapter (tests, dry-run demos).
    pub fn insert(&self, adapter: Arc<dyn ExchangeAdapter>) {
        self.adapters.insert(adapter.id().to_string(), adapter);
    }

    /// Hand a bot's reference back. Once only the registry still holds
    /// the adapter it is removed and closed.
    ///
    /// Callers must drop their own `Arc` before releasing.
    pub async fn release(&self, exchange_id: &str) {
        let removed = self
            .adapters
            .remove_if(exchange_id, |_, adapter| Arc::strong_count(adapter) == 1);

        match removed {
            Some((_, adapter)) => {
                info!(venue = exchange_id, "last reference released, closing adapter");
                adapter.close().await;
            }
            None => {
                debug!(venue = exchange_id, "adapter still referenced, kept alive");
            }
        }
    }

    /// Latency summaries for every live adapter.
    pub fn latencies(&self) -> Vec<(String, arb_common::LatencySummary)> {
        self.adapters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().latency()))
            .collect()
    }

    /// Close everything. Used on process shutdown.
    pub async fn close_all(&self) {
        let ids: Vec<String> = self.adapters.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, adapter)) = self.adapters.remove(&id) {
                adapter.close().await;
            }
        }
        if !self.adapters.is_empty() {
            warn!("adapters re-registered during shutdown");
        }
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAdapter;

    #[tokio::test]
    async fn test_insert_and_share() {
        let registry = AdapterRegistry::new();
        registry.insert(Arc::new(MockAdapter::new("mock-a")));

        let creds = VenueCredentials::default();
        let a = registry.get_or_init("mock-a", &creds).await.unwrap();
        let b = registry.get_or_init("mock-a", &creds).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_unknown_venue_rejected() {
        let registry = AdapterRegistry::new();
        let err = registry
            .get_or_init("nope", &VenueCredentials::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::UnknownVenue(_)));
    }

    #[tokio::test]
    async fn test_release_closes_only_unreferenced() {
        let registry = AdapterRegistry::new();
        registry.insert(Arc::new(MockAdapter::new("mock-a")));

        let handle = registry
            .get_or_init("mock-a", &VenueCredentials::default())
            .await
            .unwrap();

        // Still referenced by `handle`: must survive.
        registry.release("mock-a").await;
        assert!(registry
            .get_or_init("mock-a", &VenueCredentials::default())
            .await
            .is_ok());

        drop(handle);
        registry.release("mock-a").await;
        // Gone: rebuilding an unknown mock id now fails.
        assert!(registry
            .get_or_init("mock-a", &VenueCredentials::default())
            .await
            .is_err());
    }
}
