use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::codec;
use super::error::MembershipError;
use super::store::MembershipStore;
use super::types::GatewayUri;
use crate::config::{ClusteringOptions, GatewayOptions};
use crate::storage::QuorumStore;

/// Read-only discovery view over the membership table.
///
/// Pull only: callers re-invoke [`get_gateways`](Self::get_gateways) at least every
/// [`max_staleness`](Self::max_staleness).
pub struct GatewayListProvider {
    cluster_id: String,
    options: ClusteringOptions,
    max_staleness: Duration,
    backend: Option<Arc<dyn QuorumStore>>,
    store: OnceCell<MembershipStore>,
}

impl GatewayListProvider {
    pub fn new(cluster_id: &str, options: &ClusteringOptions, gateway: &GatewayOptions) -> Self {
        Self {
            cluster_id: cluster_id.to_string(),
            options: options.clone(),
            max_staleness: gateway.refresh_period(),
            backend: None,
            store: OnceCell::new(),
        }
    }

    pub fn with_backend(
        cluster_id: &str,
        options: &ClusteringOptions,
        gateway: &GatewayOptions,
        backend: Arc<dyn QuorumStore>,
    ) -> Self {
        Self {
            backend: Some(backend),
            ..Self::new(cluster_id, options, gateway)
        }
    }

    /// Connects to the store. Does not create the table.
    pub async fn initialize(&self) -> Result<(), MembershipError> {
        self.store
            .get_or_try_init(|| MembershipStore::open(self.backend.clone(), &self.options))
            .await
            .map(|_| ())
            .map_err(|e| {
                tracing::warn!(
                    "Store error while initializing gateway list provider for cluster {}: {}",
                    self.cluster_id,
                    e
                );
                MembershipError::from(e)
            })
    }

    /// Active silos with a proxy port, as `gwy.tcp://` URIs, sorted and deduplicated.
    pub async fn get_gateways(&self) -> Result<Vec<GatewayUri>, MembershipError> {
        let store = self.store.get().ok_or(MembershipError::NotInitialized)?;

        let rows = store.get_gateways(&self.cluster_id).await.map_err(|e| {
            tracing::error!(
                "Unexpected error occurred while reading gateways of cluster {}: {}",
                self.cluster_id,
                e
            );
            MembershipError::from(e)
        })?;

        let mut gateways = Vec::with_capacity(rows.len());
        for row in &rows {
            let entry = codec::row_to_entry(row)?;
            if let Some(uri) = entry.gateway_uri() {
                gateways.push(uri);
            }
        }
        gateways.sort();
        gateways.dedup();

        tracing::debug!(
            "Found {} gateway(s) in cluster {}",
            gateways.len(),
            self.cluster_id
        );
        Ok(gateways)
    }

    pub fn max_staleness(&self) -> Duration {
        self.max_staleness
    }

    pub fn is_updatable(&self) -> bool {
        true
    }
}
