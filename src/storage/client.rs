use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::backend::QuorumStore;
use super::error::StoreError;
use super::protocol::*;
use super::types::{Batch, BatchOutcome, Consistency, Filter, Row, TableSchema};
use crate::config::{ClientOptions, ClusteringOptions};

/// HTTP client for a single store node.
///
/// Store nodes do not replicate to each other, so the client never fails over to a
/// different node: transport failures are retried against the same node with jittered
/// backoff. Errors returned by the node are passed through unchanged.
pub struct RemoteStore {
    endpoint: String,
    http_client: reqwest::Client,
    timeout: Duration,
    attempts: usize,
}

impl RemoteStore {
    /// Fails unless exactly one non-empty contact point is given.
    pub fn new(
        contact_points: &[String],
        timeout: Duration,
        attempts: usize,
    ) -> Result<Self, StoreError> {
        let mut contact_points: Vec<String> = contact_points
            .iter()
            .map(|point| normalize_contact_point(point))
            .filter(|point| !point.is_empty())
            .collect();

        let endpoint = match contact_points.len() {
            0 => {
                return Err(StoreError::NoHostAvailable(
                    "no contact points configured".to_string(),
                ));
            }
            1 => contact_points.remove(0),
            n => {
                return Err(StoreError::InvalidQuery(format!(
                    "{} contact points configured, exactly one is supported",
                    n
                )));
            }
        };

        Ok(Self {
            endpoint,
            http_client: reqwest::Client::new(),
            timeout,
            attempts: attempts.max(1),
        })
    }

    pub fn from_options(options: &ClusteringOptions) -> Result<Self, StoreError> {
        Self::new(
            &options.contact_points,
            options.request_timeout(),
            options.request_attempts,
        )
    }

    /// Builds a client and checks that the node answers.
    pub async fn connect(options: &ClusteringOptions) -> Result<Self, StoreError> {
        let store = Self::from_options(options)?;
        let health = store.health().await?;
        tracing::info!(
            "Connected to store node {} at {} ({} keyspace(s))",
            health.node,
            store.endpoint,
            health.keyspaces
        );
        Ok(store)
    }

    /// Base URL of the store node, e.g. `http://127.0.0.1:9042`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn health(&self) -> Result<HealthResponse, StoreError> {
        let url = format!("{}{}", self.endpoint, ENDPOINT_HEALTH);
        let response = self
            .send_with_retry(|| self.http_client.get(url.as_str()))
            .await?;
        decode(response).await
    }

    async fn post<Req, Resp>(&self, path: &str, payload: &Req) -> Result<Resp, StoreError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.endpoint, path);
        let response = self
            .send_with_retry(|| self.http_client.post(url.as_str()).json(payload))
            .await?;
        decode(response).await
    }

    async fn send_with_retry<F>(&self, build: F) -> Result<reqwest::Response, StoreError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut delay_ms = 150u64;
        let mut last_error = String::new();

        for attempt in 0..self.attempts {
            match build().timeout(self.timeout).send().await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::debug!(
                        "Request to {} failed (attempt {}): {}",
                        self.endpoint,
                        attempt + 1,
                        e
                    );
                    last_error = format!("{}: {}", self.endpoint, e);
                }
            }

            if attempt + 1 < self.attempts {
                let jitter = rand::random::<u64>() % 50;
                tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                delay_ms = (delay_ms * 2).min(1200);
            }
        }

        Err(StoreError::NoHostAvailable(last_error))
    }
}

async fn decode<Resp: DeserializeOwned>(response: reqwest::Response) -> Result<Resp, StoreError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<Resp>()
            .await
            .map_err(|e| StoreError::Transport(format!("malformed response: {}", e)));
    }

    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(failure) => Err(failure.error),
        Err(_) => Err(StoreError::Transport(format!(
            "store returned {}: {}",
            status, body
        ))),
    }
}

fn normalize_contact_point(point: &str) -> String {
    let trimmed = point.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

#[async_trait]
impl QuorumStore for RemoteStore {
    async fn create_keyspace(
        &self,
        keyspace: &str,
        replication_factor: usize,
    ) -> Result<(), StoreError> {
        let payload = CreateKeyspaceRequest {
            keyspace: keyspace.to_string(),
            replication_factor,
        };
        let _: AckResponse = self.post(ENDPOINT_KEYSPACE, &payload).await?;
        Ok(())
    }

    async fn create_table(&self, keyspace: &str, schema: &TableSchema) -> Result<(), StoreError> {
        let payload = CreateTableRequest {
            keyspace: keyspace.to_string(),
            schema: schema.clone(),
        };
        let _: AckResponse = self.post(ENDPOINT_TABLE, &payload).await?;
        Ok(())
    }

    async fn select(
        &self,
        keyspace: &str,
        table: &str,
        filters: &[Filter],
        consistency: Consistency,
    ) -> Result<Vec<Row>, StoreError> {
        let payload = SelectRequest {
            keyspace: keyspace.to_string(),
            table: table.to_string(),
            filters: filters.to_vec(),
            consistency,
        };
        let response: SelectResponse = self.post(ENDPOINT_SELECT, &payload).await?;
        Ok(response.rows)
    }

    async fn execute_batch(
        &self,
        keyspace: &str,
        table: &str,
        batch: Batch,
        consistency: Consistency,
    ) -> Result<BatchOutcome, StoreError> {
        let payload = BatchRequest {
            op_id: Uuid::new_v4().to_string(),
            keyspace: keyspace.to_string(),
            table: table.to_string(),
            batch,
            consistency,
        };
        let response: BatchResponse = self.post(ENDPOINT_BATCH, &payload).await?;
        Ok(response.outcome)
    }
}

/// Connects to the configured contact points, retrying a bounded number of times with a
/// fixed delay. The last error is returned once the attempts are exhausted.
pub async fn connect_with_retries(
    options: &ClusteringOptions,
    client: &ClientOptions,
) -> Result<Arc<RemoteStore>, StoreError> {
    let attempts = client.connect_attempts.max(1);
    let mut attempt = 0;

    loop {
        match RemoteStore::connect(options).await {
            Ok(store) => return Ok(Arc::new(store)),
            Err(e) => {
                attempt += 1;
                tracing::warn!(
                    "Attempt {} of {} to connect to the store failed: {}",
                    attempt,
                    attempts,
                    e
                );
                if attempt >= attempts {
                    return Err(e);
                }
                tokio::time::sleep(client.connect_delay()).await;
            }
        }
    }
}
