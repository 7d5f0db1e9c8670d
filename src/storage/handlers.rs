use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::backend::QuorumStore;
use super::error::StoreError;
use super::node::StoreNode;
use super::protocol::*;

fn failure(error: StoreError) -> Response {
    let status = match &error {
        StoreError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::KeyspaceNotFound(_) | StoreError::TableNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        StoreError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
        StoreError::NoHostAvailable(_) | StoreError::Transport(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(ErrorResponse { error })).into_response()
}

pub async fn handle_health(Extension(node): Extension<Arc<StoreNode>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        node: node.name().to_string(),
        keyspaces: node.keyspace_count(),
    })
}

pub async fn handle_create_keyspace(
    Extension(node): Extension<Arc<StoreNode>>,
    Json(req): Json<CreateKeyspaceRequest>,
) -> Response {
    match node
        .engine()
        .create_keyspace(&req.keyspace, req.replication_factor)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(AckResponse { success: true })).into_response(),
        Err(e) => {
            tracing::error!("Failed to create keyspace {}: {}", req.keyspace, e);
            failure(e)
        }
    }
}

pub async fn handle_create_table(
    Extension(node): Extension<Arc<StoreNode>>,
    Json(req): Json<CreateTableRequest>,
) -> Response {
    match node.engine().create_table(&req.keyspace, &req.schema).await {
        Ok(()) => (StatusCode::OK, Json(AckResponse { success: true })).into_response(),
        Err(e) => {
            tracing::error!(
                "Failed to create table {}.{}: {}",
                req.keyspace,
                req.schema.name,
                e
            );
            failure(e)
        }
    }
}

pub async fn handle_select(
    Extension(node): Extension<Arc<StoreNode>>,
    Json(req): Json<SelectRequest>,
) -> Response {
    match node
        .engine()
        .select(&req.keyspace, &req.table, &req.filters, req.consistency)
        .await
    {
        Ok(rows) => (StatusCode::OK, Json(SelectResponse { rows })).into_response(),
        Err(e) => {
            tracing::warn!("Select on {}.{} failed: {}", req.keyspace, req.table, e);
            failure(e)
        }
    }
}

pub async fn handle_batch(
    Extension(node): Extension<Arc<StoreNode>>,
    Json(req): Json<BatchRequest>,
) -> Response {
    let op_id = req.op_id.clone();
    match node.execute_batch(req).await {
        Ok(outcome) => (StatusCode::OK, Json(BatchResponse { outcome })).into_response(),
        Err(e) => {
            tracing::warn!("Batch {} failed: {}", op_id, e);
            failure(e)
        }
    }
}
