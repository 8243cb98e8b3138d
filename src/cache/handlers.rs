use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
};
use std::sync::Arc;

use super::cache::Cache;
use crate::commands::{FlagSet, WriteResult};
use crate::error::{GridError, Result};
use crate::remoting::Response;
use crate::remoting::protocol::{
    CommandRequest, DeltaRequest, GetResponse, PutRequest, PutResponse, RemoveRequest,
};

fn write_reply(operation: &str, key: &str, result: Result<WriteResult>) -> (StatusCode, Json<PutResponse>) {
    match result {
        Ok(result) => (
            StatusCode::OK,
            Json(PutResponse {
                success: result.successful,
                previous: result.previous,
            }),
        ),
        Err(e) => {
            tracing::error!("Failed to {} {}: {}", operation, key, e);
            let status = match e {
                GridError::Timeout { .. } | GridError::LockTimeout { .. } => {
                    StatusCode::GATEWAY_TIMEOUT
                }
                GridError::InvalidCommand(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(PutResponse {
                    success: false,
                    previous: None,
                }),
            )
        }
    }
}

pub async fn handle_put(
    Extension(cache): Extension<Arc<Cache>>,
    Json(req): Json<PutRequest>,
) -> (StatusCode, Json<PutResponse>) {
    let result = cache
        .put(&req.key, req.value, req.lifespan_ms, req.max_idle_ms)
        .await;
    write_reply("put", &req.key, result)
}

pub async fn handle_put_if_absent(
    Extension(cache): Extension<Arc<Cache>>,
    Json(req): Json<PutRequest>,
) -> (StatusCode, Json<PutResponse>) {
    let result = cache
        .put_if_absent(&req.key, req.value, req.lifespan_ms, req.max_idle_ms)
        .await;
    write_reply("put_if_absent", &req.key, result)
}

pub async fn handle_delta(
    Extension(cache): Extension<Arc<Cache>>,
    Json(req): Json<DeltaRequest>,
) -> (StatusCode, Json<PutResponse>) {
    let result = cache.apply_delta(&req.key, req.delta, req.lifespan_ms).await;
    write_reply("apply delta to", &req.key, result)
}

pub async fn handle_remove(
    Extension(cache): Extension<Arc<Cache>>,
    Json(req): Json<RemoveRequest>,
) -> (StatusCode, Json<PutResponse>) {
    let result = cache.remove(&req.key, req.value).await;
    write_reply("remove", &req.key, result)
}

pub async fn handle_get(
    Extension(cache): Extension<Arc<Cache>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<GetResponse>) {
    match cache.get(&key, &FlagSet::new()).await {
        Ok(Some(value)) => (StatusCode::OK, Json(GetResponse { value: Some(value) })),
        Ok(None) => (StatusCode::NOT_FOUND, Json(GetResponse { value: None })),
        Err(e) => {
            tracing::error!("Failed to get {}: {}", key, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(GetResponse { value: None }),
            )
        }
    }
}

/// Inbound side of the transport. Failures travel back inside the `Response`,
/// so this always answers 200.
pub async fn handle_command(
    Extension(cache): Extension<Arc<Cache>>,
    Json(req): Json<CommandRequest>,
) -> (StatusCode, Json<Response>) {
    tracing::trace!("Command {} from {}", req.command_id, req.origin);
    (StatusCode::OK, Json(cache.handle_remote(req).await))
}
