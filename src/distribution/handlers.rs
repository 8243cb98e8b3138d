use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
};
use std::sync::Arc;

use super::manager::DistributionManager;
use crate::remoting::protocol::{LocalityResponse, LocateResponse, RehashStatusResponse};

pub async fn handle_locality(
    Extension(dm): Extension<Arc<DistributionManager>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<LocalityResponse>) {
    let locality = dm.get_locality(&key);
    (
        StatusCode::OK,
        Json(LocalityResponse {
            locality: format!("{:?}", locality),
            located_locally: dm.is_located_locally(&key),
            key,
        }),
    )
}

pub async fn handle_locate(
    Extension(dm): Extension<Arc<DistributionManager>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<LocateResponse>) {
    let owners = dm.locate_key(&key);
    (StatusCode::OK, Json(LocateResponse { key, owners }))
}

pub async fn handle_rehash_status(
    Extension(dm): Extension<Arc<DistributionManager>>,
) -> (StatusCode, Json<RehashStatusResponse>) {
    let members = dm
        .get_write_consistent_hash()
        .members()
        .iter()
        .map(|address| address.to_string())
        .collect();

    (
        StatusCode::OK,
        Json(RehashStatusResponse {
            topology_id: dm.topology_id(),
            rehash_in_progress: dm.is_rehash_in_progress(),
            join_complete: dm.is_join_complete(),
            members,
        }),
    )
}
