//! System/health API handlers.

use crate::api::types::{HealthStatus, SystemInfo};
use crate::app::AppState;
use axum::Json;
use axum::extract::State;

#[utoipa::path(
    get,
    path = "/v1/system/info",
    tag = "system",
    responses(
        (status = 200, description = "Service identity", body = SystemInfo)
    )
)]
pub(crate) async fn system_info(State(state): State<AppState>) -> Json<SystemInfo> {
    Json(SystemInfo {
        service: "keygate-iam".to_string(),
        api_version: state.api_version.clone(),
    })
}

#[utoipa::path(
    get,
    path = "/v1/system/health",
    tag = "system",
    responses(
        (status = 200, description = "Service health", body = HealthStatus)
    )
)]
pub(crate) async fn system_health() -> Json<HealthStatus> {
    // The in-memory stores have no connectivity to probe; a durable backend
    // would check its connection here.
    Json(HealthStatus {
        status: "ok".to_string(),
    })
}
