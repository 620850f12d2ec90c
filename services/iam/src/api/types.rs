//! Request/response bodies for the public API.
//!
//! # Purpose
//! The realm payload (`RealmFields`) and resource shapes come from the domain
//! crate; this module adds the HTTP-only envelopes.

use keygate_realm::RealmResource;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
}

/// Listing envelope of the realms API.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RealmListResponse {
    pub total: usize,
    #[serde(rename = "_results")]
    pub results: Vec<RealmResource>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct RevQuery {
    /// Target revision; on writes this is the optimistic concurrency token.
    pub rev: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SystemInfo {
    pub service: String,
    pub api_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthStatus {
    pub status: String,
}
