//! OpenAPI schema aggregation for the IAM API.
//!
//! # Purpose
//! Collects routes and schema types into a single document for docs and
//! client generation.

use crate::api::types::{ErrorResponse, HealthStatus, RealmListResponse, SystemInfo};
use crate::api::{realms, system};
use crate::realms::ResourceMetadata;
use keygate_realm::{
    ActiveProjection, DeprecatedProjection, GrantType, Label, RealmFields, RealmProjection,
    RealmResource,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "keygate-iam",
        version = "v1",
        description = "Keygate IAM realms HTTP API"
    ),
    paths(
        system::system_info,
        system::system_health,
        realms::list_realms,
        realms::fetch_realm,
        realms::upsert_realm,
        realms::deprecate_realm
    ),
    components(schemas(
        SystemInfo,
        HealthStatus,
        ErrorResponse,
        Label,
        RealmFields,
        RealmResource,
        RealmProjection,
        ActiveProjection,
        DeprecatedProjection,
        GrantType,
        RealmListResponse,
        ResourceMetadata
    )),
    tags(
        (name = "system", description = "System and discovery endpoints"),
        (name = "realms", description = "Realm lifecycle and discovery")
    )
)]
pub struct ApiDoc;
