//! Realm API handlers.
//!
//! # Purpose
//! The public realm contract: list, fetch (optionally by revision), create,
//! update, and deprecate. Every handler resolves the caller from the
//! `Authorization` header first; a missing header yields the anonymous
//! caller, and authorization is left to the facade's ACL check.

use crate::api::error::{ApiError, api_not_found, api_validation};
use crate::api::types::{RealmListResponse, RevQuery};
use crate::app::AppState;
use crate::realms::ResourceMetadata;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use keygate_auth::Caller;
use keygate_realm::{Label, RealmFields, RealmResource};

fn bearer(headers: &HeaderMap) -> Option<&str> {
    // Only the standard `Authorization: Bearer <token>` form is accepted.
    let value = headers.get(header::AUTHORIZATION)?;
    let value = value.to_str().ok()?;
    value.strip_prefix("Bearer ")
}

fn resolve_caller(state: &AppState, headers: &HeaderMap) -> Result<Caller, ApiError> {
    Ok(state.realms.caller(bearer(headers))?)
}

fn parse_label(raw: &str) -> Result<Label, ApiError> {
    Label::new(raw).map_err(|err| api_validation(&err.to_string()))
}

#[utoipa::path(
    get,
    path = "/v1/realms",
    tag = "realms",
    responses(
        (status = 200, description = "List realms", body = RealmListResponse),
        (status = 401, description = "Invalid credentials", body = crate::api::types::ErrorResponse),
        (status = 403, description = "Missing realms/read", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn list_realms(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RealmListResponse>, ApiError> {
    let caller = resolve_caller(&state, &headers)?;
    let results = state.realms.list(&caller).await?;
    Ok(Json(RealmListResponse {
        total: results.len(),
        results,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/realms/{id}",
    tag = "realms",
    params(
        ("id" = String, Path, description = "Realm label"),
        RevQuery
    ),
    responses(
        (status = 200, description = "Fetch realm", body = RealmResource),
        (status = 404, description = "Realm or revision not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn fetch_realm(
    Path(id): Path<String>,
    Query(query): Query<RevQuery>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RealmResource>, ApiError> {
    let caller = resolve_caller(&state, &headers)?;
    let id = parse_label(&id)?;
    let resource = match query.rev {
        Some(rev) => state.realms.fetch_at(&id, rev, &caller).await?,
        None => state.realms.fetch(&id, &caller).await?,
    };
    resource
        .map(Json)
        .ok_or_else(|| api_not_found("realm not found"))
}

#[utoipa::path(
    put,
    path = "/v1/realms/{id}",
    tag = "realms",
    params(
        ("id" = String, Path, description = "Realm label"),
        RevQuery
    ),
    request_body = RealmFields,
    responses(
        (status = 201, description = "Realm created", body = ResourceMetadata),
        (status = 200, description = "Realm updated", body = ResourceMetadata),
        (status = 400, description = "Invalid payload or provider document", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Conflict", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn upsert_realm(
    Path(id): Path<String>,
    Query(query): Query<RevQuery>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(fields): Json<RealmFields>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = resolve_caller(&state, &headers)?;
    let id = parse_label(&id)?;
    match query.rev {
        // Without a revision this is a create; with one, an update.
        None => {
            let metadata = state.realms.create(id, fields, &caller).await??;
            Ok((StatusCode::CREATED, Json(metadata)))
        }
        Some(rev) => {
            let metadata = state.realms.update(id, rev, fields, &caller).await??;
            Ok((StatusCode::OK, Json(metadata)))
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/realms/{id}",
    tag = "realms",
    params(
        ("id" = String, Path, description = "Realm label"),
        RevQuery
    ),
    responses(
        (status = 200, description = "Realm deprecated", body = ResourceMetadata),
        (status = 409, description = "Conflict", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn deprecate_realm(
    Path(id): Path<String>,
    Query(query): Query<RevQuery>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ResourceMetadata>, ApiError> {
    let caller = resolve_caller(&state, &headers)?;
    let id = parse_label(&id)?;
    let rev = query
        .rev
        .ok_or_else(|| api_validation("the 'rev' query parameter is required"))?;
    let metadata = state.realms.deprecate(id, rev, &caller).await??;
    Ok(Json(metadata))
}
