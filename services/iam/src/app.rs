//! HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, configures tracing middleware, and defines the
//! shared application state injected into handlers.

use crate::api;
use crate::api::openapi::ApiDoc;
use crate::observability;
use crate::realms::Realms;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use utoipa::OpenApi;

#[derive(Clone)]
pub struct AppState {
    pub realms: Arc<Realms>,
    pub api_version: String,
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            );
            span.set_parent(parent);
            span
        });

    Router::new()
        .route(
            "/v1/system/info",
            axum::routing::get(api::system::system_info),
        )
        .route(
            "/v1/system/health",
            axum::routing::get(api::system::system_health),
        )
        .route("/v1/realms", axum::routing::get(api::realms::list_realms))
        .route(
            "/v1/realms/:id",
            axum::routing::get(api::realms::fetch_realm)
                .put(api::realms::upsert_realm)
                .delete(api::realms::deprecate_realm),
        )
        .merge(
            utoipa_swagger_ui::SwaggerUi::new("/docs").url("/v1/openapi.json", ApiDoc::openapi()),
        )
        .layer(trace_layer)
        .with_state(state)
}
