//! Shared crate-test helpers: an in-process OIDC provider and event data.

use crate::event::RealmChangeData;
use crate::label::Label;
use crate::well_known::GrantType;
use axum::{Json, Router, routing::get};
use chrono::{TimeZone, Utc};
use jsonwebtoken::jwk::JwkSet;
use serde_json::{Value, json};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

// Structurally valid RSA modulus material; these tests never verify
// signatures, only parse and filter key sets.
const TEST_MODULUS: &str = "yRE6rHuNR0QbHO3H3Kt2pOKGVhQqGZXInOduQNxXzuKlvQTLUTv4l4sggh5_CYYi\
    _cvI-SXVT9kPWSKXxJXBXd_4LkvcPuUakBoAkfh-eiFVMh2VrUyWyj3MFl0HTVF9KwRXLAcwkREiS3npThHRyIxuy0ZM\
    eZfxVL5arMhw1SRELB8HoGfG_AtH89BIE9jDBHZ9dLelK9a184zAf8LwoPLxvJb3Il5nncqPcSfKDDodMFBIMc4lQzDK\
    L5gvmiXLXB1AGLm8KBjfE8s3L5xqi-yUod-j8MtvIj812dkS4QMiRVN_by2h3ZY8LYVGrqZXZTcgn2ujn8uKjXLZVD5T\
    dQ";

pub(crate) struct MockProvider {
    pub addr: SocketAddr,
    _server: JoinHandle<()>,
}

impl MockProvider {
    pub fn config_url(&self) -> Url {
        Url::parse(&format!(
            "http://{}/.well-known/openid-configuration",
            self.addr
        ))
        .expect("config url")
    }
}

/// Serve `document` and `jwks` from an ephemeral local listener. A missing
/// `jwks_uri` is filled in with the listener's own address.
pub(crate) async fn spawn_provider(mut document: Value, jwks: Value) -> MockProvider {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    if document.get("jwks_uri").is_none() {
        document["jwks_uri"] = json!(format!("http://{addr}/jwks"));
    }

    let app = Router::new()
        .route(
            "/.well-known/openid-configuration",
            get({
                let document = document.clone();
                move || {
                    let document = document.clone();
                    async move { Json(document) }
                }
            }),
        )
        .route(
            "/jwks",
            get({
                let jwks = jwks.clone();
                move || {
                    let jwks = jwks.clone();
                    async move { Json(jwks) }
                }
            }),
        );
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service()).await;
    });
    MockProvider {
        addr,
        _server: server,
    }
}

pub(crate) fn provider_document(issuer: &str, grant_types: &[&str]) -> Value {
    json!({
        "issuer": issuer,
        "authorization_endpoint": "https://provider.example.com/authorize",
        "token_endpoint": "https://provider.example.com/token",
        "userinfo_endpoint": "https://provider.example.com/userinfo",
        "grant_types_supported": grant_types,
    })
}

pub(crate) fn rsa_jwk(kid: &str) -> Value {
    json!({
        "kty": "RSA",
        "kid": kid,
        "alg": "RS256",
        "use": "sig",
        "n": TEST_MODULUS,
        "e": "AQAB",
    })
}

/// Change payload with fixed instants and subject "alice".
pub(crate) fn change_data(id: &str, rev: u64) -> RealmChangeData {
    RealmChangeData {
        id: Label::new(id).expect("label"),
        rev,
        name: format!("Realm {id}"),
        open_id_config: Url::parse("https://provider.example.com/.well-known/openid-configuration")
            .expect("url"),
        issuer: "https://provider.example.com".to_string(),
        keys: JwkSet { keys: Vec::new() },
        grant_types: vec![GrantType::AuthorizationCode],
        logo: None,
        authorization_endpoint: Url::parse("https://provider.example.com/authorize").expect("url"),
        token_endpoint: Url::parse("https://provider.example.com/token").expect("url"),
        userinfo_endpoint: Url::parse("https://provider.example.com/userinfo").expect("url"),
        revocation_endpoint: None,
        end_session_endpoint: None,
        instant: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        subject: "alice".to_string(),
    }
}
