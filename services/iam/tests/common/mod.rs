//! Shared end-to-end test helpers: a mock OIDC provider backed by a real RSA
//! key, token minting, and service assembly.

use axum::body::Body;
use axum::http::Request;
use axum::{Json, Router, routing::get};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use iam::acls::{Acls, InMemoryAcls};
use iam::app::AppState;
use iam::journal::memory::{MemoryJournal, MemorySnapshotStore};
use iam::realms::Realms;
use iam::realms::aggregate::{AggregateConfig, RealmAggregate};
use iam::realms::index::{IndexConfig, LocalKeyValueStore, RealmIndex};
use keygate_auth::TokenVerifier;
use keygate_realm::{RetryStrategy, SystemClock, WellKnownResolver};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct MockProvider {
    pub issuer: String,
    pub config_url: String,
    pub kid: String,
    private_pem: String,
}

impl MockProvider {
    /// Sign a token with this provider's key.
    pub fn mint(&self, claims: Value) -> String {
        let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        jsonwebtoken::encode(
            &header,
            &claims,
            &jsonwebtoken::EncodingKey::from_rsa_pem(self.private_pem.as_bytes()).expect("key"),
        )
        .expect("token")
    }

    pub fn claims(&self, subject: &str) -> Value {
        let now = chrono::Utc::now().timestamp();
        json!({
            "iss": self.issuer,
            "sub": subject,
            "iat": now,
            "exp": now + 300,
        })
    }
}

/// Serve a well-known document plus a JWKS derived from a fresh RSA key. The
/// listener's own address is the issuer.
pub async fn spawn_provider() -> MockProvider {
    let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("key");
    let public_key = RsaPublicKey::from(&key);
    let private_pem = key
        .to_pkcs1_pem(Default::default())
        .expect("pem")
        .to_string();

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let issuer = format!("http://{addr}");
    let kid = "kid-1".to_string();

    let document = json!({
        "issuer": issuer,
        "jwks_uri": format!("{issuer}/jwks"),
        "authorization_endpoint": format!("{issuer}/authorize"),
        "token_endpoint": format!("{issuer}/token"),
        "userinfo_endpoint": format!("{issuer}/userinfo"),
        "grant_types_supported": ["authorization_code", "refresh_token"],
    });
    let jwks = json!({
        "keys": [{
            "kty": "RSA",
            "kid": kid,
            "alg": "RS256",
            "use": "sig",
            "n": URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        }]
    });

    let app = Router::new()
        .route(
            "/.well-known/openid-configuration",
            get(move || {
                let document = document.clone();
                async move { Json(document) }
            }),
        )
        .route(
            "/jwks",
            get(move || {
                let jwks = jwks.clone();
                async move { Json(jwks) }
            }),
        );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service()).await;
    });

    MockProvider {
        config_url: format!("{issuer}/.well-known/openid-configuration"),
        issuer,
        kid,
        private_pem,
    }
}

pub struct TestService {
    pub state: AppState,
    pub acls: Arc<InMemoryAcls>,
}

/// Assemble the service on in-memory stores. The projector is not spawned:
/// writes refresh the index synchronously, which is what these tests rely on.
pub fn service(open_acls: bool) -> TestService {
    let journal = Arc::new(MemoryJournal::new());
    let index = Arc::new(RealmIndex::new(
        Arc::new(LocalKeyValueStore::new()),
        IndexConfig::default(),
    ));
    let aggregate = RealmAggregate::new(
        journal,
        Arc::new(MemorySnapshotStore::new()),
        WellKnownResolver::new(reqwest::Client::new(), RetryStrategy::Never),
        Arc::new(SystemClock),
        index.clone(),
        AggregateConfig::default(),
    );
    let acls = Arc::new(InMemoryAcls::new(open_acls));
    let acls_for_realms = acls.clone();
    let realms = Arc::new(Realms::new(
        aggregate,
        index,
        Box::new(move || acls_for_realms.clone() as Arc<dyn Acls>),
        TokenVerifier::default(),
    ));
    TestService {
        state: AppState {
            realms,
            api_version: "v1".to_string(),
        },
        acls,
    }
}

pub fn app(svc: &TestService) -> axum::routing::RouterIntoService<Body> {
    iam::app::build_router(svc.state.clone()).into_service()
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}

pub fn authorized(mut request: Request<Body>, token: &str) -> Request<Body> {
    request.headers_mut().insert(
        axum::http::header::AUTHORIZATION,
        format!("Bearer {token}").parse().expect("auth header"),
    );
    request
}

pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}
