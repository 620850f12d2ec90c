//! OIDC discovery document and JWKS resolution.
//!
//! # Purpose
//! Fetches and validates a provider's `.well-known/openid-configuration`
//! document plus the JWKS it points at, keeping only RS256 signature keys.
//! Field validation runs in a fixed order so a broken document always maps to
//! the same rejection.

use crate::rejection::RealmRejection;
use crate::retry::{self, RetryStrategy};
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;
use utoipa::ToSchema;

/// Grant types recognized by the service. Unrecognized entries in
/// `grant_types_supported` are dropped; non-string entries are rejected.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    Implicit,
    Password,
    ClientCredentials,
    RefreshToken,
    DeviceCode,
    JwtBearer,
    Saml2Bearer,
}

/// A validated discovery document plus the RS256 signature keys published at
/// its `jwks_uri`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellKnown {
    pub issuer: String,
    pub jwks_uri: Url,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub userinfo_endpoint: Url,
    pub revocation_endpoint: Option<Url>,
    pub end_session_endpoint: Option<Url>,
    pub grant_types: Vec<GrantType>,
    pub keys: JwkSet,
}

/// Resolver over a shared HTTP client. Transport failures and 5xx responses
/// are retried per the configured strategy; validation failures are not.
#[derive(Debug, Clone)]
pub struct WellKnownResolver {
    client: reqwest::Client,
    retry: RetryStrategy,
}

#[derive(Debug, thiserror::Error)]
enum FetchError {
    #[error("http status {0}")]
    Status(u16),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("response body is not json: {0}")]
    Body(String),
}

impl FetchError {
    fn is_retriable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status(status) => *status >= 500,
            Self::Body(_) => false,
        }
    }
}

impl WellKnownResolver {
    pub fn new(client: reqwest::Client, retry: RetryStrategy) -> Self {
        Self { client, retry }
    }

    /// Fetch and validate the document at `config`, then its JWKS.
    pub async fn resolve(&self, config: &Url) -> Result<WellKnown, RealmRejection> {
        let document = self.fetch_json(config).await.map_err(|err| match err {
            FetchError::Body(reason) => RealmRejection::IllegalOpenIdConfigFormat(reason),
            other => RealmRejection::UnsuccessfulOpenIdConfigResponse {
                reason: other.to_string(),
            },
        })?;

        // Validation order is part of the contract: the first failing field
        // determines the rejection a client observes.
        let issuer = parse_issuer(&document)?;
        let jwks_uri = parse_endpoint(&document, "jwks_uri")?;
        let authorization_endpoint = parse_endpoint(&document, "authorization_endpoint")?;
        let token_endpoint = parse_endpoint(&document, "token_endpoint")?;
        let userinfo_endpoint = parse_endpoint(&document, "userinfo_endpoint")?;
        let grant_types = parse_grant_types(&document)?;
        let revocation_endpoint = parse_optional_endpoint(&document, "revocation_endpoint")?;
        let end_session_endpoint = parse_optional_endpoint(&document, "end_session_endpoint")?;

        let jwks = self.fetch_json(&jwks_uri).await.map_err(|err| match err {
            FetchError::Body(reason) => RealmRejection::IllegalJwksFormat(reason),
            other => RealmRejection::UnsuccessfulJwksResponse {
                reason: other.to_string(),
            },
        })?;
        let keys = signature_keys(&jwks)?;

        Ok(WellKnown {
            issuer,
            jwks_uri,
            authorization_endpoint,
            token_endpoint,
            userinfo_endpoint,
            revocation_endpoint,
            end_session_endpoint,
            grant_types,
            keys,
        })
    }

    async fn fetch_json(&self, url: &Url) -> Result<Value, FetchError> {
        retry::retry(&self.retry, FetchError::is_retriable, || async move {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|err| FetchError::Transport(err.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }
            response
                .json::<Value>()
                .await
                .map_err(|err| FetchError::Body(err.to_string()))
        })
        .await
    }
}

fn parse_issuer(document: &Value) -> Result<String, RealmRejection> {
    match document.get("issuer").and_then(Value::as_str) {
        Some(issuer) if !issuer.trim().is_empty() => Ok(issuer.to_string()),
        _ => Err(RealmRejection::IllegalIssuer),
    }
}

fn parse_endpoint(document: &Value, name: &str) -> Result<Url, RealmRejection> {
    parse_optional_endpoint(document, name)?
        .ok_or_else(|| RealmRejection::IllegalEndpoint(name.to_string()))
}

fn parse_optional_endpoint(document: &Value, name: &str) -> Result<Option<Url>, RealmRejection> {
    match document.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_str()
            .and_then(|raw| Url::parse(raw).ok())
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .map(Some)
            .ok_or_else(|| RealmRejection::IllegalEndpoint(name.to_string())),
    }
}

fn parse_grant_types(document: &Value) -> Result<Vec<GrantType>, RealmRejection> {
    match document.get("grant_types_supported") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(entries)) => {
            let mut grant_types = Vec::with_capacity(entries.len());
            for entry in entries {
                let raw = entry
                    .as_str()
                    .ok_or_else(|| RealmRejection::IllegalGrantType(entry.to_string()))?;
                // Unknown grant types are filtered, not rejected.
                if let Ok(grant_type) =
                    serde_json::from_value::<GrantType>(Value::String(raw.to_string()))
                {
                    grant_types.push(grant_type);
                }
            }
            Ok(grant_types)
        }
        Some(other) => Err(RealmRejection::IllegalGrantType(other.to_string())),
    }
}

/// Keep only RSA keys usable for RS256 signatures: `alg` absent or RS256 and
/// `use` absent or `sig`.
fn signature_keys(document: &Value) -> Result<JwkSet, RealmRejection> {
    let entries = document
        .get("keys")
        .and_then(Value::as_array)
        .ok_or_else(|| RealmRejection::IllegalJwksFormat("missing 'keys' array".to_string()))?;

    let keys: Vec<Jwk> = entries
        .iter()
        .filter_map(|raw| serde_json::from_value::<Jwk>(raw.clone()).ok())
        .filter(|key| {
            let rsa = matches!(key.algorithm, AlgorithmParameters::RSA(_));
            let alg_ok = match &key.common.key_algorithm {
                Some(alg) => *alg == KeyAlgorithm::RS256,
                None => true,
            };
            let use_ok = match &key.common.public_key_use {
                Some(public_key_use) => *public_key_use == PublicKeyUse::Signature,
                None => true,
            };
            rsa && alg_ok && use_ok
        })
        .collect();

    if keys.is_empty() {
        return Err(RealmRejection::NoValidKeysFound);
    }
    Ok(JwkSet { keys })
}
