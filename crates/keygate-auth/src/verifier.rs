//! RS256 bearer-token verification against active realm key sets.
//!
//! # Purpose
//! Turns a bearer string into a [`Caller`] by locating the active realm whose
//! issuer matches the token's `iss` claim and checking the RS256 signature
//! against that realm's published JWKS. Each verification step has its own
//! [`TokenRejection`] so the HTTP layer can report the precise failure.

use crate::identity::Caller;
use crate::rejection::TokenRejection;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use keygate_realm::Label;
use serde_json::Value;

/// Key material for one active realm, as published by the read index.
#[derive(Debug, Clone)]
pub struct RealmKeys {
    pub realm: Label,
    pub issuer: String,
    pub keys: JwkSet,
}

/// Source of active realms for issuer lookup. Deprecated realms must never
/// be returned: they contribute no keys to verification.
pub trait IssuerRealms {
    fn active_realm(&self, issuer: &str) -> Option<RealmKeys>;
}

impl IssuerRealms for Vec<RealmKeys> {
    fn active_realm(&self, issuer: &str) -> Option<RealmKeys> {
        self.iter().find(|entry| entry.issuer == issuer).cloned()
    }
}

/// Bearer-token verifier. `leeway` loosens `exp`/`nbf` checks by the given
/// number of seconds to absorb clock skew between the provider and us.
#[derive(Debug, Clone, Default)]
pub struct TokenVerifier {
    leeway: u64,
}

impl TokenVerifier {
    pub fn new(leeway_seconds: u64) -> Self {
        Self {
            leeway: leeway_seconds,
        }
    }

    /// Verify `token` and compose the caller.
    ///
    /// The `groups` claim is read as a string array or, failing that, a
    /// single comma-separated string with elements trimmed. Quoting or
    /// escaping of commas is not interpreted; the claim is opaque text.
    pub fn verify(
        &self,
        token: &str,
        realms: &dyn IssuerRealms,
    ) -> Result<Caller, TokenRejection> {
        let header =
            decode_header(token).map_err(|_| TokenRejection::InvalidAccessTokenFormat)?;
        let claims = unverified_claims(token)?;
        let issuer = claims
            .get("iss")
            .and_then(Value::as_str)
            .ok_or(TokenRejection::AccessTokenDoesNotContainAnIssuer)?;
        let realm = realms
            .active_realm(issuer)
            .ok_or(TokenRejection::UnknownAccessTokenIssuer)?;

        let verified = self.check_signature(token, header.alg, header.kid.as_deref(), &realm)?;
        let subject = verified
            .get("preferred_username")
            .and_then(Value::as_str)
            .or_else(|| verified.get("sub").and_then(Value::as_str))
            .ok_or(TokenRejection::AccessTokenDoesNotContainSubject)?;
        let groups = groups_claim(&verified);

        Ok(Caller::authenticated(subject, realm.realm, groups))
    }

    fn check_signature(
        &self,
        token: &str,
        alg: Algorithm,
        kid: Option<&str>,
        realm: &RealmKeys,
    ) -> Result<Value, TokenRejection> {
        if alg != Algorithm::RS256 {
            return Err(TokenRejection::InvalidAccessToken);
        }
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = self.leeway;
        validation.validate_aud = false;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        // exp/nbf are enforced when present but not required.
        validation.set_required_spec_claims::<&str>(&[]);

        for key in candidate_keys(&realm.keys, kid) {
            let Ok(decoding_key) = DecodingKey::from_jwk(key) else {
                continue;
            };
            if let Ok(data) = decode::<Value>(token, &decoding_key, &validation) {
                return Ok(data.claims);
            }
        }
        Err(TokenRejection::InvalidAccessToken)
    }
}

/// Keys to try: the `kid`-matching ones when the header names a key,
/// otherwise every key in the set.
fn candidate_keys<'a>(keys: &'a JwkSet, kid: Option<&str>) -> Vec<&'a Jwk> {
    match kid {
        Some(kid) => keys
            .keys
            .iter()
            .filter(|key| key.common.key_id.as_deref() == Some(kid))
            .collect(),
        None => keys.keys.iter().collect(),
    }
}

/// Decode the claims set without verifying the signature; the issuer must be
/// known before a key set can be chosen.
fn unverified_claims(token: &str) -> Result<Value, TokenRejection> {
    let mut parts = token.split('.');
    let _header = parts.next();
    let payload = parts
        .next()
        .ok_or(TokenRejection::InvalidAccessTokenFormat)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| TokenRejection::InvalidAccessTokenFormat)?;
    let claims: Value =
        serde_json::from_slice(&bytes).map_err(|_| TokenRejection::InvalidAccessTokenFormat)?;
    match claims.as_object() {
        Some(fields) if !fields.is_empty() => Ok(claims),
        _ => Err(TokenRejection::InvalidAccessTokenFormat),
    }
}

fn groups_claim(claims: &Value) -> Vec<String> {
    match claims.get("groups") {
        Some(Value::Array(entries)) => {
            let mut groups = Vec::with_capacity(entries.len());
            for entry in entries {
                // A non-string element invalidates the whole claim.
                let Some(raw) = entry.as_str() else {
                    return Vec::new();
                };
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    groups.push(trimmed.to_string());
                }
            }
            groups
        }
        Some(Value::String(raw)) => raw
            .split(',')
            .map(str::trim)
            .filter(|group| !group.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
