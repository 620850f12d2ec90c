use crate::label::Label;
use thiserror::Error;

/// Domain rejections returned as values from command evaluation and
/// well-known resolution. These are terminal and never retried; the HTTP
/// layer renders them as 4xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RealmRejection {
    #[error("realm '{0}' already exists")]
    RealmAlreadyExists(Label),
    #[error("realm '{0}' not found")]
    RealmNotFound(Label),
    #[error("realm '{0}' is already deprecated")]
    RealmAlreadyDeprecated(Label),
    #[error("incorrect revision: provided {provided}, expected {expected}")]
    IncorrectRev { provided: u64, expected: u64 },
    #[error("issuer '{issuer}' is already used by realm '{by}'")]
    DuplicateIssuer { issuer: String, by: Label },
    #[error("the openid configuration endpoint could not be fetched: {reason}")]
    UnsuccessfulOpenIdConfigResponse { reason: String },
    #[error("illegal openid configuration document: {0}")]
    IllegalOpenIdConfigFormat(String),
    #[error("the jwks endpoint could not be fetched: {reason}")]
    UnsuccessfulJwksResponse { reason: String },
    #[error("illegal jwks document: {0}")]
    IllegalJwksFormat(String),
    #[error("no RS256 signature keys found in the jwks document")]
    NoValidKeysFound,
    #[error("the openid configuration issuer must be a non-empty string")]
    IllegalIssuer,
    #[error("illegal grant type entry '{0}'")]
    IllegalGrantType(String),
    #[error("endpoint '{0}' is missing or not an absolute http(s) url")]
    IllegalEndpoint(String),
}
