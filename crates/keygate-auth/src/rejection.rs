use thiserror::Error;

/// Authentication failures for bearer tokens, one variant per verification
/// step. The HTTP layer renders these as 401 responses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenRejection {
    #[error("the access token is not a well-formed signed JWT")]
    InvalidAccessTokenFormat,
    #[error("the access token does not contain an issuer")]
    AccessTokenDoesNotContainAnIssuer,
    #[error("the access token does not contain a subject")]
    AccessTokenDoesNotContainSubject,
    #[error("the access token issuer does not match an active realm")]
    UnknownAccessTokenIssuer,
    #[error("the access token signature or time claims are invalid")]
    InvalidAccessToken,
}
