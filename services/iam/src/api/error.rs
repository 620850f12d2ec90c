//! API error construction and mapping of the service taxonomies onto HTTP.
//!
//! # Propagation policy
//! Domain rejections render as 400/409 (404 for a missing realm), token
//! rejections as 401, denied access as 403, timeouts as 504, and everything
//! unexpected as 500 with the details kept in the logs.

use crate::api::types::ErrorResponse;
use crate::error::IamError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use keygate_auth::TokenRejection;
use keygate_realm::RealmRejection;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn api_error(status: StatusCode, code: &str, message: String) -> ApiError {
    ApiError {
        status,
        body: ErrorResponse {
            code: code.to_string(),
            message,
            request_id: None,
        },
    }
}

pub fn api_not_found(message: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, "not_found", message.to_string())
}

pub fn api_validation(message: &str) -> ApiError {
    api_error(
        StatusCode::BAD_REQUEST,
        "validation_error",
        message.to_string(),
    )
}

impl From<RealmRejection> for ApiError {
    fn from(rejection: RealmRejection) -> Self {
        let (status, code) = match &rejection {
            RealmRejection::RealmNotFound(_) => (StatusCode::NOT_FOUND, "realm_not_found"),
            RealmRejection::RealmAlreadyExists(_) => {
                (StatusCode::CONFLICT, "realm_already_exists")
            }
            RealmRejection::RealmAlreadyDeprecated(_) => {
                (StatusCode::CONFLICT, "realm_already_deprecated")
            }
            RealmRejection::IncorrectRev { .. } => (StatusCode::CONFLICT, "incorrect_rev"),
            RealmRejection::DuplicateIssuer { .. } => (StatusCode::CONFLICT, "duplicate_issuer"),
            // Every well-known validation failure is a client problem.
            _ => (StatusCode::BAD_REQUEST, "invalid_openid_config"),
        };
        api_error(status, code, rejection.to_string())
    }
}

impl From<TokenRejection> for ApiError {
    fn from(rejection: TokenRejection) -> Self {
        let code = match &rejection {
            TokenRejection::InvalidAccessTokenFormat => "invalid_access_token_format",
            TokenRejection::AccessTokenDoesNotContainAnIssuer => "access_token_missing_issuer",
            TokenRejection::AccessTokenDoesNotContainSubject => "access_token_missing_subject",
            TokenRejection::UnknownAccessTokenIssuer => "unknown_access_token_issuer",
            TokenRejection::InvalidAccessToken => "invalid_access_token",
        };
        api_error(StatusCode::UNAUTHORIZED, code, rejection.to_string())
    }
}

impl From<IamError> for ApiError {
    fn from(err: IamError) -> Self {
        match &err {
            IamError::AccessDenied { .. } => {
                api_error(StatusCode::FORBIDDEN, "access_denied", err.to_string())
            }
            IamError::OperationTimedOut(_) => api_error(
                StatusCode::GATEWAY_TIMEOUT,
                "operation_timed_out",
                err.to_string(),
            ),
            IamError::InternalError(_) | IamError::UnexpectedInitialState(_) => {
                tracing::error!(error = %err, "internal service error");
                api_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "unexpected internal error".to_string(),
                )
            }
        }
    }
}
