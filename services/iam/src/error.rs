use keygate_realm::Label;
use thiserror::Error;

/// Infrastructure failures raised by the service effect boundary, distinct
/// from domain rejections (returned as values) and token rejections (401s).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IamError {
    #[error("access to '{resource}' with permission '{permission}' was denied")]
    AccessDenied { resource: String, permission: String },
    #[error("operation timed out: {0}")]
    OperationTimedOut(String),
    #[error("unexpected internal error: {0}")]
    InternalError(String),
    #[error("realm '{0}' unexpectedly has no events")]
    UnexpectedInitialState(Label),
}

impl IamError {
    pub fn internal(reason: impl std::fmt::Display) -> Self {
        Self::InternalError(reason.to_string())
    }
}
