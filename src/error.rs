/*
 * Responsibility
 * - AppError: the single per-request error for HTTP handlers and capabilities
 * - status code / stable machine code / WWW-Authenticate mapping
 * - conversions from the service-layer errors that can surface in a request
 */
use axum::http::StatusCode;
use thiserror::Error;

use crate::dispatch::ContextError;
use crate::repos::error::RepoError;
use crate::services::auth::verifier::VerifyError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{code}: {message}")]
    BadRequest { code: &'static str, message: String },
    #[error("not found: {resource}")]
    NotFound { resource: String },
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("authentication failed: {reason}")]
    AuthenticationFailed { reason: &'static str },
    #[error("authorization denied: {message}")]
    AuthorizationDenied { message: String },
    #[error("cannot verify group membership")]
    CannotVerifyMembership,
    #[error("identity provider unavailable")]
    IdentityProviderUnavailable,
    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            AppError::AuthenticationFailed { reason } if *reason == INSUFFICIENT_SCOPE => {
                StatusCode::FORBIDDEN
            }
            AppError::AuthenticationFailed { .. } => StatusCode::UNAUTHORIZED,
            AppError::AuthorizationDenied { .. } => StatusCode::FORBIDDEN,
            AppError::CannotVerifyMembership | AppError::IdentityProviderUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code carried in JSON-RPC error data.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest { code, .. } => code,
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            AppError::AuthenticationFailed { .. } => "AUTHENTICATION_FAILED",
            AppError::AuthorizationDenied { .. } => "AUTHORIZATION_DENIED",
            AppError::CannotVerifyMembership => "CANNOT_VERIFY_MEMBERSHIP",
            AppError::IdentityProviderUnavailable => "IDENTITY_PROVIDER_UNAVAILABLE",
            AppError::Internal => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            AppError::AuthenticationFailed { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            AppError::BadRequest { message, .. } => message.clone(),
            AppError::NotFound { resource } => format!("{resource} not found."),
            AppError::AuthorizationDenied { message } => message.clone(),
            other => other.to_string(),
        }
    }

    /// RFC 6750 challenge for auth failures, `None` for everything else.
    pub fn www_authenticate(&self, resource_metadata: Option<&str>) -> Option<String> {
        let error = match self {
            AppError::AuthenticationRequired => None,
            AppError::AuthenticationFailed { reason } if *reason == INSUFFICIENT_SCOPE => {
                Some(INSUFFICIENT_SCOPE)
            }
            AppError::AuthenticationFailed { .. } => Some("invalid_token"),
            _ => return None,
        };

        let mut parts = vec!["Bearer realm=\"mcp\"".to_string()];
        if let Some(error) = error {
            parts.push(format!("error=\"{error}\""));
        }
        if let Some(url) = resource_metadata {
            parts.push(format!("resource_metadata=\"{url}\""));
        }
        Some(parts.join(", "))
    }
}

const INSUFFICIENT_SCOPE: &str = "insufficient_scope";

impl From<VerifyError> for AppError {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::KeySetUnavailable(_) => AppError::IdentityProviderUnavailable,
            other => AppError::AuthenticationFailed {
                reason: other.reason_code(),
            },
        }
    }
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Invalid(message) => AppError::bad_request("INVALID_ARGUMENT", message),
            RepoError::Storage(_) => AppError::Internal,
        }
    }
}

impl From<ContextError> for AppError {
    fn from(e: ContextError) -> Self {
        tracing::error!(error = %e, "request context misuse");
        AppError::Internal
    }
}
