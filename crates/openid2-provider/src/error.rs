//! Error types for provider operations
//!
//! This module defines the protocol-visible errors of the provider engine and
//! the store-level errors raised by association store implementations.
//!
//! Conditions that are normal protocol outcomes (an unknown association
//! handle, a signature mismatch, a declined login) are never represented
//! here; they are ordinary results.

use std::collections::BTreeMap;
use thiserror::Error;

/// Provider error types.
///
/// Every variant can be rendered as the uniform OpenID error message
/// (`ns`, `mode=error`, `error`) plus any structured fields returned by
/// [`ProviderError::error_params`].
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Message namespace is not the OpenID 2.0 namespace
    #[error("unknown ns {0:?}")]
    UnknownNamespace(String),

    /// Mode is not one the provider handles
    #[error("unknown mode {0:?}")]
    UnknownMode(String),

    /// Association session type is not supported
    #[error("session type {0:?} not supported")]
    UnsupportedSessionType(String),

    /// Association type is not supported
    #[error("unsupported association type {0:?}")]
    UnsupportedAssociationType(String),

    /// Extension namespace declarations are malformed
    #[error("{0}")]
    InvalidExtension(String),

    /// Positive assertion requested without a return_to
    #[error("cannot send id_res message, no return_to parameter")]
    MissingReturnTo,

    /// Every generated association handle collided with an existing one
    #[error("cannot store association after {0} attempts")]
    HandleExhausted(u32),

    /// Login handler failed
    #[error("login failed: {0}")]
    LoginFailed(String),

    /// Association store failure
    #[error("association store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

impl ProviderError {
    /// Check if this error should be logged at error level.
    ///
    /// Protocol errors caused by a malformed request are expected and
    /// should not be logged as errors.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            ProviderError::HandleExhausted(_)
                | ProviderError::Store(_)
                | ProviderError::ConfigError(_)
                | ProviderError::Internal(_)
        )
    }

    /// Get HTTP status code for this error when delivered directly.
    ///
    /// OpenID 2.0 direct error responses always use 400.
    pub fn status_code(&self) -> u16 {
        400
    }

    /// Get error code for log records.
    pub fn error_code(&self) -> &'static str {
        match self {
            ProviderError::UnknownNamespace(_) => "UNKNOWN_NAMESPACE",
            ProviderError::UnknownMode(_) => "UNKNOWN_MODE",
            ProviderError::UnsupportedSessionType(_) => "UNSUPPORTED_SESSION_TYPE",
            ProviderError::UnsupportedAssociationType(_) => "UNSUPPORTED_ASSOCIATION_TYPE",
            ProviderError::InvalidExtension(_) => "INVALID_EXTENSION",
            ProviderError::MissingReturnTo => "MISSING_RETURN_TO",
            ProviderError::HandleExhausted(_) => "HANDLE_EXHAUSTED",
            ProviderError::LoginFailed(_) => "LOGIN_FAILED",
            ProviderError::Store(_) => "STORE_ERROR",
            ProviderError::ConfigError(_) => "CONFIG_ERROR",
            ProviderError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Structured protocol fields carried by this error.
    ///
    /// These are merged into the error message alongside `ns`, `mode` and
    /// `error`.
    pub fn error_params(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        if let ProviderError::UnsupportedSessionType(_) = self {
            params.insert("error-code".to_string(), "unsupported-type".to_string());
        }
        params
    }
}

/// Association store error types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// An association with the same endpoint and handle already exists
    #[error("duplicate association")]
    DuplicateHandle,

    /// Backend failure
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for association store operations.
pub type StoreResult<T> = Result<T, StoreError>;
