//! Unified error type for the CongoMuv gate.
//!
//! Each module keeps its own error enum ([`RouteError`], [`SessionError`],
//! [`ConfigError`]); [`GateError`] folds them into one type that carries an
//! HTTP status and a machine-readable code for API responses.
//!
//! # Example
//!
//! ```rust
//! use congomuv_core::error::{GateError, Result};
//! use congomuv_core::route::RoutePath;
//!
//! fn parse(raw: &str) -> Result<RoutePath> {
//!     Ok(RoutePath::parse(raw)?)
//! }
//!
//! assert!(parse("#/operator").is_ok());
//! let long = format!("#/{}", "a".repeat(600));
//! assert_eq!(parse(&long).unwrap_err().error_code(), "INVALID_ROUTE");
//! ```

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigError;
use crate::route::RouteError;
use crate::session::SessionError;

/// The unified error type for gate operations.
#[derive(Debug, Error)]
pub enum GateError {
    // =========================================================================
    // ROUTING ERRORS
    // =========================================================================
    /// A hash path could not be parsed.
    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    /// No mounted client has this id.
    #[error("Client not found: {0}")]
    ClientNotFound(Uuid),

    // =========================================================================
    // SESSION ERRORS
    // =========================================================================
    /// The session token is unknown, expired or revoked.
    #[error("Session is invalid or has been signed out. Sign in again.")]
    InvalidSession,

    /// The session is valid but the backend has no profile for it.
    #[error("No profile found for user {0}")]
    ProfileNotFound(String),

    /// The auth backend failed.
    #[error("Auth backend unavailable: {0}")]
    AuthBackend(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration could not be parsed or serialized.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE ERRORS
    // =========================================================================
    /// Reading or writing a file failed.
    #[error("Persistence error: {0}")]
    PersistenceError(String),
}

/// A specialized [`Result`] type for gate operations.
pub type Result<T> = std::result::Result<T, GateError>;

impl GateError {
    /// Returns `true` for routing failures.
    #[inline]
    #[must_use]
    pub const fn is_route_error(&self) -> bool {
        matches!(self, Self::InvalidRoute(_) | Self::ClientNotFound(_))
    }

    /// Returns `true` for session and auth backend failures.
    #[inline]
    #[must_use]
    pub const fn is_session_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSession | Self::ProfileNotFound(_) | Self::AuthBackend(_)
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if reading or writing a file failed.
    #[inline]
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(self, Self::PersistenceError(_))
    }

    /// Returns `true` if retrying later may succeed.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::AuthBackend(_))
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidRoute(_) => 400,
            Self::InvalidSession => 401,
            Self::ClientNotFound(_) | Self::ProfileNotFound(_) | Self::ConfigNotFound(_) => 404,
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,
            Self::PersistenceError(_) => 500,
            Self::AuthBackend(_) => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRoute(_) => "INVALID_ROUTE",
            Self::ClientNotFound(_) => "CLIENT_NOT_FOUND",
            Self::InvalidSession => "INVALID_SESSION",
            Self::ProfileNotFound(_) => "PROFILE_NOT_FOUND",
            Self::AuthBackend(_) => "AUTH_BACKEND_ERROR",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<RouteError> for GateError {
    fn from(err: RouteError) -> Self {
        Self::InvalidRoute(err.to_string())
    }
}

impl From<SessionError> for GateError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidSession => Self::InvalidSession,
            SessionError::ProfileNotFound { user_id } => Self::ProfileNotFound(user_id),
            SessionError::Backend { message } => Self::AuthBackend(message),
        }
    }
}

impl From<ConfigError> for GateError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path.into()),
            ConfigError::Load(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::Serialize(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::Write { path, source } => {
                Self::PersistenceError(format!("Failed to write {path}: {source}"))
            }
            ConfigError::Validation { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::route::RoutePath;

    #[test]
    fn test_route_error_classification() {
        assert!(GateError::InvalidRoute("x".into()).is_route_error());
        assert!(GateError::ClientNotFound(Uuid::nil()).is_route_error());
        assert!(!GateError::InvalidSession.is_route_error());
    }

    #[test]
    fn test_session_error_classification() {
        assert!(GateError::InvalidSession.is_session_error());
        assert!(GateError::ProfileNotFound("u1".into()).is_session_error());
        assert!(GateError::AuthBackend("timeout".into()).is_session_error());
        assert!(!GateError::ConfigNotFound(PathBuf::new()).is_session_error());
    }

    #[test]
    fn test_config_and_io_classification() {
        assert!(GateError::ConfigParseError("bad".into()).is_config_error());
        assert!(GateError::ConfigValidationError("bad".into()).is_config_error());
        assert!(GateError::PersistenceError("disk".into()).is_io_error());
        assert!(!GateError::InvalidSession.is_io_error());
    }

    #[test]
    fn test_recoverable() {
        assert!(GateError::AuthBackend("timeout".into()).is_recoverable());
        assert!(!GateError::InvalidSession.is_recoverable());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(GateError::InvalidRoute("x".into()).http_status_code(), 400);
        assert_eq!(GateError::InvalidSession.http_status_code(), 401);
        assert_eq!(GateError::ClientNotFound(Uuid::nil()).http_status_code(), 404);
        assert_eq!(GateError::ConfigValidationError("x".into()).http_status_code(), 422);
        assert_eq!(GateError::PersistenceError("x".into()).http_status_code(), 500);
        assert_eq!(GateError::AuthBackend("x".into()).http_status_code(), 503);
    }

    #[test]
    fn test_from_route_error() {
        let long = format!("#/{}", "a".repeat(600));
        let err: GateError = RoutePath::parse(&long).unwrap_err().into();
        assert_eq!(err.error_code(), "INVALID_ROUTE");
        assert!(err.to_string().contains("maximum is 512"));
    }

    #[test]
    fn test_from_session_error() {
        let err: GateError = SessionError::ProfileNotFound {
            user_id: "u-42".into(),
        }
        .into();
        assert!(matches!(err, GateError::ProfileNotFound(ref id) if id == "u-42"));

        let err: GateError = SessionError::Backend {
            message: "503".into(),
        }
        .into();
        assert_eq!(err.error_code(), "AUTH_BACKEND_ERROR");
    }

    #[test]
    fn test_from_config_error() {
        let err: GateError = ConfigError::Validation {
            field: "idle.warn_duration_secs".into(),
            message: "too long".into(),
        }
        .into();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("idle.warn_duration_secs: too long"));

        let err: GateError = ConfigError::NotFound("/etc/congomuv.toml".into()).into();
        assert_eq!(err.http_status_code(), 404);
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<GateError>();
        assert_sync::<GateError>();
    }
}
