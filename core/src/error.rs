//! Error taxonomy shared by the client API and all plugins

use std::time::Duration;
use thiserror::Error;

/// Result type alias for polaris operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Closed set of return codes crossing the client API boundary.
///
/// Every outcome of a provider call collapses onto one of these codes for
/// stat reporting and for the retry decision: only [`ReturnCode::NetworkFailed`]
/// and [`ReturnCode::ServerError`] are retryable, everything else is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    /// Success
    Ok,
    /// Unclassified failure
    UnknownError,
    /// Request validation failed; no RPC was attempted
    InvalidArgument,
    /// Configuration rejected at load time
    InvalidConfig,
    /// Plugin lookup or registration failed
    PluginError,
    /// Budget exhausted before any success
    Timeout,
    /// Operation not valid in the current lifecycle state
    InvalidState,
    /// Transport fault; retryable
    NetworkFailed,
    /// Server-side transient fault; retryable
    ServerError,
    /// The named instance does not exist on the control plane
    InstanceNotFound,
    /// Idempotent duplicate of an existing resource
    ExistedResource,
    /// Token rejected by the control plane
    Unauthorized,
    /// Control plane throttled the request
    RateLimit,
}

impl ReturnCode {
    /// Whether the provider pipeline may retry after this code
    pub fn is_retryable(self) -> bool {
        matches!(self, ReturnCode::NetworkFailed | ReturnCode::ServerError)
    }

    /// Stable label used as a metric dimension
    pub fn as_str(self) -> &'static str {
        match self {
            ReturnCode::Ok => "ok",
            ReturnCode::UnknownError => "unknown_error",
            ReturnCode::InvalidArgument => "invalid_argument",
            ReturnCode::InvalidConfig => "invalid_config",
            ReturnCode::PluginError => "plugin_error",
            ReturnCode::Timeout => "timeout",
            ReturnCode::InvalidState => "invalid_state",
            ReturnCode::NetworkFailed => "network_failed",
            ReturnCode::ServerError => "server_error",
            ReturnCode::InstanceNotFound => "instance_not_found",
            ReturnCode::ExistedResource => "existed_resource",
            ReturnCode::Unauthorized => "unauthorized",
            ReturnCode::RateLimit => "rate_limit",
        }
    }
}

/// Error type for client and plugin operations
///
/// Variants mirror the [`ReturnCode`] taxonomy with human-readable context.
/// The provider pipeline uses [`ClientError::is_retryable`] to decide whether
/// an attempt may be repeated within the caller's timeout budget.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Request validation failed before any network traffic
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be parsed or violated an invariant
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Plugin lookup, registration, or construction failed
    #[error("plugin error: {0}")]
    Plugin(String),

    /// Transport-level fault talking to the control plane; retryable
    #[error("network failed: {0}")]
    NetworkFailed(String),

    /// Control plane reported a transient server fault; retryable
    #[error("server error: {0}")]
    ServerError(String),

    /// The per-call budget elapsed without a terminal answer
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Operation attempted against a torn-down or unstarted component
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The named instance does not exist on the control plane
    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    /// Idempotent duplicate (e.g. re-adding a registered handler)
    #[error("resource already exists: {0}")]
    ExistedResource(String),

    /// The control plane rejected the service token
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The control plane throttled the request
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// Unclassified failure passed through from a connector
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl ClientError {
    /// Collapse onto the closed [`ReturnCode`] taxonomy
    pub fn code(&self) -> ReturnCode {
        match self {
            ClientError::InvalidArgument(_) => ReturnCode::InvalidArgument,
            ClientError::InvalidConfig(_) => ReturnCode::InvalidConfig,
            ClientError::Plugin(_) => ReturnCode::PluginError,
            ClientError::NetworkFailed(_) => ReturnCode::NetworkFailed,
            ClientError::ServerError(_) => ReturnCode::ServerError,
            ClientError::Timeout(_) => ReturnCode::Timeout,
            ClientError::InvalidState(_) => ReturnCode::InvalidState,
            ClientError::InstanceNotFound(_) => ReturnCode::InstanceNotFound,
            ClientError::ExistedResource(_) => ReturnCode::ExistedResource,
            ClientError::Unauthorized(_) => ReturnCode::Unauthorized,
            ClientError::RateLimit(_) => ReturnCode::RateLimit,
            ClientError::Unknown(_) => ReturnCode::UnknownError,
        }
    }

    /// Whether the provider pipeline may retry after this error
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_and_server_codes_are_retryable() {
        assert!(ReturnCode::NetworkFailed.is_retryable());
        assert!(ReturnCode::ServerError.is_retryable());

        for code in [
            ReturnCode::Ok,
            ReturnCode::UnknownError,
            ReturnCode::InvalidArgument,
            ReturnCode::InvalidConfig,
            ReturnCode::PluginError,
            ReturnCode::Timeout,
            ReturnCode::InvalidState,
            ReturnCode::InstanceNotFound,
            ReturnCode::ExistedResource,
            ReturnCode::Unauthorized,
            ReturnCode::RateLimit,
        ] {
            assert!(!code.is_retryable(), "{code:?} must be terminal");
        }
    }

    #[test]
    fn error_maps_onto_matching_code() {
        assert_eq!(
            ClientError::NetworkFailed("refused".into()).code(),
            ReturnCode::NetworkFailed
        );
        assert_eq!(
            ClientError::InvalidArgument("empty token".into()).code(),
            ReturnCode::InvalidArgument
        );
        assert_eq!(
            ClientError::Timeout(Duration::from_millis(500)).code(),
            ReturnCode::Timeout
        );
    }

    #[test]
    fn retryable_delegates_to_code() {
        assert!(ClientError::ServerError("overloaded".into()).is_retryable());
        assert!(!ClientError::Unauthorized("bad token".into()).is_retryable());
    }

    #[test]
    fn display_includes_context() {
        let err = ClientError::NetworkFailed("connection refused".to_string());
        assert_eq!(err.to_string(), "network failed: connection refused");

        let err = ClientError::InvalidConfig("maxRetryTimes must be >= 1".to_string());
        assert_eq!(
            err.to_string(),
            "invalid config: maxRetryTimes must be >= 1"
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ClientError>();
    }
}
