//! Unified error types for skein-bot.
//!
//! Each layer has its own error enum: transport connections, services and
//! configuration. All of them convert into the top-level [`BotError`].

use std::fmt;

// ============================================================================
// Main Error Type
// ============================================================================

/// The main error type for skein-bot operations.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Service error.
    #[error("service: {0}")]
    Service(#[from] ServiceError),

    /// Configuration error.
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    /// Serialization error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal error.
    #[error("{0}")]
    Internal(String),
}

impl BotError {
    /// Create a config error from a string.
    #[inline]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(ConfigError::Invalid(msg.into()))
    }

    /// Create an internal error.
    #[inline]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<TransportError> for BotError {
    fn from(err: TransportError) -> Self {
        Self::Service(ServiceError::Transport(err))
    }
}

/// Result type alias for skein-bot operations.
pub type Result<T> = std::result::Result<T, BotError>;

// ============================================================================
// Service Errors
// ============================================================================

/// An optional capability a transport may lack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Removing a previously sent message.
    DeleteMessage,
    /// Advertising a "now playing" status.
    SetPlaying,
    /// Showing a typing indicator.
    Typing,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DeleteMessage => "deleting messages",
            Self::SetPlaying => "set playing",
            Self::Typing => "typing",
        };
        f.write_str(name)
    }
}

/// Error type for service operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The transport has no primitive for this capability.
    #[error("{capability} not supported on {service}")]
    Unsupported {
        /// Service name.
        service: &'static str,
        /// Missing capability.
        capability: Capability,
    },

    /// The service has not been opened yet.
    #[error("service not open")]
    NotOpen,

    /// `open` was called on a service that is already open.
    #[error("service already open")]
    AlreadyOpen,

    /// The service configuration cannot be used.
    #[error("config: {0}")]
    Config(String),

    /// The underlying connection rejected the action.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
}

impl ServiceError {
    /// Create an unsupported capability error.
    #[inline]
    pub const fn unsupported(service: &'static str, capability: Capability) -> Self {
        Self::Unsupported {
            service,
            capability,
        }
    }

    /// Create a configuration error.
    #[inline]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error only signals a missing capability.
    ///
    /// Dispatchers treat these as a recoverable no-op and may tell the user
    /// that the action is not available on this transport.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

// ============================================================================
// Transport Errors
// ============================================================================

/// Error type for the wire connection beneath a service.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No live socket to write to.
    #[error("not connected")]
    NotConnected,

    /// Dialing the server failed.
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// A command parameter would break line framing.
    #[error("invalid parameter: {0:?}")]
    InvalidParam(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

// ============================================================================
// Configuration Errors
// ============================================================================

/// Error type for configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("parse: {0}")]
    Parse(#[from] serde_json::Error),

    /// Missing required field.
    #[error("missing: {0}")]
    Missing(String),

    /// Invalid value.
    #[error("invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create a missing field error.
    #[inline]
    pub fn missing(field: impl Into<String>) -> Self {
        Self::Missing(field.into())
    }

    /// Create an invalid value error.
    #[inline]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ============================================================================
// Error Context Extension
// ============================================================================

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<BotError>> ErrorContext<T> for std::result::Result<T, E> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            BotError::Internal(format!("{}: {}", msg.into(), err))
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
