//! Error types for the Virtual Services Framework core library.

use thiserror::Error;

/// Core error type for virtual service operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The registry document could not be read, parsed or written.
    #[error("Registry storage error: {0}")]
    Storage(String),

    /// A descriptor's implementation reference could not be resolved or constructed.
    #[error("Cannot resolve implementation for service '{service}': {reason}")]
    Resolution { service: String, reason: String },

    /// A configured property could not be applied to a service instance.
    #[error("Property '{property}' of service '{service}' not applied: {reason}")]
    Configuration {
        service: String,
        property: String,
        reason: String,
    },

    /// The endpoint for a service could not be opened or closed.
    #[error("Transport error for service '{service}': {reason}")]
    Transport { service: String, reason: String },

    /// A lifecycle hook of a service failed.
    #[error("Service '{service}' failed during {hook}: {reason}")]
    Hook {
        service: String,
        hook: &'static str,
        reason: String,
    },

    /// An operation did not complete within its deadline.
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    /// IO operation failed.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Build a hook failure for `service`.
    pub fn hook(service: &str, hook: &'static str, reason: impl Into<String>) -> Self {
        Error::Hook {
            service: service.to_string(),
            hook,
            reason: reason.into(),
        }
    }

    /// Build a transport failure for `service`.
    pub fn transport(service: &str, reason: impl Into<String>) -> Self {
        Error::Transport {
            service: service.to_string(),
            reason: reason.into(),
        }
    }

    /// Build a timeout error for the named operation.
    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            seconds: timeout.as_secs(),
        }
    }
}

/// Result type alias using the core Error type.
pub type Result<T> = std::result::Result<T, Error>;
