//! Dispatcher error types.

use thiserror::Error;
use xauth_core::ClientAuthenticationType;

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors raised while building the provider registry.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Provider for {0} is configured more than once")]
    DuplicateProvider(ClientAuthenticationType),

    #[error("Provider {auth_type} requires the '{key}' setting")]
    MissingSetting {
        auth_type: ClientAuthenticationType,
        key: &'static str,
    },

    #[error("Provider {auth_type} is misconfigured: {reason}")]
    InvalidProvider {
        auth_type: ClientAuthenticationType,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
