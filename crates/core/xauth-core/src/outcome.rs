//! Terminal results of an authentication attempt.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result code reported by a provider request queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueResultCode {
    Success,
    Error,
    RequestTimeout,
    QueueFull,
    QueueTimeout,
    Offline,
}

impl fmt::Display for QueueResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueueResultCode::Success => "Success",
            QueueResultCode::Error => "Error",
            QueueResultCode::RequestTimeout => "RequestTimeout",
            QueueResultCode::QueueFull => "QueueFull",
            QueueResultCode::QueueTimeout => "QueueTimeout",
            QueueResultCode::Offline => "Offline",
        };
        f.write_str(s)
    }
}

/// Why an attempt was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The provider answered and rejected the credentials
    CustomAuthenticationFailed,
    /// No provider registered for the requested type
    NotSupported,
    UnsupportedPostData,
    MissingParameter,
    /// The provider could not be reached
    Transport(QueueResultCode),
    AuthTokenInvalid,
    AuthTokenExpired,
    CertificateTimeout,
    InternalServerError,
}

/// Identity accepted by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatedPlayer {
    pub user_id: String,
    pub nickname: Option<String>,
    /// Opaque data the provider wants carried in the session token
    pub auth_cookie: Option<serde_json::Value>,
    /// Unix seconds
    pub expire_at: Option<i64>,
}

impl AuthenticatedPlayer {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            nickname: None,
            auth_cookie: None,
            expire_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result")]
pub enum AuthOutcome {
    Ok(AuthenticatedPlayer),
    /// Authentication is not complete yet; the data goes back to the client
    OkWithData { data: serde_json::Value },
    Failed { kind: FailureKind, message: String },
    ParameterInvalid { message: String },
}

impl AuthOutcome {
    pub fn ok(user_id: impl Into<String>) -> Self {
        AuthOutcome::Ok(AuthenticatedPlayer::new(user_id))
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        AuthOutcome::Failed {
            kind,
            message: message.into(),
        }
    }

    pub fn parameter_invalid(message: impl Into<String>) -> Self {
        AuthOutcome::ParameterInvalid {
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, AuthOutcome::Ok(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            AuthOutcome::Failed { .. } | AuthOutcome::ParameterInvalid { .. }
        )
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            AuthOutcome::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn player(&self) -> Option<&AuthenticatedPlayer> {
        match self {
            AuthOutcome::Ok(player) => Some(player),
            _ => None,
        }
    }
}
