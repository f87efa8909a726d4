use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identity provider a client credential targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClientAuthenticationType {
    /// Studio-operated login service reached over HTTP
    Custom,
    Steam,
    Facebook,
    Oculus,
    PlayStation,
    Xbox,
    Viveport,
    /// Nintendo ID token verified against the platform JWKS
    Nintendo,
    /// Symmetric token bound to an application id
    PlayerIo,
    /// Symmetric token without application binding
    Jwt,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown authentication type: {0}")]
pub struct ParseAuthTypeError(pub String);

impl ClientAuthenticationType {
    pub const ALL: [ClientAuthenticationType; 10] = [
        ClientAuthenticationType::Custom,
        ClientAuthenticationType::Steam,
        ClientAuthenticationType::Facebook,
        ClientAuthenticationType::Oculus,
        ClientAuthenticationType::PlayStation,
        ClientAuthenticationType::Xbox,
        ClientAuthenticationType::Viveport,
        ClientAuthenticationType::Nintendo,
        ClientAuthenticationType::PlayerIo,
        ClientAuthenticationType::Jwt,
    ];

    /// Wire code sent by clients.
    pub fn code(self) -> u8 {
        match self {
            ClientAuthenticationType::Custom => 0,
            ClientAuthenticationType::Steam => 1,
            ClientAuthenticationType::Facebook => 2,
            ClientAuthenticationType::Oculus => 3,
            ClientAuthenticationType::PlayStation => 4,
            ClientAuthenticationType::Xbox => 5,
            ClientAuthenticationType::Viveport => 10,
            ClientAuthenticationType::Nintendo => 11,
            ClientAuthenticationType::PlayerIo => 12,
            ClientAuthenticationType::Jwt => 13,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClientAuthenticationType::Custom => "Custom",
            ClientAuthenticationType::Steam => "Steam",
            ClientAuthenticationType::Facebook => "Facebook",
            ClientAuthenticationType::Oculus => "Oculus",
            ClientAuthenticationType::PlayStation => "PlayStation",
            ClientAuthenticationType::Xbox => "Xbox",
            ClientAuthenticationType::Viveport => "Viveport",
            ClientAuthenticationType::Nintendo => "Nintendo",
            ClientAuthenticationType::PlayerIo => "PlayerIo",
            ClientAuthenticationType::Jwt => "Jwt",
        }
    }
}

impl fmt::Display for ClientAuthenticationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientAuthenticationType {
    type Err = ParseAuthTypeError;

    /// Accepts the variant name (case-insensitive) or the numeric wire code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<u8>() {
            return Self::from_code(code).ok_or_else(|| ParseAuthTypeError(s.to_string()));
        }

        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseAuthTypeError(s.to_string()))
    }
}
