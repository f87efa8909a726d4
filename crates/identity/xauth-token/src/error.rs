use thiserror::Error;

pub type TokenResult<T> = Result<T, TokenError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The step that rejected the token is kept for server-side logs only.
    #[error("Token invalid")]
    Invalid(&'static str),

    #[error("Token expired")]
    Expired,

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Token encoding failed: {0}")]
    Encoding(String),
}
