use thiserror::Error;

pub type CertificateResult<T> = Result<T, CertificateError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CertificateError {
    #[error("Certificate retrieval timeout")]
    RetrievalTimeout,

    /// Unknown key URL or key id
    #[error("Token invalid (jku/kid)")]
    InvalidKeyReference,

    #[error("Token invalid ({0})")]
    InvalidToken(&'static str),

    #[error("Certificate fetch failed: {0}")]
    Fetch(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for CertificateError {
    fn from(err: reqwest::Error) -> Self {
        CertificateError::Fetch(err.to_string())
    }
}
