//! Nintendo ID token verification.
//!
//! Signing keys are published as JWKS documents. The [`CertificateCache`]
//! keeps one entry per key URL (`jku`), refreshed in the background, and lets
//! any number of requests wait on the first fetch without issuing duplicates.

mod cache;
mod error;
mod fetcher;
mod nintendo;


pub use cache::{CertificateCache, KeyMap, KeySnapshot};
pub use error::{CertificateError, CertificateResult};
pub use fetcher::{HttpJwksFetcher, JwksFetcher};
pub use nintendo::{NintendoIdentity, NintendoSettings, NintendoVerifier};

pub use jsonwebtoken::jwk::JwkSet;
