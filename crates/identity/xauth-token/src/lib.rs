//! Symmetric auth tokens.
//!
//! A token is `base64(mac || iv || ciphertext)`: the ciphertext is an
//! AES-256-CTR encrypted HS256 JWT and the mac an HMAC-SHA256 over
//! `iv || ciphertext`. Key sets are derived from shared secrets, with an
//! optional fallback set so secrets can be rotated without invalidating
//! tokens already handed out.

mod claims;
mod error;
mod keys;
mod verifier;

#[cfg(test)]
mod tests;

pub use claims::TokenClaims;
pub use error::{TokenError, TokenResult};
pub use keys::{KeyRing, KeySet};
pub use verifier::TokenVerifier;
