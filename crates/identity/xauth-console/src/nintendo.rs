//! Nintendo ID token verification.

use crate::cache::CertificateCache;
use crate::error::{CertificateError, CertificateResult};
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NintendoSettings {
    /// Environment key to issuer base URL, e.g. `lp1`
    pub environments: BTreeMap<String, String>,
    pub refresh_interval: Duration,
    pub retrieval_timeout: Duration,
    pub clock_skew: Duration,
}

impl Default for NintendoSettings {
    fn default() -> Self {
        Self {
            environments: BTreeMap::new(),
            refresh_interval: Duration::from_secs(300),
            retrieval_timeout: Duration::from_millis(5000),
            clock_skew: Duration::from_secs(10),
        }
    }
}

impl NintendoSettings {
    pub fn with_environment(mut self, key: impl Into<String>, base_url: impl Into<String>) -> Self {
        self.environments.insert(key.into(), base_url.into());
        self
    }

    /// Environment whose base URL prefixes `jku`.
    fn environment_for_jku(&self, jku: &str) -> Option<&str> {
        self.environments.iter().find_map(|(key, base)| {
            let base = base.trim_end_matches('/');
            let rest = jku.strip_prefix(base)?;
            (rest.is_empty() || rest.starts_with('/')).then_some(key.as_str())
        })
    }

    /// Environment whose base URL is exactly `issuer`.
    fn environment_for_issuer(&self, issuer: &str) -> Option<&str> {
        let issuer = issuer.trim_end_matches('/');
        self.environments
            .iter()
            .find(|(_, base)| base.trim_end_matches('/') == issuer)
            .map(|(key, _)| key.as_str())
    }
}

/// Player identity proven by a Nintendo ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NintendoIdentity {
    /// `{sub}_{environment}`
    pub user_id: String,
    pub subject: String,
    pub environment: String,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    iss: String,
    sub: String,
    iat: i64,
    exp: i64,
    #[serde(default)]
    nintendo: Option<NintendoClaim>,
}

#[derive(Debug, Deserialize)]
struct NintendoClaim {
    #[serde(default)]
    ai: Option<String>,
}

/// Verifies Nintendo ID tokens for one application.
#[derive(Clone)]
pub struct NintendoVerifier {
    cache: CertificateCache,
    settings: Arc<NintendoSettings>,
    app_id: String,
    validation: Validation,
}

impl NintendoVerifier {
    pub fn new(
        cache: CertificateCache,
        settings: Arc<NintendoSettings>,
        app_id: impl Into<String>,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            cache,
            settings,
            app_id: app_id.into(),
            validation,
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn cache(&self) -> &CertificateCache {
        &self.cache
    }

    pub async fn verify(&self, token: &str) -> CertificateResult<NintendoIdentity> {
        self.verify_at(token, chrono::Utc::now().timestamp()).await
    }

    /// Verify `token` at `now` (unix seconds).
    pub async fn verify_at(&self, token: &str, now: i64) -> CertificateResult<NintendoIdentity> {
        let token = token.trim();
        let header = decode_header(token).map_err(|_| CertificateError::InvalidToken("header"))?;
        if header.alg != Algorithm::RS256 {
            return Err(CertificateError::InvalidToken("alg"));
        }

        let (Some(jku), Some(kid)) = (header.jku, header.kid) else {
            return Err(CertificateError::InvalidKeyReference);
        };
        if self.settings.environment_for_jku(&jku).is_none() {
            debug!(jku = %jku, "Key URL outside known environments");
            return Err(CertificateError::InvalidKeyReference);
        }

        let keys = self
            .cache
            .keys_for(&jku, self.settings.retrieval_timeout)
            .await?;
        let key = keys.get(&kid).ok_or(CertificateError::InvalidKeyReference)?;

        let claims = decode::<IdTokenClaims>(token, key, &self.validation)
            .map_err(|e| {
                debug!(error = %e, "Signature check failed");
                CertificateError::InvalidToken("signature")
            })?
            .claims;

        let environment = self
            .settings
            .environment_for_issuer(&claims.iss)
            .ok_or(CertificateError::InvalidToken("iss"))?;

        let skew = self.settings.clock_skew.as_secs() as i64;
        if claims.iat > now + skew {
            return Err(CertificateError::InvalidToken("iat"));
        }
        if claims.exp < now - skew {
            return Err(CertificateError::InvalidToken("exp"));
        }

        let token_app_id = claims.nintendo.and_then(|n| n.ai).unwrap_or_default();
        if token_app_id.is_empty() || normalize_app_id(&token_app_id) != normalize_app_id(&self.app_id) {
            debug!(expected = %self.app_id, actual = %token_app_id, "Application id mismatch");
            return Err(CertificateError::InvalidToken("app id"));
        }

        Ok(NintendoIdentity {
            user_id: format!("{}_{}", claims.sub, environment),
            subject: claims.sub,
            environment: environment.to_string(),
        })
    }
}

fn normalize_app_id(app_id: &str) -> String {
    let trimmed = app_id.trim();
    let bare = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    bare.to_ascii_lowercase()
}
