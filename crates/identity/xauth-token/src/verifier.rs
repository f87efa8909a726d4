use crate::claims::TokenClaims;
use crate::error::{TokenError, TokenResult};
use crate::keys::{KeyRing, KeySet};
use aes::Aes256;
use base64::{Engine, engine::general_purpose::STANDARD};
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

const MAC_LEN: usize = 32;
const IV_LEN: usize = 16;

/// Seals and opens symmetric auth tokens.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    keys: KeyRing,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(keys: KeyRing) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked by hand, after the app id.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self { keys, validation }
    }

    pub fn keys(&self) -> &KeyRing {
        &self.keys
    }

    /// Produce a token for `claims` with the primary key set.
    pub fn seal(&self, claims: &TokenClaims) -> TokenResult<String> {
        let keys = self.keys.primary();

        let jwt = encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(&keys.signature_key),
        )
        .map_err(|e| TokenError::Encoding(e.to_string()))?;

        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let mut ciphertext = jwt.into_bytes();
        apply_keystream(keys, &iv, &mut ciphertext)?;
        let mac = compute_mac(&keys.hash_key, &iv, &ciphertext)?;

        let mut blob = Vec::with_capacity(MAC_LEN + IV_LEN + ciphertext.len());
        blob.extend_from_slice(&mac);
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(blob))
    }

    /// Open `token` and check it against the current time.
    pub fn verify(&self, token: &str, expected_app_id: Option<&str>) -> TokenResult<TokenClaims> {
        self.verify_at(token, expected_app_id, chrono::Utc::now().timestamp())
    }

    /// Open `token`; `now` is unix seconds.
    ///
    /// With `expected_app_id` set, the token's app id claim must match it.
    pub fn verify_at(
        &self,
        token: &str,
        expected_app_id: Option<&str>,
        now: i64,
    ) -> TokenResult<TokenClaims> {
        let blob = STANDARD
            .decode(token.trim())
            .map_err(|_| invalid("base64"))?;
        if blob.len() <= MAC_LEN + IV_LEN {
            return Err(invalid("length"));
        }

        let (mac, rest) = blob.split_at(MAC_LEN);
        let (iv, ciphertext) = rest.split_at(IV_LEN);

        let keys = self
            .keys
            .iter()
            .find(|keys| mac_matches(&keys.hash_key, iv, ciphertext, mac))
            .ok_or_else(|| invalid("mac"))?;

        let mut plaintext = ciphertext.to_vec();
        apply_keystream(keys, iv, &mut plaintext).map_err(|_| invalid("decrypt"))?;
        let jwt = String::from_utf8(plaintext).map_err(|_| invalid("utf8"))?;

        let claims = self
            .keys
            .iter()
            .find_map(|keys| {
                decode::<TokenClaims>(
                    &jwt,
                    &DecodingKey::from_secret(&keys.signature_key),
                    &self.validation,
                )
                .ok()
            })
            .map(|data| data.claims)
            .ok_or_else(|| invalid("signature"))?;

        if let Some(expected) = expected_app_id {
            if claims.app_id != expected {
                return Err(invalid("app id"));
            }
        }

        if now > claims.exp {
            debug!(user_id = %claims.user_id, exp = claims.exp, "Token expired");
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

fn invalid(step: &'static str) -> TokenError {
    debug!(step, "Token rejected");
    TokenError::Invalid(step)
}

fn apply_keystream(keys: &KeySet, iv: &[u8], data: &mut [u8]) -> TokenResult<()> {
    let mut cipher = Aes256Ctr::new_from_slices(&keys.encryption_key, iv)
        .map_err(|e| TokenError::InvalidKey(e.to_string()))?;
    cipher.apply_keystream(data);
    Ok(())
}

fn compute_mac(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> TokenResult<Vec<u8>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| TokenError::InvalidKey(e.to_string()))?;
    mac.update(iv);
    mac.update(ciphertext);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn mac_matches(key: &[u8], iv: &[u8], ciphertext: &[u8], tag: &[u8]) -> bool {
    match <HmacSha256 as Mac>::new_from_slice(key) {
        Ok(mut mac) => {
            mac.update(iv);
            mac.update(ciphertext);
            mac.verify_slice(tag).is_ok()
        }
        Err(_) => false,
    }
}
