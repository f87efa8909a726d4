use super::*;
use base64::{Engine, engine::general_purpose::STANDARD};

const NOW: i64 = 1_700_000_000;

fn claims(app_id: &str, user_id: &str) -> TokenClaims {
    TokenClaims {
        app_id: app_id.to_string(),
        user_id: user_id.to_string(),
        nickname: None,
        auth_cookie: None,
        exp: NOW + 3600,
        iat: NOW,
        nbf: Some(NOW),
    }
}

fn verifier(secret: &str) -> TokenVerifier {
    TokenVerifier::new(KeyRing::from_secrets(secret, None).unwrap())
}

#[test]
fn test_seal_and_verify_round_trip() {
    let verifier = verifier("hash;encryption;signature");
    let claims = claims("game-1", "player-7")
        .with_nickname("Seven")
        .with_auth_cookie(&serde_json::json!({"level": 3}))
        .unwrap();

    let token = verifier.seal(&claims).unwrap();
    let opened = verifier.verify_at(&token, Some("game-1"), NOW).unwrap();

    assert_eq!(opened, claims);
    assert_eq!(
        opened.auth_cookie_value(),
        Some(serde_json::json!({"level": 3}))
    );
}

#[test]
fn test_tokens_are_not_deterministic() {
    let verifier = verifier("secret");
    let claims = claims("game-1", "player-7");

    assert_ne!(verifier.seal(&claims).unwrap(), verifier.seal(&claims).unwrap());
}

#[test]
fn test_tampered_ciphertext_is_rejected() {
    let verifier = verifier("secret");
    let token = verifier.seal(&claims("game-1", "player-7")).unwrap();

    let mut blob = STANDARD.decode(&token).unwrap();
    let last = blob.len() - 1;
    blob[last] ^= 0x01;
    let tampered = STANDARD.encode(blob);

    let err = verifier.verify_at(&tampered, None, NOW).unwrap_err();
    assert_eq!(err, TokenError::Invalid("mac"));
    assert_eq!(err.to_string(), "Token invalid");
}

#[test]
fn test_garbage_is_rejected() {
    let verifier = verifier("secret");

    assert_eq!(
        verifier.verify_at("not base64!", None, NOW),
        Err(TokenError::Invalid("base64"))
    );
    assert_eq!(
        verifier.verify_at(&STANDARD.encode([0u8; 40]), None, NOW),
        Err(TokenError::Invalid("length"))
    );
}

#[test]
fn test_fallback_keys_are_accepted() {
    let old = verifier("old-secret");
    let token = old.seal(&claims("game-1", "player-7")).unwrap();

    let rotated = TokenVerifier::new(KeyRing::from_secrets("new-secret", Some("old-secret")).unwrap());
    let opened = rotated.verify_at(&token, None, NOW).unwrap();
    assert_eq!(opened.user_id, "player-7");

    let strict = verifier("new-secret");
    assert_eq!(
        strict.verify_at(&token, None, NOW),
        Err(TokenError::Invalid("mac"))
    );
}

#[test]
fn test_wrong_signature_key_is_rejected() {
    let signer = verifier("hash;encryption;signer");
    let token = signer.seal(&claims("game-1", "player-7")).unwrap();

    // same envelope keys, different signature key
    let other = verifier("hash;encryption;other");
    assert_eq!(
        other.verify_at(&token, None, NOW),
        Err(TokenError::Invalid("signature"))
    );
}

#[test]
fn test_expired_token() {
    let verifier = verifier("secret");
    let token = verifier.seal(&claims("game-1", "player-7")).unwrap();

    assert!(verifier.verify_at(&token, None, NOW + 3600).is_ok());
    assert_eq!(
        verifier.verify_at(&token, None, NOW + 3601),
        Err(TokenError::Expired)
    );
}

#[test]
fn test_app_id_must_match() {
    let verifier = verifier("secret");
    let token = verifier.seal(&claims("game-1", "player-7")).unwrap();

    assert_eq!(
        verifier.verify_at(&token, Some("game-2"), NOW),
        Err(TokenError::Invalid("app id"))
    );
    assert!(verifier.verify_at(&token, None, NOW).is_ok());
}

#[test]
fn test_verify_uses_current_time() {
    let verifier = verifier("secret");
    let fresh = TokenClaims::new("game-1", "player-7", chrono::Duration::minutes(5));
    let token = verifier.seal(&fresh).unwrap();

    assert_eq!(verifier.verify(&token, Some("game-1")).unwrap(), fresh);
}

#[test]
fn test_secret_components() {
    let single = KeySet::from_secret("a").unwrap();
    assert_eq!(single.hash_key, single.encryption_key);
    assert_eq!(single.hash_key, single.signature_key);

    let pair = KeySet::from_secret("a;b").unwrap();
    assert_eq!(pair.hash_key, single.hash_key);
    assert_ne!(pair.encryption_key, pair.hash_key);
    assert_eq!(pair.signature_key, pair.hash_key);

    let triple = KeySet::from_secret("a;b;c").unwrap();
    assert_eq!(triple.encryption_key, pair.encryption_key);
    assert_ne!(triple.signature_key, triple.hash_key);

    assert!(matches!(
        KeySet::from_secret("a;b;c;d"),
        Err(TokenError::InvalidKey(_))
    ));
    assert!(matches!(
        KeySet::from_secret("a;;c"),
        Err(TokenError::InvalidKey(_))
    ));
}

#[test]
fn test_key_set_debug_is_redacted() {
    let keys = KeySet::from_secret("super-secret").unwrap();
    assert_eq!(format!("{keys:?}"), "KeySet([redacted])");
}

#[test]
fn test_auth_cookie_must_be_object() {
    let mut claims = claims("game-1", "player-7");
    claims.auth_cookie = Some("[1,2]".to_string());
    assert_eq!(claims.auth_cookie_value(), None);

    claims.auth_cookie = Some("not json".to_string());
    assert_eq!(claims.auth_cookie_value(), None);
}
