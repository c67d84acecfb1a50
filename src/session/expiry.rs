//! Token expiry decoding
//!
//! The storefront issues JWTs. Their signature is checked by the backend on
//! every call, so the client only reads the `exp` claim to schedule the
//! expiry alarm and never validates the signature itself.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    exp: i64,
}

/// Outcome of inspecting a token's expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryCheck {
    /// `exp` is at or before `now`.
    Expired,
    /// Time left until `exp`.
    ExpiresIn(Duration),
    /// Not a JWT, or no readable `exp` claim.
    Undecodable,
}

/// Read the `exp` claim (seconds since epoch) without verifying the signature.
pub fn decode_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<ExpiryClaim>(token, &DecodingKey::from_secret(&[]), &validation).ok()?;
    DateTime::from_timestamp(data.claims.exp, 0)
}

/// Compare the token's expiry against `now`.
pub fn check_expiry(token: &str, now: DateTime<Utc>) -> ExpiryCheck {
    let Some(expires_at) = decode_expiry(token) else {
        return ExpiryCheck::Undecodable;
    };
    match (expires_at - now).to_std() {
        Ok(remaining) if !remaining.is_zero() => ExpiryCheck::ExpiresIn(remaining),
        // negative or zero
        _ => ExpiryCheck::Expired,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use proptest::prelude::*;
    use serde_json::json;

    fn token_with_claims(claims: serde_json::Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"backend-secret"),
        )
        .unwrap()
    }

    #[test]
    fn test_decodes_exp_without_the_signing_key() {
        let token = token_with_claims(json!({"sub": "42", "exp": 1_900_000_000}));
        let expires_at = decode_expiry(&token).unwrap();
        assert_eq!(expires_at.timestamp(), 1_900_000_000);
    }

    #[test]
    fn test_audience_and_issuer_claims_are_ignored() {
        let token = token_with_claims(json!({
            "exp": 1_900_000_000,
            "aud": "storefront",
            "iss": "https://api.example.com"
        }));
        assert!(decode_expiry(&token).is_some());
    }

    #[test]
    fn test_future_expiry_reports_remaining_time() {
        let now = Utc::now();
        let token = token_with_claims(json!({"exp": now.timestamp() + 120}));
        match check_expiry(&token, now) {
            ExpiryCheck::ExpiresIn(remaining) => {
                assert!(remaining <= Duration::from_secs(120));
                assert!(remaining > Duration::from_secs(118));
            }
            other => panic!("expected ExpiresIn, got {:?}", other),
        }
    }

    #[test]
    fn test_past_expiry_is_expired() {
        let now = Utc::now();
        let token = token_with_claims(json!({"exp": now.timestamp() - 1}));
        assert_eq!(check_expiry(&token, now), ExpiryCheck::Expired);
    }

    #[test]
    fn test_malformed_tokens_are_undecodable() {
        let now = Utc::now();
        let valid = token_with_claims(json!({"exp": now.timestamp() + 60}));
        let mut parts = valid.split('.');
        let header = parts.next().unwrap();

        let cases = [
            String::new(),
            "not-a-jwt".to_string(),
            "only.two".to_string(),
            format!("{}.{}", valid, "extra"),
            // payload is base64 of `hello` (not JSON)
            format!("{}.aGVsbG8.sig", header),
            // payload without an exp claim
            token_with_claims(json!({"sub": "42"})),
        ];

        for token in &cases {
            assert_eq!(
                check_expiry(token, now),
                ExpiryCheck::Undecodable,
                "token {:?}",
                token
            );
        }
    }

    proptest! {
        #[test]
        fn prop_garbage_never_panics_or_decodes(s in "\\PC{0,64}") {
            prop_assert!(decode_expiry(&s).is_none());
        }

        #[test]
        fn prop_dotted_garbage_never_decodes(
            a in "[A-Za-z0-9_-]{0,24}",
            b in "[A-Za-z0-9_-]{0,24}",
            c in "[A-Za-z0-9_-]{0,24}",
        ) {
            let token = format!("{}.{}.{}", a, b, c);
            prop_assert_eq!(check_expiry(&token, Utc::now()), ExpiryCheck::Undecodable);
        }
    }
}
