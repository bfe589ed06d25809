// Bearer token verification
// Decision: HS256 only; a token signed with any other algorithm is rejected
// Decision: Claims are returned exactly as decoded, no claim schema is enforced
// beyond `exp`, which must be a non-negative integer timestamp when present

use std::collections::HashSet;

use jsonwebtoken::{decode, get_current_timestamp, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::AuthError;
use crate::config::ConfigError;

/// The only accepted authorization scheme (compared case-insensitively)
pub const BEARER_SCHEME: &str = "bearer";

/// Decoded token payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// The `sub` claim, when it is a string
    pub fn subject(&self) -> Option<&str> {
        self.0.get("sub").and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Verifies the value of an `Authorization` header.
///
/// Implementations must be free of side effects: the same verifier is shared
/// by every in-flight request.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, header_value: Option<&str>) -> Result<Claims, AuthError>;
}

/// Split `"<scheme> <credential>"` and return the credential of a bearer header.
pub fn bearer_credential(header_value: &str) -> Result<&str, AuthError> {
    let mut parts = header_value.split_whitespace();
    let (scheme, credential) = match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(credential), None) => (scheme, credential),
        _ => return Err(AuthError::MalformedHeader),
    };

    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return Err(AuthError::UnsupportedScheme);
    }

    Ok(credential)
}

/// HS256 JWT verifier bound to a shared secret
#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

impl JwtVerifier {
    /// An empty secret is refused so the gateway can never run with open verification.
    pub fn new(secret: &[u8]) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::EmptySecret("JWT_SECRET"));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // `exp` is checked when present but not required
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.validate_aud = false;

        Ok(Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        })
    }

    /// Decode and validate a compact JWS credential
    pub fn decode_credential(&self, credential: &str) -> Result<Claims, AuthError> {
        let claims =
            decode::<Map<String, Value>>(credential, &self.decoding_key, &self.validation)
                .map(|data| Claims(data.claims))
                .map_err(|e| {
                    tracing::debug!(error = %e, "JWT validation failed");
                    AuthError::InvalidOrExpiredToken
                })?;

        check_expiry(&claims)?;
        Ok(claims)
    }
}

/// jsonwebtoken skips its own `exp` check when the claim is not a `u64`,
/// so negative, fractional and string values are refused here.
fn check_expiry(claims: &Claims) -> Result<(), AuthError> {
    let Some(exp) = claims.get("exp") else {
        return Ok(());
    };

    match exp.as_u64() {
        Some(exp) if exp >= get_current_timestamp() => Ok(()),
        _ => {
            tracing::debug!(exp = %exp, "JWT exp is expired or not an integer timestamp");
            Err(AuthError::InvalidOrExpiredToken)
        }
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, header_value: Option<&str>) -> Result<Claims, AuthError> {
        let header_value = header_value.ok_or(AuthError::MissingCredential)?;
        let credential = bearer_credential(header_value)?;
        self.decode_credential(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &[u8] = b"test-secret-key-for-testing";

    fn sign(claims: &Value, secret: &[u8]) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret),
        )
        .unwrap()
    }

    fn verifier() -> JwtVerifier {
        JwtVerifier::new(SECRET).unwrap()
    }

    #[test]
    fn test_empty_secret_is_refused() {
        let err = JwtVerifier::new(b"").unwrap_err();
        assert!(matches!(err, ConfigError::EmptySecret("JWT_SECRET")));
    }

    #[test]
    fn test_missing_header() {
        assert_eq!(
            verifier().verify(None).unwrap_err(),
            AuthError::MissingCredential
        );
    }

    #[test]
    fn test_malformed_headers() {
        let v = verifier();
        for header in ["", "   ", "Bearer", "token-only", "Bearer a b", "Bearer a b c"] {
            assert_eq!(
                v.verify(Some(header)).unwrap_err(),
                AuthError::MalformedHeader,
                "header {header:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_unsupported_scheme() {
        let v = verifier();
        for header in ["Basic abc", "Token abc", "Bearerx abc", "Digest abc"] {
            assert_eq!(
                v.verify(Some(header)).unwrap_err(),
                AuthError::UnsupportedScheme,
                "header {header:?} should have an unsupported scheme"
            );
        }
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        for header in ["Bearer tok", "BEARER tok", "bearer tok", "bEaReR tok"] {
            assert_eq!(bearer_credential(header).unwrap(), "tok");
        }
    }

    #[test]
    fn test_round_trip_returns_original_claims() {
        let claims = json!({
            "sub": "u1",
            "roles": ["reader", "writer"],
            "exp": Utc::now().timestamp() + 3600,
            "nested": {"tenant": 7}
        });
        let token = sign(&claims, SECRET);

        let decoded = verifier()
            .verify(Some(&format!("Bearer {token}")))
            .unwrap();

        assert_eq!(Value::Object(decoded.into_inner()), claims);
    }

    #[test]
    fn test_token_without_exp_is_accepted() {
        let token = sign(&json!({"sub": "u1"}), SECRET);
        let claims = verifier().verify(Some(&format!("bearer {token}"))).unwrap();
        assert_eq!(claims.subject(), Some("u1"));
    }

    #[test]
    fn test_token_with_audience_is_accepted() {
        let token = sign(&json!({"sub": "u1", "aud": "some-api"}), SECRET);
        let claims = verifier().verify(Some(&format!("Bearer {token}"))).unwrap();
        assert_eq!(claims.get("aud"), Some(&json!("some-api")));
    }

    #[test]
    fn test_wrong_secret() {
        let token = sign(&json!({"sub": "u1"}), b"another-secret");
        assert_eq!(
            verifier()
                .verify(Some(&format!("Bearer {token}")))
                .unwrap_err(),
            AuthError::InvalidOrExpiredToken
        );
    }

    #[test]
    fn test_expired_token() {
        let token = sign(
            &json!({"sub": "u1", "exp": Utc::now().timestamp() - 30}),
            SECRET,
        );
        assert_eq!(
            verifier()
                .verify(Some(&format!("Bearer {token}")))
                .unwrap_err(),
            AuthError::InvalidOrExpiredToken
        );
    }

    #[test]
    fn test_exp_must_be_non_negative_integer() {
        let v = verifier();
        let future = Utc::now().timestamp() + 3600;
        for exp in [
            json!(-5),
            json!("1000"),
            json!(1000.5),
            json!(future.to_string()),
            json!(future as f64 + 0.5),
            json!(null),
        ] {
            let token = sign(&json!({"sub": "u1", "exp": exp}), SECRET);
            assert_eq!(
                v.verify(Some(&format!("Bearer {token}"))).unwrap_err(),
                AuthError::InvalidOrExpiredToken,
                "exp {exp} should be rejected"
            );
        }
    }

    #[test]
    fn test_integer_exp_in_future_is_accepted() {
        let exp = Utc::now().timestamp() + 60;
        let token = sign(&json!({"sub": "u1", "exp": exp}), SECRET);
        let claims = verifier().verify(Some(&format!("Bearer {token}"))).unwrap();
        assert_eq!(claims.get("exp"), Some(&json!(exp)));
    }

    #[test]
    fn test_other_algorithm_is_rejected() {
        let token = encode(
            &Header::new(Algorithm::HS512),
            &json!({"sub": "u1"}),
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        assert_eq!(
            verifier()
                .verify(Some(&format!("Bearer {token}")))
                .unwrap_err(),
            AuthError::InvalidOrExpiredToken
        );
    }

    #[test]
    fn test_garbage_credential() {
        let v = verifier();
        for credential in ["invalid-token", "a.b.c", "a.b", "...."] {
            assert_eq!(
                v.verify(Some(&format!("Bearer {credential}"))).unwrap_err(),
                AuthError::InvalidOrExpiredToken
            );
        }
    }

    #[test]
    fn test_tampered_payload() {
        let token = sign(&json!({"sub": "u1"}), SECRET);
        let forged_payload = sign(&json!({"sub": "admin"}), SECRET);

        // Splice the payload of one token onto the signature of another
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = forged_payload.split('.').nth(1).unwrap();
        let spliced = parts.join(".");

        assert_eq!(
            verifier()
                .verify(Some(&format!("Bearer {spliced}")))
                .unwrap_err(),
            AuthError::InvalidOrExpiredToken
        );
    }
}
