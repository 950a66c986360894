// src/validator.rs

use crate::error::ForwardOidcError;
use crate::generator::keys::KeyManager;
use crate::generator::AccessTokenClaims;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Verifies bearer tokens issued by this provider.
///
/// There is no server-side token store: a token is valid when its RS256
/// signature checks out against the current signing key, it names this issuer
/// and it has not expired.
#[derive(Clone)]
pub struct Validator {
    issuer: String,
    keys: Arc<KeyManager>,
}

impl Validator {
    pub fn new(issuer: &str, keys: Arc<KeyManager>) -> Self {
        Self {
            issuer: issuer.to_string(),
            keys,
        }
    }

    /// Validates an access token and returns its claims.
    #[instrument(skip(self, token), err)]
    pub fn validate(&self, token: &str) -> Result<AccessTokenClaims, ForwardOidcError> {
        // 1. Only RS256 is ever issued; reject anything else before touching the signature.
        let header = decode_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(ForwardOidcError::JwtValidation(ErrorKind::InvalidAlgorithm.into()));
        }
        if let Some(kid) = header.kid.as_deref() {
            if kid != self.keys.kid() {
                debug!(kid = %kid, "Token was signed with a key that is no longer published.");
            }
        }

        // 2. Signature, expiry and issuer.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        // A token is expired the second after its `exp`.
        validation.leeway = 0;
        // Access tokens have no audience; ID tokens presented here are accepted on signature alone.
        validation.validate_aud = false;

        let data = decode::<AccessTokenClaims>(token, self.keys.public_key(), &validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::TOKEN_TTL_SECONDS;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    const TEST_KEY_PEM: &str = include_str!("../tests/fixtures/test_private_key.pem");
    const ISSUER: &str = "https://auth.example.com/oidc";

    fn keys() -> Arc<KeyManager> {
        Arc::new(KeyManager::from_pem(TEST_KEY_PEM).unwrap())
    }

    fn now() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
    }

    fn claims(iss: &str, exp: u64) -> AccessTokenClaims {
        AccessTokenClaims {
            iss: iss.to_string(),
            sub: "alice".to_string(),
            exp,
            iat: now(),
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            preferred_username: "alice".to_string(),
        }
    }

    #[test]
    fn valid_token_yields_claims() {
        let keys = keys();
        let token = keys.sign(&claims(ISSUER, now() + TOKEN_TTL_SECONDS)).unwrap();

        let validated = Validator::new(ISSUER, keys).validate(&token).unwrap();
        assert_eq!(validated.sub, "alice");
        assert_eq!(validated.email, "alice@example.com");
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let keys = keys();
        let token = keys.sign(&claims(ISSUER, now() + TOKEN_TTL_SECONDS)).unwrap();

        let mut tampered = token[..token.len() - 1].to_string();
        tampered.push(if token.ends_with('A') { 'B' } else { 'A' });
        assert!(Validator::new(ISSUER, keys).validate(&tampered).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = keys();
        let token = keys.sign(&claims(ISSUER, now() - 3600)).unwrap();
        assert!(Validator::new(ISSUER, keys).validate(&token).is_err());
    }

    #[test]
    fn token_just_past_expiry_is_rejected() {
        let keys = keys();
        let token = keys.sign(&claims(ISSUER, now() - 5)).unwrap();
        let result = Validator::new(ISSUER, keys).validate(&token);
        assert!(matches!(result, Err(ForwardOidcError::JwtValidation(e)) if *e.kind() == ErrorKind::ExpiredSignature));
    }

    #[test]
    fn foreign_issuer_is_rejected() {
        let keys = keys();
        let token = keys.sign(&claims("https://evil.example.com", now() + 60)).unwrap();
        assert!(Validator::new(ISSUER, keys).validate(&token).is_err());
    }

    #[test]
    fn symmetric_algorithm_is_rejected() {
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims(ISSUER, now() + 60),
            &EncodingKey::from_secret(b"shared"),
        )
        .unwrap();
        let result = Validator::new(ISSUER, keys()).validate(&token);
        assert!(matches!(result, Err(ForwardOidcError::JwtValidation(e)) if *e.kind() == ErrorKind::InvalidAlgorithm));
    }

    #[test]
    fn garbage_is_rejected() {
        let validator = Validator::new(ISSUER, keys());
        assert!(validator.validate("").is_err());
        assert!(validator.validate("not.a.jwt").is_err());
    }
}
