// src/generator/mod.rs

pub mod keys;

use crate::clock::Clock;
use crate::error::ForwardOidcError;
use crate::model::TokenResponse;
use crate::store::PendingAuthorization;
use keys::KeyManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Lifetime of issued ID and access tokens, in seconds.
pub const TOKEN_TTL_SECONDS: u64 = 3600;

/// Claims of the ID token handed to the client.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: u64,
    pub iat: u64,
    pub email: String,
    pub name: String,
    pub preferred_username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Claims of the access token presented to `/userinfo`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub sub: String,
    pub exp: u64,
    pub iat: u64,
    pub email: String,
    pub name: String,
    pub preferred_username: String,
}

/// Issues the signed token pair for a redeemed authorization code.
#[derive(Clone)]
pub struct Generator {
    issuer: String,
    keys: Arc<KeyManager>,
    clock: Arc<dyn Clock>,
}

impl Generator {
    pub fn new(issuer: &str, keys: Arc<KeyManager>, clock: Arc<dyn Clock>) -> Self {
        Self {
            issuer: issuer.to_string(),
            keys,
            clock,
        }
    }

    /// Builds and signs the ID token and access token for `grant`.
    ///
    /// Both tokens expire one hour after issuance. The ID token is addressed to
    /// the client and echoes the nonce from the authorize request, if any.
    pub fn issue_tokens(&self, grant: &PendingAuthorization) -> Result<TokenResponse, ForwardOidcError> {
        let iat = self.clock.unix_seconds();
        let exp = iat + TOKEN_TTL_SECONDS;
        let subject = &grant.subject;

        let id_claims = IdTokenClaims {
            iss: self.issuer.clone(),
            sub: subject.user_id.clone(),
            aud: grant.client_id.clone(),
            exp,
            iat,
            email: subject.email.clone(),
            name: subject.name.clone(),
            preferred_username: subject.user_id.clone(),
            nonce: grant.nonce.clone(),
        };
        let access_claims = AccessTokenClaims {
            iss: self.issuer.clone(),
            sub: subject.user_id.clone(),
            exp,
            iat,
            email: subject.email.clone(),
            name: subject.name.clone(),
            preferred_username: subject.user_id.clone(),
        };

        let id_token = self.keys.sign(&id_claims)?;
        let access_token = self.keys.sign(&access_claims)?;
        tracing::debug!(client_id = %grant.client_id, kid = %self.keys.kid(), "Issued ID and access tokens.");

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: TOKEN_TTL_SECONDS,
            id_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::session::Identity;
    use jsonwebtoken::{decode, Algorithm, Validation};
    use std::time::{Duration, UNIX_EPOCH};

    const TEST_KEY_PEM: &str = include_str!("../../tests/fixtures/test_private_key.pem");
    const ISSUER: &str = "https://auth.example.com/oidc";

    fn grant(nonce: Option<&str>) -> PendingAuthorization {
        PendingAuthorization {
            client_id: "c1".to_string(),
            redirect_uri: "https://app.example/cb".to_string(),
            subject: Identity {
                user_id: "alice".to_string(),
                email: "alice@example.com".to_string(),
                name: "Alice".to_string(),
            },
            nonce: nonce.map(str::to_string),
        }
    }

    fn generator() -> (Generator, Arc<KeyManager>) {
        let keys = Arc::new(KeyManager::from_pem(TEST_KEY_PEM).unwrap());
        let clock = Arc::new(ManualClock::new(UNIX_EPOCH + Duration::from_secs(1_700_000_000)));
        (Generator::new(ISSUER, keys.clone(), clock), keys)
    }

    fn decode_unchecked<T: serde::de::DeserializeOwned>(token: &str, keys: &KeyManager) -> T {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        decode::<T>(token, keys.public_key(), &validation).unwrap().claims
    }

    #[test]
    fn id_token_carries_identity_audience_and_nonce() {
        let (generator, keys) = generator();
        let response = generator.issue_tokens(&grant(Some("n-123"))).unwrap();

        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.expires_in, 3600);

        let claims: IdTokenClaims = decode_unchecked(&response.id_token, &keys);
        assert_eq!(
            claims,
            IdTokenClaims {
                iss: ISSUER.to_string(),
                sub: "alice".to_string(),
                aud: "c1".to_string(),
                exp: 1_700_003_600,
                iat: 1_700_000_000,
                email: "alice@example.com".to_string(),
                name: "Alice".to_string(),
                preferred_username: "alice".to_string(),
                nonce: Some("n-123".to_string()),
            }
        );
    }

    #[test]
    fn access_token_has_no_audience_or_nonce() {
        let (generator, keys) = generator();
        let response = generator.issue_tokens(&grant(Some("n-123"))).unwrap();

        let raw: serde_json::Value = decode_unchecked(&response.access_token, &keys);
        assert!(raw.get("aud").is_none());
        assert!(raw.get("nonce").is_none());
        assert_eq!(raw["sub"], "alice");
        assert_eq!(raw["preferred_username"], "alice");
    }

    #[test]
    fn nonce_is_omitted_when_not_requested() {
        let (generator, keys) = generator();
        let response = generator.issue_tokens(&grant(None)).unwrap();

        let raw: serde_json::Value = decode_unchecked(&response.id_token, &keys);
        assert!(raw.get("nonce").is_none());
        assert_eq!(raw["aud"], "c1");
    }

    #[test]
    fn both_tokens_carry_the_published_kid() {
        let (generator, keys) = generator();
        let response = generator.issue_tokens(&grant(None)).unwrap();

        for token in [&response.id_token, &response.access_token] {
            let header = jsonwebtoken::decode_header(token).unwrap();
            assert_eq!(header.kid.as_deref(), Some(keys.kid()));
            assert_eq!(header.alg, Algorithm::RS256);
        }
    }
}
