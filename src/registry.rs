// src/registry.rs

use crate::config::ClientConfig;
use crate::error::ForwardOidcError;
use std::collections::{HashMap, HashSet};
use subtle::ConstantTimeEq;

/// A client application allowed to run the authorization-code flow.
#[derive(Debug, Clone)]
pub struct RegisteredClient {
    pub id: String,
    secret: String,
    redirect_uris: HashSet<String>,
}

impl RegisteredClient {
    /// Exact-match comparison of the presented secret, in constant time.
    pub fn secret_matches(&self, presented: &str) -> bool {
        self.secret.as_bytes().ct_eq(presented.as_bytes()).into()
    }

    /// Exact string equality against the registered list. No normalisation of
    /// scheme, host or trailing slash, no prefix or wildcard matching.
    pub fn validate_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.contains(uri)
    }
}

/// Immutable lookup table of registered clients, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, RegisteredClient>,
}

impl ClientRegistry {
    /// Builds the registry. A client id that appears twice is a configuration error.
    pub fn from_config(clients: &[ClientConfig]) -> Result<Self, ForwardOidcError> {
        let mut map = HashMap::with_capacity(clients.len());
        for client in clients {
            let registered = RegisteredClient {
                id: client.id.clone(),
                secret: client.secret.clone(),
                redirect_uris: client.redirect_uris.iter().cloned().collect(),
            };
            if map.insert(client.id.clone(), registered).is_some() {
                return Err(ForwardOidcError::DuplicateClient(client.id.clone()));
            }
        }
        tracing::debug!(count = map.len(), "Client registry built.");
        Ok(Self { clients: map })
    }

    pub fn find_client(&self, id: &str) -> Option<&RegisteredClient> {
        self.clients.get(id)
    }

    /// Looks up a client and checks its secret. `None` for an unknown id or a wrong secret.
    pub fn authenticate(&self, id: &str, secret: &str) -> Option<&RegisteredClient> {
        self.find_client(id).filter(|c| c.secret_matches(secret))
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(id: &str, secret: &str, uris: &[&str]) -> ClientConfig {
        ClientConfig {
            id: id.to_string(),
            secret: secret.to_string(),
            redirect_uris: uris.iter().map(|u| u.to_string()).collect(),
        }
    }

    #[test]
    fn redirect_uri_match_is_exact() {
        let registry = ClientRegistry::from_config(&[client("c1", "s1", &["https://app/cb"])]).unwrap();
        let c1 = registry.find_client("c1").unwrap();

        assert!(c1.validate_redirect_uri("https://app/cb"));
        assert!(!c1.validate_redirect_uri("https://app/cb/"));
        assert!(!c1.validate_redirect_uri("https://APP/cb"));
        assert!(!c1.validate_redirect_uri("https://app/cb?x=1"));
        assert!(!c1.validate_redirect_uri("https://app/"));
    }

    #[test]
    fn duplicate_client_ids_are_rejected() {
        let result = ClientRegistry::from_config(&[
            client("c1", "s1", &["https://a/cb"]),
            client("c1", "other", &["https://b/cb"]),
        ]);
        assert!(matches!(result, Err(ForwardOidcError::DuplicateClient(id)) if id == "c1"));
    }

    #[test]
    fn authenticate_requires_exact_secret() {
        let registry = ClientRegistry::from_config(&[client("c1", "s1", &[])]).unwrap();

        assert!(registry.authenticate("c1", "s1").is_some());
        assert!(registry.authenticate("c1", "s").is_none());
        assert!(registry.authenticate("c1", "s1 ").is_none());
        assert!(registry.authenticate("c2", "s1").is_none());
        assert!(registry.find_client("missing").is_none());
        assert_eq!(registry.len(), 1);
    }
}
