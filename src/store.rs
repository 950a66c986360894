// src/store.rs

use crate::clock::Clock;
use crate::session::Identity;
use base64::engine::{general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Random bytes per code (256 bits).
const CODE_BYTES: usize = 32;

/// What an authorization code stands for until it is redeemed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAuthorization {
    pub client_id: String,
    pub redirect_uri: String,
    pub subject: Identity,
    pub nonce: Option<String>,
}

#[derive(Debug)]
struct StoredCode {
    data: PendingAuthorization,
    expires_at: SystemTime,
}

/// Short-lived, single-use authorization codes.
///
/// A code can be retrieved at most once: the first lookup removes it whether
/// it is still valid or already expired. Entries that are never looked up stay
/// in memory until [`purge_expired`](Self::purge_expired) runs or the process exits.
pub struct AuthorizationCodeStore {
    codes: Mutex<HashMap<String, StoredCode>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl AuthorizationCodeStore {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            codes: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    // The map only holds plain data and every critical section leaves it
    // consistent, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, StoredCode>> {
        self.codes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn generate_code() -> String {
        let mut bytes = [0u8; CODE_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Mints a new code for `data`, valid for the configured TTL.
    pub fn store(&self, data: PendingAuthorization) -> String {
        let code = Self::generate_code();
        let expires_at = self.clock.now() + self.ttl;
        self.lock().insert(code.clone(), StoredCode { data, expires_at });
        code
    }

    /// Redeems a code. Unknown and expired codes both yield `None`; in every
    /// case the code is unusable afterwards.
    pub fn retrieve(&self, code: &str) -> Option<PendingAuthorization> {
        let entry = self.lock().remove(code);
        let Some(entry) = entry else {
            debug!("Authorization code not found.");
            return None;
        };
        if self.clock.now() > entry.expires_at {
            debug!(client_id = %entry.data.client_id, "Authorization code expired.");
            return None;
        }
        Some(entry.data)
    }

    /// Drops every expired code and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut codes = self.lock();
        let before = codes.len();
        codes.retain(|_, entry| now <= entry.expires_at);
        before - codes.len()
    }

    /// Number of codes currently held, expired or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Spawns a task that calls [`purge_expired`](Self::purge_expired) every `interval`.
    pub fn start_sweep_task(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = self.purge_expired();
                if removed > 0 {
                    debug!(count = removed, "Swept expired authorization codes.");
                }
            }
        })
    }
}

impl std::fmt::Debug for AuthorizationCodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationCodeStore")
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::thread;

    fn pending(client_id: &str) -> PendingAuthorization {
        PendingAuthorization {
            client_id: client_id.to_string(),
            redirect_uri: "https://app.example/cb".to_string(),
            subject: Identity {
                user_id: "alice".to_string(),
                email: "alice@example.com".to_string(),
                name: "Alice".to_string(),
            },
            nonce: Some("n-0S6_WzA2Mj".to_string()),
        }
    }

    fn store_with_clock() -> (AuthorizationCodeStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let store = AuthorizationCodeStore::new(Duration::from_secs(60), clock.clone());
        (store, clock)
    }

    #[test]
    fn code_is_redeemable_exactly_once() {
        let (store, _clock) = store_with_clock();
        let code = store.store(pending("c1"));

        assert_eq!(store.retrieve(&code), Some(pending("c1")));
        assert_eq!(store.retrieve(&code), None);
        assert_eq!(store.retrieve(&code), None);
        assert!(store.is_empty());
    }

    #[test]
    fn codes_carry_at_least_128_bits() {
        let (store, _clock) = store_with_clock();
        let a = store.store(pending("c1"));
        let b = store.store(pending("c1"));

        assert_ne!(a, b);
        let decoded = URL_SAFE_NO_PAD.decode(&a).unwrap();
        assert_eq!(decoded.len(), CODE_BYTES);
    }

    #[test]
    fn expired_code_is_rejected_and_removed() {
        let (store, clock) = store_with_clock();
        let code = store.store(pending("c1"));

        clock.advance(Duration::from_secs(61));
        assert_eq!(store.retrieve(&code), None);
        assert!(store.is_empty());

        // Still not found, not "expired" again.
        assert_eq!(store.retrieve(&code), None);
    }

    #[test]
    fn code_is_valid_up_to_its_expiry() {
        let (store, clock) = store_with_clock();
        let code = store.store(pending("c1"));

        clock.advance(Duration::from_secs(60));
        assert!(store.retrieve(&code).is_some());
    }

    #[test]
    fn unknown_code_is_not_found() {
        let (store, _clock) = store_with_clock();
        store.store(pending("c1"));
        assert_eq!(store.retrieve("not-a-code"), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unredeemed_codes_stay_until_purged() {
        let (store, clock) = store_with_clock();
        store.store(pending("c1"));
        store.store(pending("c2"));

        clock.advance(Duration::from_secs(30));
        let fresh = store.store(pending("c3"));

        clock.advance(Duration::from_secs(31));
        assert_eq!(store.len(), 3);
        assert_eq!(store.purge_expired(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.retrieve(&fresh).is_some());
    }

    #[test]
    fn concurrent_redemption_succeeds_once() {
        let (store, _clock) = store_with_clock();
        let store = Arc::new(store);
        let code = store.store(pending("c1"));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let code = code.clone();
                thread::spawn(move || store.retrieve(&code).is_some())
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn sweep_task_purges_in_background() {
        let (store, clock) = store_with_clock();
        let store = Arc::new(store);
        store.store(pending("c1"));
        clock.advance(Duration::from_secs(120));

        let handle = Arc::clone(&store).start_sweep_task(Duration::from_millis(10));
        for _ in 0..100 {
            if store.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert!(store.is_empty());
    }
}
