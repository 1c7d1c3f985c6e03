//! Server-issued, single-use authorization codes.
//!
//! ## Storage Backends
//!
//! - **Redis** (multi-instance): `SET NX EX` guarantees at most one issuance
//!   per code hash and `DEL` reports whether this caller removed the key, which
//!   makes redemption single-use under concurrent attempts.
//! - **Memory** (single instance and tests): same semantics behind a lock,
//!   with expiry read from the injected clock.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::pkce::CodeVerifier;
use super::state::Action;
use crate::models::{PrincipalId, UserId};
use crate::{Clock, Error, Result};

const AUTHORIZATION_CODE_PREFIX: &str = "authorization-code:";
/// Code lifetime in seconds
pub const AUTHORIZATION_CODE_TTL_SECS: u64 = 300;
/// Code length in bytes (256 bits of entropy)
const CODE_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionCreateReason {
    Signup,
    Login,
}

/// Code record, stored as JSON under `authorization-code:<code_hash>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkygearAuthorizationCode {
    pub code_hash: String,
    pub action: Action,
    pub code_challenge: String,
    pub user_id: UserId,
    pub principal_id: PrincipalId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_create_reason: Option<SessionCreateReason>,
}

/// Plain code handed to the client
#[must_use]
pub fn generate_authorization_code() -> String {
    let mut bytes = [0u8; CODE_LENGTH];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Only this hash is ever stored
#[must_use]
pub fn hash_authorization_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    json: String,
    expires_at: DateTime<Utc>,
}

#[derive(Clone)]
enum Backend {
    Redis {
        client: redis::Client,
        key_prefix: String,
    },
    Memory(Arc<RwLock<HashMap<String, MemoryEntry>>>),
}

#[derive(Clone)]
pub struct AuthorizationCodeStore {
    backend: Backend,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AuthorizationCodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.backend {
            Backend::Redis { .. } => "redis",
            Backend::Memory(_) => "memory",
        };
        f.debug_struct("AuthorizationCodeStore")
            .field("mode", &mode)
            .finish_non_exhaustive()
    }
}

impl AuthorizationCodeStore {
    /// Redis backed store. `key_prefix` namespaces keys per tenant.
    #[must_use]
    pub fn with_redis(client: redis::Client, key_prefix: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend: Backend::Redis {
                client,
                key_prefix: key_prefix.into(),
            },
            clock,
        }
    }

    /// In-memory store, only correct for a single instance.
    #[must_use]
    pub fn with_memory(clock: Arc<dyn Clock>) -> Self {
        warn!(
            "Authorization code store using in-memory storage. \
             This is only suitable for single-instance deployments."
        );
        Self {
            backend: Backend::Memory(Arc::new(RwLock::new(HashMap::new()))),
            clock,
        }
    }

    fn key(code_hash: &str) -> String {
        format!("{AUTHORIZATION_CODE_PREFIX}{code_hash}")
    }

    fn redis_key(key_prefix: &str, key: &str) -> String {
        format!("{key_prefix}{key}")
    }

    /// `SET key json NX EX ttl`; replies nil when the key already exists
    fn set_nx_cmd(key: &str, json: &str) -> redis::Cmd {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(json).arg("NX").arg("EX").arg(AUTHORIZATION_CODE_TTL_SECS);
        cmd
    }

    fn check_set_nx_reply(reply: Option<String>) -> Result<()> {
        match reply {
            Some(_) => Ok(()),
            None => Err(Error::DuplicatedCode),
        }
    }

    /// Store a new code. Fails with [`Error::DuplicatedCode`] instead of
    /// overwriting an existing one.
    pub async fn set(&self, code: &SkygearAuthorizationCode) -> Result<()> {
        let key = Self::key(&code.code_hash);
        let json = serde_json::to_string(code)?;

        match &self.backend {
            Backend::Redis { client, key_prefix } => {
                let mut conn = client.get_multiplexed_async_connection().await?;
                let reply: Option<String> = Self::set_nx_cmd(&Self::redis_key(key_prefix, &key), &json)
                    .query_async(&mut conn)
                    .await?;
                Self::check_set_nx_reply(reply)?;
            }
            Backend::Memory(store) => {
                let now = self.clock.now_utc();
                let mut store = store.write().await;
                store.retain(|_, entry| entry.expires_at > now);
                if store.contains_key(&key) {
                    return Err(Error::DuplicatedCode);
                }
                let ttl = Duration::seconds(AUTHORIZATION_CODE_TTL_SECS as i64);
                store.insert(
                    key,
                    MemoryEntry {
                        json,
                        expires_at: now + ttl,
                    },
                );
            }
        }

        debug!(
            user_id = %code.user_id,
            action = code.action.as_str(),
            "authorization code issued"
        );
        Ok(())
    }

    pub async fn get(&self, code_hash: &str) -> Result<SkygearAuthorizationCode> {
        let key = Self::key(code_hash);

        let json: Option<String> = match &self.backend {
            Backend::Redis { client, key_prefix } => {
                let mut conn = client.get_multiplexed_async_connection().await?;
                redis::cmd("GET")
                    .arg(Self::redis_key(key_prefix, &key))
                    .query_async(&mut conn)
                    .await?
            }
            Backend::Memory(store) => {
                let now = self.clock.now_utc();
                let store = store.read().await;
                store
                    .get(&key)
                    .filter(|entry| entry.expires_at > now)
                    .map(|entry| entry.json.clone())
            }
        };

        let json = json.ok_or(Error::CodeNotFound)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Idempotent. Returns whether this call removed the code.
    pub async fn delete(&self, code_hash: &str) -> Result<bool> {
        let key = Self::key(code_hash);

        match &self.backend {
            Backend::Redis { client, key_prefix } => {
                let mut conn = client.get_multiplexed_async_connection().await?;
                let removed: i64 = redis::cmd("DEL")
                    .arg(Self::redis_key(key_prefix, &key))
                    .query_async(&mut conn)
                    .await?;
                Ok(removed > 0)
            }
            Backend::Memory(store) => {
                let now = self.clock.now_utc();
                let mut store = store.write().await;
                Ok(store
                    .remove(&key)
                    .is_some_and(|entry| entry.expires_at > now))
            }
        }
    }

    /// Redeem a plain code with its PKCE verifier.
    ///
    /// Only the caller whose delete actually removes the key wins; every other
    /// attempt, concurrent or later, gets [`Error::CodeNotFound`]. A failed
    /// PKCE check leaves the code in place.
    pub async fn redeem(&self, code: &str, verifier: &CodeVerifier) -> Result<SkygearAuthorizationCode> {
        let code_hash = hash_authorization_code(code);
        let stored = self.get(&code_hash).await?;

        if !verifier.verify(&stored.code_challenge) {
            return Err(Error::sso_invalid_params("invalid code verifier"));
        }

        if !self.delete(&code_hash).await? {
            return Err(Error::CodeNotFound);
        }

        debug!(user_id = %stored.user_id, "authorization code redeemed");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{fixed_clock, sample_code};

    #[test]
    fn test_generate_and_hash() {
        let a = generate_authorization_code();
        let b = generate_authorization_code();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert_eq!(hash_authorization_code(&a).len(), 64);
        assert_eq!(hash_authorization_code(&a), hash_authorization_code(&a));
    }

    #[test]
    fn test_key_format() {
        assert_eq!(
            AuthorizationCodeStore::key("abc"),
            "authorization-code:abc"
        );
        assert_eq!(
            AuthorizationCodeStore::redis_key("tenant-a:", &AuthorizationCodeStore::key("abc")),
            "tenant-a:authorization-code:abc"
        );
    }

    fn resp(args: &[&str]) -> Vec<u8> {
        let mut out = format!("*{}\r\n", args.len());
        for arg in args {
            out.push_str(&format!("${}\r\n{arg}\r\n", arg.len()));
        }
        out.into_bytes()
    }

    #[test]
    fn test_set_nx_command() {
        let cmd = AuthorizationCodeStore::set_nx_cmd("p:authorization-code:abc", "{}");
        assert_eq!(
            cmd.get_packed_command(),
            resp(&["SET", "p:authorization-code:abc", "{}", "NX", "EX", "300"])
        );
    }

    #[test]
    fn test_set_nx_reply() {
        assert!(AuthorizationCodeStore::check_set_nx_reply(Some("OK".to_string())).is_ok());
        assert!(matches!(
            AuthorizationCodeStore::check_set_nx_reply(None),
            Err(Error::DuplicatedCode)
        ));
    }

    fn redis_store() -> AuthorizationCodeStore {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let prefix = format!("skyauth-test-{}:", generate_authorization_code());
        AuthorizationCodeStore::with_redis(redis::Client::open(url).unwrap(), prefix, fixed_clock())
    }

    #[tokio::test]
    #[ignore = "Requires Redis server"]
    async fn test_redis_set_never_overwrites() {
        let store = redis_store();
        let code = sample_code("hash-1", "first");
        store.set(&code).await.unwrap();

        let err = store.set(&sample_code("hash-1", "second")).await.unwrap_err();
        assert!(matches!(err, Error::DuplicatedCode));
        assert_eq!(store.get("hash-1").await.unwrap(), code);

        assert!(store.delete("hash-1").await.unwrap());
        assert!(!store.delete("hash-1").await.unwrap());
    }

    #[tokio::test]
    #[ignore = "Requires Redis server"]
    async fn test_redis_concurrent_redeem_single_use() {
        let store = redis_store();
        let verifier = CodeVerifier::generate_s256();
        let code = generate_authorization_code();
        store
            .set(&sample_code(&hash_authorization_code(&code), &verifier.challenge()))
            .await
            .unwrap();

        let attempts = (0..8).map(|_| {
            let store = store.clone();
            let verifier = verifier.clone();
            let code = code.clone();
            async move { store.redeem(&code, &verifier).await }
        });
        let results = futures::future::join_all(attempts).await;
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, Error::CodeNotFound)));
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = AuthorizationCodeStore::with_memory(fixed_clock());
        let code = sample_code("hash-1", "challenge");

        store.set(&code).await.unwrap();
        assert_eq!(store.get("hash-1").await.unwrap(), code);

        assert!(store.delete("hash-1").await.unwrap());
        assert!(!store.delete("hash-1").await.unwrap());
        assert!(matches!(store.get("hash-1").await, Err(Error::CodeNotFound)));
    }

    #[tokio::test]
    async fn test_set_never_overwrites() {
        let store = AuthorizationCodeStore::with_memory(fixed_clock());
        store.set(&sample_code("hash-1", "first")).await.unwrap();

        let err = store.set(&sample_code("hash-1", "second")).await.unwrap_err();
        assert!(matches!(err, Error::DuplicatedCode));
        assert_eq!(store.get("hash-1").await.unwrap().code_challenge, "first");
    }

    #[tokio::test]
    async fn test_concurrent_set_exactly_one_wins() {
        let store = AuthorizationCodeStore::with_memory(fixed_clock());
        let attempts = (0..8).map(|i| {
            let store = store.clone();
            async move { store.set(&sample_code("hash-1", &format!("c{i}"))).await }
        });

        let results = futures::future::join_all(attempts).await;
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, Error::DuplicatedCode)));
    }

    #[tokio::test]
    async fn test_code_expires() {
        let clock = fixed_clock();
        let store = AuthorizationCodeStore::with_memory(clock.clone());
        store.set(&sample_code("hash-1", "c")).await.unwrap();

        clock.advance(Duration::seconds(AUTHORIZATION_CODE_TTL_SECS as i64));
        assert!(matches!(store.get("hash-1").await, Err(Error::CodeNotFound)));

        // An expired code can be issued again.
        store.set(&sample_code("hash-1", "c")).await.unwrap();
    }

    #[tokio::test]
    async fn test_redeem_twice_fails() {
        let store = AuthorizationCodeStore::with_memory(fixed_clock());
        let verifier = CodeVerifier::generate_s256();
        let code = generate_authorization_code();
        store
            .set(&sample_code(&hash_authorization_code(&code), &verifier.challenge()))
            .await
            .unwrap();

        let redeemed = store.redeem(&code, &verifier).await.unwrap();
        assert_eq!(redeemed.code_hash, hash_authorization_code(&code));

        assert!(matches!(
            store.redeem(&code, &verifier).await,
            Err(Error::CodeNotFound)
        ));
    }

    #[tokio::test]
    async fn test_redeem_with_wrong_verifier_keeps_code() {
        let store = AuthorizationCodeStore::with_memory(fixed_clock());
        let verifier = CodeVerifier::generate_s256();
        let code = generate_authorization_code();
        store
            .set(&sample_code(&hash_authorization_code(&code), &verifier.challenge()))
            .await
            .unwrap();

        let err = store
            .redeem(&code, &CodeVerifier::generate_s256())
            .await
            .unwrap_err();
        assert!(err.sso_cause().is_some());
        assert!(store.redeem(&code, &verifier).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_redeem_single_use() {
        let store = AuthorizationCodeStore::with_memory(fixed_clock());
        let verifier = CodeVerifier::generate_s256();
        let code = generate_authorization_code();
        store
            .set(&sample_code(&hash_authorization_code(&code), &verifier.challenge()))
            .await
            .unwrap();

        let attempts = (0..8).map(|_| {
            let store = store.clone();
            let verifier = verifier.clone();
            let code = code.clone();
            async move { store.redeem(&code, &verifier).await }
        });
        let results = futures::future::join_all(attempts).await;
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    }
}
