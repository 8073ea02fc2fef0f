//! JWKS fetch + cache, with single-flight refresh on an unknown `kid`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};

/// One RSA signing key from a JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonWebKey {
    pub(crate) kid: String,
    pub(crate) n: String,
    pub(crate) e: String,
}

impl JsonWebKey {
    /// Build a key from its RSA modulus/exponent components (base64url, no
    /// padding), as found in a JWKS document. Exposed so embedders can
    /// supply a [`JwksSource`] backed by something other than HTTP (e.g. a
    /// fixed key for tests, or a key pinned out-of-band).
    #[must_use]
    pub fn new(kid: impl Into<String>, n: impl Into<String>, e: impl Into<String>) -> Self {
        Self {
            kid: kid.into(),
            n: n.into(),
            e: e.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<JsonWebKey>,
}

/// Where a [`JwksCache`] fetches fresh key material from. Abstracted so
/// tests can supply a fixed set of keys without a network call.
#[async_trait]
pub trait JwksSource: Send + Sync {
    /// Fetch the current JWKS document.
    async fn fetch(&self) -> Result<Vec<JsonWebKey>, String>;
}

/// Fetches a JWKS document over HTTP. Only available with the `jwks-http`
/// feature, which pulls in `reqwest`.
#[cfg(feature = "jwks-http")]
pub struct HttpJwksSource {
    url: String,
    client: reqwest::Client,
}

#[cfg(feature = "jwks-http")]
impl HttpJwksSource {
    /// Build a source that fetches from `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[cfg(feature = "jwks-http")]
#[async_trait]
impl JwksSource for HttpJwksSource {
    async fn fetch(&self) -> Result<Vec<JsonWebKey>, String> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let doc: JwksDocument = resp.json().await.map_err(|e| e.to_string())?;
        Ok(doc.keys)
    }
}

struct Cached {
    keys_by_kid: HashMap<String, JsonWebKey>,
    fetched_at: Instant,
}

/// TTL-cached JWKS, refreshed in full on expiry or on a lookup miss for an
/// unrecognized `kid` (key rotation). Refresh is single-flight: concurrent
/// misses during a refresh share one fetch rather than stampeding the
/// source.
pub struct JwksCache {
    source: Arc<dyn JwksSource>,
    ttl: Duration,
    cached: RwLock<Option<Cached>>,
    refresh_lock: Mutex<()>,
}

impl JwksCache {
    /// Build a cache over `source` with the given TTL.
    #[must_use]
    pub fn new(source: Arc<dyn JwksSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cached: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Look up the key for `kid`, refreshing if the cache is stale or the
    /// `kid` is unknown. Returns `Ok(None)` if the `kid` is still unknown
    /// after a refresh (signature will be rejected as `BadSignature`).
    pub async fn key_for(&self, kid: &str) -> Result<Option<JsonWebKey>, String> {
        if let Some(key) = self.try_cached(kid).await {
            return Ok(Some(key));
        }
        self.refresh().await?;
        Ok(self.try_cached(kid).await)
    }

    async fn try_cached(&self, kid: &str) -> Option<JsonWebKey> {
        let guard = self.cached.read().await;
        let cached = guard.as_ref()?;
        if cached.fetched_at.elapsed() >= self.ttl {
            return None;
        }
        cached.keys_by_kid.get(kid).cloned()
    }

    async fn refresh(&self) -> Result<(), String> {
        let _permit = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited for the lock.
        {
            let guard = self.cached.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(());
                }
            }
        }

        let keys = self.source.fetch().await?;
        let keys_by_kid = keys.into_iter().map(|k| (k.kid.clone(), k)).collect();
        *self.cached.write().await = Some(Cached {
            keys_by_kid,
            fetched_at: Instant::now(),
        });
        Ok(())
    }
}
