use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use common::{Now, SystemNow};
use jsonwebtoken::DecodingKey;
use oauth::HttpClient;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::{config::SigningKeyCacheConfig, error::Error};

/// JSON Web Key Set published by Apple.
#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

/// A single JSON Web Key.
#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    /// RSA modulus
    n: Option<String>,
    /// RSA exponent
    e: Option<String>,
    /// EC coordinates
    x: Option<String>,
    y: Option<String>,
}

impl Jwk {
    fn decoding_key(&self) -> Result<DecodingKey, String> {
        match (self.kty.as_str(), &self.n, &self.e, &self.x, &self.y) {
            ("RSA", Some(n), Some(e), _, _) => {
                DecodingKey::from_rsa_components(n, e).map_err(|e| e.to_string())
            }
            ("EC", _, _, Some(x), Some(y)) => {
                DecodingKey::from_ec_components(x, y).map_err(|e| e.to_string())
            }
            (kty, ..) => Err(format!("unsupported key type {kty}")),
        }
    }
}

/// Public key used to verify identity tokens.
#[derive(Clone)]
pub struct SigningKey {
    pub kid: String,
    pub decoding_key: DecodingKey,
    pub fetched_at: DateTime<Utc>,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("fetched_at", &self.fetched_at)
            .finish_non_exhaustive()
    }
}

struct CachedKey {
    key: SigningKey,
    seq: u64,
}

#[derive(Default)]
struct RefreshGate {
    last_refresh: Option<DateTime<Utc>>,
    next_seq: u64,
}

/// Cache of Apple's signing keys, keyed by key id.
///
/// Lookups share a read lock. Misses serialize behind a single refresh
/// gate, so concurrent misses trigger at most one upstream fetch, and a
/// refresh happens at most once per [`SigningKeyCacheConfig::refresh_interval`].
pub struct SigningKeyCache<H, N = SystemNow> {
    http: H,
    now: N,
    config: SigningKeyCacheConfig,
    entries: RwLock<HashMap<String, CachedKey>>,
    refresh: Mutex<RefreshGate>,
}

impl<H: HttpClient> SigningKeyCache<H> {
    pub fn new(http: H, config: SigningKeyCacheConfig) -> Self {
        Self::with_clock(http, config, SystemNow)
    }
}

impl<H: HttpClient, N: Now> SigningKeyCache<H, N> {
    pub fn with_clock(http: H, config: SigningKeyCacheConfig, now: N) -> Self {
        Self {
            http,
            now,
            config,
            entries: RwLock::new(HashMap::new()),
            refresh: Mutex::new(RefreshGate::default()),
        }
    }

    /// Endpoint the key set is fetched from.
    #[must_use]
    pub fn jwks_url(&self) -> &str {
        &self.config.jwks_url
    }

    /// Returns the key with id `kid`, refreshing the key set on a miss.
    ///
    /// # Errors
    /// - [`Error::UnknownSigningKey`] if the key set has no such key, or a
    ///   refresh was suppressed by the rate limit
    /// - [`Error::KeySourceUnavailable`] if the key set cannot be fetched
    #[instrument(skip_all, fields(kid = %kid), err)]
    pub async fn get_signing_key(&self, kid: &str) -> Result<SigningKey, Error> {
        if let Some(key) = self.lookup(kid).await {
            debug!("signing key cache hit");
            return Ok(key);
        }

        let mut gate = self.refresh.lock().await;

        // Another task may have refreshed while we waited for the gate.
        if let Some(key) = self.lookup(kid).await {
            debug!("signing key cache hit after refresh");
            return Ok(key);
        }

        let now = self.now.now();
        if let Some(last_refresh) = gate.last_refresh {
            let interval = to_delta(self.config.refresh_interval);
            if now - last_refresh < interval {
                warn!(%last_refresh, "signing key refresh suppressed by rate limit");
                return Err(Error::UnknownSigningKey(kid.to_string()));
            }
        }

        let keys = self.fetch().await?;
        gate.last_refresh = Some(now);
        info!(keys = keys.len(), "refreshed signing keys");

        let (requested, others): (Vec<_>, Vec<_>) =
            keys.into_iter().partition(|(key_id, _)| key_id == kid);

        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| !self.is_expired(&entry.key, now));

        // The requested key is stored last so capacity eviction never drops it.
        let mut selected = None;
        for (key_id, decoding_key) in others.into_iter().chain(requested) {
            let key = SigningKey {
                kid: key_id.clone(),
                decoding_key,
                fetched_at: now,
            };
            if key_id == kid {
                selected = Some(key.clone());
            }
            entries.insert(
                key_id,
                CachedKey {
                    key,
                    seq: gate.next_seq,
                },
            );
            gate.next_seq += 1;
            self.evict(&mut entries);
        }

        selected.ok_or_else(|| Error::UnknownSigningKey(kid.to_string()))
    }

    async fn lookup(&self, kid: &str) -> Option<SigningKey> {
        let entries = self.entries.read().await;
        entries
            .get(kid)
            .filter(|entry| !self.is_expired(&entry.key, self.now.now()))
            .map(|entry| entry.key.clone())
    }

    async fn fetch(&self) -> Result<Vec<(String, DecodingKey)>, Error> {
        let jwks: Jwks = self
            .http
            .get(&self.config.jwks_url)
            .await
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.json())
            .map_err(Error::key_source)?;

        let keys = jwks
            .keys
            .into_iter()
            .filter_map(|jwk| match jwk.decoding_key() {
                Ok(key) => Some((jwk.kid, key)),
                Err(err) => {
                    warn!(kid = %jwk.kid, %err, "skipping unusable signing key");
                    None
                }
            })
            .collect();

        Ok(keys)
    }

    fn is_expired(&self, key: &SigningKey, now: DateTime<Utc>) -> bool {
        now - key.fetched_at >= to_delta(self.config.ttl)
    }

    /// Drops the least recently fetched entries until the capacity holds.
    fn evict(&self, entries: &mut HashMap<String, CachedKey>) {
        let capacity = self.config.max_entries.max(1);
        while entries.len() > capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| (entry.key.fetched_at, entry.seq))
                .map(|(kid, _)| kid.clone());
            match oldest {
                Some(kid) => {
                    debug!(%kid, "evicting signing key");
                    entries.remove(&kid);
                }
                None => break,
            }
        }
    }
}

fn to_delta(duration: std::time::Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}
