// Copyright (c) Microsoft. All rights reserved.

use std::collections::HashMap;
use std::sync::Arc;

use core_objects::{get_epoch_time, SpiffeId, TrustDomain};
use log::debug;
use svid::JwtSvid;
use tokio::sync::Mutex;
use trust_bundle::JwtBundle;

use crate::error::Error;
use crate::jwt_source::JwtSource;

#[derive(PartialEq, Eq, Hash)]
struct CacheKey {
    subject: Option<String>,
    audiences: Vec<String>,
}

struct CacheEntry {
    svid: JwtSvid,
    inserted_at: u64,
}

/// Wraps a `JwtSource` with a token cache keyed by subject and sorted
/// audience set. A cached token is served while more than half of its
/// lifetime at insert remains; stale entries are evicted on read.
pub struct CachedJwtSource {
    source: Arc<JwtSource>,
    cache: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl CachedJwtSource {
    #[must_use]
    pub fn new(source: Arc<JwtSource>) -> Self {
        CachedJwtSource {
            source,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn fetch_jwt_svid(
        &self,
        audiences: Vec<String>,
        subject: Option<SpiffeId>,
    ) -> Result<JwtSvid, Error> {
        let mut sorted_audiences = audiences.clone();
        sorted_audiences.sort();
        let key = CacheKey {
            subject: subject.as_ref().map(ToString::to_string),
            audiences: sorted_audiences,
        };

        let now = get_epoch_time();
        {
            let mut cache = self.cache.lock().await;
            if let Some(entry) = cache.get(&key) {
                if is_fresh(entry, now) {
                    debug!("Serving a cached JWT SVID");
                    return Ok(entry.svid.clone());
                }
                cache.remove(&key);
            }
        }

        let svid = self.source.fetch_jwt_svid(audiences, subject).await?;
        self.cache.lock().await.insert(
            key,
            CacheEntry {
                svid: svid.clone(),
                inserted_at: now,
            },
        );

        Ok(svid)
    }

    pub async fn bundle_for_trust_domain(
        &self,
        trust_domain: &TrustDomain,
    ) -> Result<JwtBundle, Error> {
        self.source.bundle_for_trust_domain(trust_domain).await
    }

    pub async fn close(&self) {
        self.source.close().await;
    }
}

fn is_fresh(entry: &CacheEntry, now: u64) -> bool {
    let expiry = entry.svid.expiry();
    if expiry <= now {
        return false;
    }

    let lifetime_at_insert = expiry.saturating_sub(entry.inserted_at);
    (expiry - now) * 2 > lifetime_at_insert
}
