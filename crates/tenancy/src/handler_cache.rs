//! Single-flight handler build/cache, per spec.md §4.4.
//!
//! Concurrent requests for the same [`TenantKey`] that miss the handler cache must
//! coalesce onto one build. `futures::future::Shared` is the idiomatic primitive for
//! this: cloning a `Shared` future and polling it from independent tasks is exactly
//! "subscribe to a one-shot result channel," and wrapping the build in a detached
//! `tokio::spawn` before sharing it means the build runs to completion even if the
//! request that triggered it is cancelled.

use crate::types::{ApiStructure, BuildHandler, Handler, HandlerEntry, HandlerSpec, TenantKey};
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use gateway_core::{Error, PoolRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// `Error` derives `Clone`, so it can sit directly in a `Shared` future's output —
/// every waiter gets its own clone without needing a lossy intermediate wrapper.
type InflightBuild = Shared<BoxFuture<'static, Result<Arc<dyn Handler>, Error>>>;

pub struct HandlerCache {
    entries: DashMap<TenantKey, HandlerEntry>,
    inflight: DashMap<TenantKey, InflightBuild>,
    pools: PoolRegistry,
    max_entries: usize,
    /// `None` disables TTL eviction entirely, leaving capacity-triggered LRU as the
    /// only eviction path.
    ttl: Option<ChronoDuration>,
}

impl HandlerCache {
    pub fn new(pools: PoolRegistry, max_entries: usize) -> Self {
        Self::with_ttl(pools, max_entries, None)
    }

    pub fn with_ttl(pools: PoolRegistry, max_entries: usize, ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            inflight: DashMap::new(),
            pools,
            max_entries: if max_entries == 0 { 1000 } else { max_entries },
            ttl: ttl.map(|d| ChronoDuration::from_std(d).unwrap_or(ChronoDuration::zero())),
        }
    }

    pub async fn get_or_build(
        &self,
        key: &TenantKey,
        api: ApiStructure,
        pg_url: String,
        builder: Arc<dyn BuildHandler>,
    ) -> Result<Arc<dyn Handler>, Error> {
        let hit = self.entries.get(key).map(|entry| (self.is_expired(&entry), entry.handler.clone()));
        match hit {
            Some((false, handler)) => return Ok(handler),
            Some((true, _)) => self.evict(key),
            None => {}
        }

        let dbname = api.dbname.clone();
        let schemas = api.schema.clone();
        let database_id = api.database_id;

        // `DashMap::entry` locks the key's shard for the whole match arm, so checking
        // for an existing inflight build and inserting a new one happen atomically —
        // two concurrent misses can never both take the `Vacant` arm and both spawn a
        // build (spec.md §4.4 step 3, §8 "exactly one handler build occurs").
        let (shared, is_builder) = match self.inflight.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(occupied) => (occupied.get().clone(), false),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let pools = self.pools.clone();
                let build_dbname = dbname.clone();

                let build_fut: BoxFuture<'static, Result<Arc<dyn Handler>, Error>> = async move {
                    let pool = pools.acquire(&build_dbname, &pg_url).await?;

                    let spec = HandlerSpec { api, pool };
                    match builder.build(spec).await {
                        Ok(handler) => Ok(handler),
                        Err(e) => {
                            pools.release(&build_dbname);
                            Err(e)
                        }
                    }
                }
                .boxed();

                let shared = tokio::spawn(build_fut)
                    .map(|joined| match joined {
                        Ok(result) => result,
                        Err(_) => Err(Error::handler_build_failed("handler build task panicked")),
                    })
                    .boxed()
                    .shared();

                vacant.insert(shared.clone());
                (shared, true)
            }
        };

        let result = shared.await;

        if is_builder {
            self.inflight.remove(key);
            match &result {
                Ok(handler) => self.insert(key.clone(), dbname, schemas, database_id, handler.clone()),
                Err(e) => warn!(%key, error = %e.message, "handler build failed"),
            }
        }

        result
    }

    fn is_expired(&self, entry: &HandlerEntry) -> bool {
        match self.ttl {
            Some(ttl) => Utc::now() - entry.created_at >= ttl,
            None => false,
        }
    }

    fn insert(
        &self,
        key: TenantKey,
        dbname: String,
        schemas: Vec<String>,
        database_id: Uuid,
        handler: Arc<dyn Handler>,
    ) {
        let is_new = !self.entries.contains_key(&key);
        self.entries.insert(
            key,
            HandlerEntry { dbname, schemas, database_id, handler, created_at: Utc::now() },
        );

        if is_new && self.entries.len() > self.max_entries {
            self.evict_one();
        }
    }

    /// Oldest-first eviction by `created_at`; releases the evicted entry's pool
    /// reference. Called both on capacity overflow and from NOTIFY invalidation.
    fn evict_one(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.created_at)
            .map(|e| e.key().clone());

        if let Some(key) = oldest {
            self.evict(&key);
        }
    }

    pub fn evict(&self, key: &TenantKey) {
        if let Some((_, entry)) = self.entries.remove(key) {
            debug!(dbname = %entry.dbname, "evicting handler cache entry");
            self.pools.release(&entry.dbname);
        }
    }

    pub fn delete_matching(&self, predicate: impl Fn(&HandlerEntry) -> bool) {
        let to_evict: Vec<TenantKey> = self
            .entries
            .iter()
            .filter(|e| predicate(e.value()))
            .map(|e| e.key().clone())
            .collect();

        for key in to_evict {
            self.evict(&key);
        }
    }

    pub fn get(&self, key: &TenantKey) -> Option<Arc<dyn Handler>> {
        self.entries.get(key).map(|e| e.handler.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::time::Duration as StdDuration;

    struct NoopHandler;

    #[async_trait::async_trait]
    impl Handler for NoopHandler {
        async fn dispatch(&self, _settings: HashMap<String, String>, _body: Value) -> Result<Value, Error> {
            Ok(Value::Null)
        }
    }

    fn test_registry() -> PoolRegistry {
        PoolRegistry::new(1, 0, StdDuration::from_secs(0))
    }

    fn entry_with_age(seconds_old: i64) -> HandlerEntry {
        HandlerEntry {
            dbname: "tenant_one".into(),
            schemas: vec!["public".into()],
            database_id: Uuid::nil(),
            handler: Arc::new(NoopHandler) as Arc<dyn Handler>,
            created_at: Utc::now() - ChronoDuration::seconds(seconds_old),
        }
    }

    #[test]
    fn entry_within_ttl_is_not_expired() {
        let cache = HandlerCache::with_ttl(test_registry(), 10, Some(StdDuration::from_secs(60)));
        assert!(!cache.is_expired(&entry_with_age(5)));
    }

    #[test]
    fn entry_past_ttl_is_expired() {
        let cache = HandlerCache::with_ttl(test_registry(), 10, Some(StdDuration::from_secs(30)));
        assert!(cache.is_expired(&entry_with_age(31)));
    }

    #[test]
    fn no_ttl_never_expires() {
        let cache = HandlerCache::new(test_registry(), 10);
        assert!(!cache.is_expired(&entry_with_age(365 * 24 * 3600)));
    }

    #[test]
    fn inserted_entry_is_retrievable() {
        let cache = HandlerCache::new(test_registry(), 10);
        let key = TenantKey::domain("tenant.example.com");
        cache.insert(
            key.clone(),
            "tenant_one".into(),
            vec!["public".into()],
            Uuid::nil(),
            Arc::new(NoopHandler),
        );
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn capacity_overflow_evicts_the_oldest_entry() {
        let cache = HandlerCache::new(test_registry(), 1);
        let a = TenantKey::domain("a.example.com");
        let b = TenantKey::domain("b.example.com");
        cache.insert(a.clone(), "tenant_a".into(), vec![], Uuid::nil(), Arc::new(NoopHandler));
        cache.insert(b.clone(), "tenant_b".into(), vec![], Uuid::nil(), Arc::new(NoopHandler));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&a).is_none());
        assert!(cache.get(&b).is_some());
    }
}
