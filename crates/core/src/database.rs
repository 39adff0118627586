//! # Named, Ref-Counted Database Pool Registry
//!
//! Replaces a single "one pool per tenant schema" cache with a process-wide registry
//! keyed by database name (spec.md §4.1). Every consumer that holds a cache entry
//! pointing at a pool (the service cache, the handler cache) acquires a reference on
//! insert and releases it on removal; the pool itself is only closed once its refcount
//! reaches zero *and* a grace period has elapsed, which absorbs rapid flush-then-reuse
//! cycles without tearing down and rebuilding connections on every eviction.
//!
//! ## Thread Safety
//!
//! The registry is `Clone` (it wraps an `Arc`) and safe to share across async tasks. The
//! internal map uses `DashMap` for concurrent access without a single global lock — the
//! same structural choice the tenant-pool cache this module is descended from made.
//!
//! ## Failure Semantics
//!
//! Pool-connect errors are surfaced to the caller; the registry does not retry. The
//! registry itself never blocks — pool acquisition may block per the underlying pool's
//! own connection-limit policy, but no registry-held lock is ever held across that wait.

use crate::{error::Result, Error};
use dashmap::DashMap;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

struct RegistryEntry {
    pool: PgPool,
    refcount: AtomicUsize,
    /// Bumped on every re-acquire so a close task scheduled before the bump knows to
    /// abandon itself instead of closing a pool that's back in use.
    generation: AtomicUsize,
}

/// Process-wide registry of named PostgreSQL connection pools.
#[derive(Clone)]
pub struct PoolRegistry {
    pools: Arc<DashMap<String, Arc<RegistryEntry>>>,
    max_connections: u32,
    min_connections: u32,
    close_grace: Duration,
}

impl PoolRegistry {
    pub fn new(max_connections: u32, min_connections: u32, close_grace: Duration) -> Self {
        Self {
            pools: Arc::new(DashMap::new()),
            max_connections,
            min_connections,
            close_grace,
        }
    }

    /// Acquires the pool for `dbname`, creating it on first use. Increments the pool's
    /// refcount; callers must pair this with exactly one [`PoolRegistry::release`].
    pub async fn acquire(&self, dbname: &str, url: &str) -> Result<PgPool> {
        if let Some(entry) = self.pools.get(dbname) {
            entry.refcount.fetch_add(1, Ordering::SeqCst);
            entry.generation.fetch_add(1, Ordering::SeqCst);
            debug!(dbname, "reusing pooled database connection");
            return Ok(entry.pool.clone());
        }

        debug!(dbname, "creating new database connection pool");
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .connect(url)
            .await
            .map_err(Error::from)?;

        let entry = Arc::new(RegistryEntry {
            pool: pool.clone(),
            refcount: AtomicUsize::new(1),
            generation: AtomicUsize::new(0),
        });

        // Another task may have raced us to create the same entry; keep whichever pool
        // actually ended up registered so nobody holds a stray unreferenced pool.
        match self.pools.entry(dbname.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                existing.get().refcount.fetch_add(1, Ordering::SeqCst);
                existing.get().generation.fetch_add(1, Ordering::SeqCst);
                Ok(existing.get().pool.clone())
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(entry);
                info!(dbname, "database connection pool initialized");
                Ok(pool)
            }
        }
    }

    /// Releases one reference on `dbname`'s pool. When the refcount reaches zero,
    /// schedules a close after the configured grace period; a re-[`acquire`] within that
    /// window cancels the close by bumping the generation counter.
    ///
    /// [`acquire`]: Self::acquire
    pub fn release(&self, dbname: &str) {
        let Some(entry) = self.pools.get(dbname).map(|e| e.clone()) else {
            warn!(dbname, "release called for unknown pool");
            return;
        };

        let remaining = entry.refcount.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining > 0 {
            return;
        }

        let dbname = dbname.to_string();
        let pools = self.pools.clone();
        let observed_generation = entry.generation.load(Ordering::SeqCst);
        let grace = self.close_grace;

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;

            let still_idle = pools
                .get(&dbname)
                .map(|e| {
                    e.refcount.load(Ordering::SeqCst) == 0
                        && e.generation.load(Ordering::SeqCst) == observed_generation
                })
                .unwrap_or(false);

            if still_idle {
                if let Some((_, entry)) = pools.remove(&dbname) {
                    info!(dbname = %dbname, "closing idle database connection pool");
                    entry.pool.close().await;
                }
            }
        });
    }

    /// Closes every registered pool immediately. Idempotent; safe to call on shutdown
    /// even if pools are already closed or the registry is empty.
    pub async fn close_all(&self) {
        let dbnames: Vec<String> = self.pools.iter().map(|e| e.key().clone()).collect();
        for dbname in dbnames {
            if let Some((_, entry)) = self.pools.remove(&dbname) {
                entry.pool.close().await;
            }
        }
    }

    /// Current refcount for `dbname`, or `None` if no pool is registered. Exposed for
    /// tests and diagnostics only.
    pub fn refcount(&self, dbname: &str) -> Option<usize> {
        self.pools.get(dbname).map(|e| e.refcount.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refcount_starts_at_none_for_unknown_pool() {
        let registry = PoolRegistry::new(4, 1, Duration::from_millis(50));
        assert_eq!(registry.refcount("unknown"), None);
    }
}
