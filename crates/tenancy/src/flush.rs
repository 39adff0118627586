//! Shared tenant-invalidation primitive used by both the NOTIFY listener (§4.7) and the
//! `POST /flush` endpoint (§4.8): the sqlx and the HTTP API must agree on what
//! "evict everything for this database" means, so both call through here.

use crate::cache::ServiceCache;
use crate::handler_cache::HandlerCache;
use crate::types::ApiStructure;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct FlushDispatcher {
    metadata_pool: PgPool,
    service_cache: Arc<ServiceCache<ApiStructure>>,
    handler_cache: Arc<HandlerCache>,
}

impl FlushDispatcher {
    pub fn new(
        metadata_pool: PgPool,
        service_cache: Arc<ServiceCache<ApiStructure>>,
        handler_cache: Arc<HandlerCache>,
    ) -> Self {
        Self { metadata_pool, service_cache, handler_cache }
    }

    /// Drops every cached entry belonging to `database_id` from both caches, releasing
    /// the corresponding pool references. Safe to call even if nothing is cached.
    pub async fn flush_service(&self, database_id: Uuid) {
        info!(%database_id, "flushing cached tenant state");

        self.service_cache
            .delete_matching(|api| api.database_id == database_id);
        // `database_id` is the stable tenant identity regardless of how the entry was
        // keyed (named API, schemata, or public domain), so one match against it covers
        // every handler-cache entry for this tenant.
        self.handler_cache
            .delete_matching(|entry| entry.database_id == database_id);

        if let Ok(domains) = self.fetch_domains(database_id).await {
            for domain in domains {
                self.service_cache
                    .delete_matching(move |api| api.domains.contains(&domain));
            }
        }
    }

    async fn fetch_domains(&self, database_id: Uuid) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT domain FROM services_public.apis WHERE database_id = $1",
        )
        .bind(database_id)
        .fetch_all(&self.metadata_pool)
        .await?;

        Ok(rows.into_iter().map(|(d,)| d).collect())
    }
}

/// Fixed-window-per-IP rate limiter backing `POST /flush`. Grounded on this crate's
/// general `DashMap`-backed in-memory state idiom rather than reaching for Redis for
/// something this cheap and process-local.
pub struct FlushRateLimiter {
    windows: dashmap::DashMap<String, Window>,
    limit: u32,
}

struct Window {
    count: u32,
    started_at: std::time::Instant,
}

impl FlushRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self { windows: dashmap::DashMap::new(), limit: requests_per_minute }
    }

    /// Returns `true` if the request for `client_ip` is allowed under the current
    /// window, incrementing its counter as a side effect.
    pub fn check(&self, client_ip: &str) -> bool {
        let now = std::time::Instant::now();
        let mut entry = self
            .windows
            .entry(client_ip.to_string())
            .or_insert_with(|| Window { count: 0, started_at: now });

        if now.duration_since(entry.started_at) >= std::time::Duration::from_secs(60) {
            entry.count = 0;
            entry.started_at = now;
        }

        if entry.count >= self.limit {
            return false;
        }

        entry.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_requests_under_the_limit_and_blocks_over_it() {
        let limiter = FlushRateLimiter::new(2);
        assert!(limiter.check("1.2.3.4"));
        assert!(limiter.check("1.2.3.4"));
        assert!(!limiter.check("1.2.3.4"));
    }

    #[test]
    fn tracks_separate_windows_per_client() {
        let limiter = FlushRateLimiter::new(1);
        assert!(limiter.check("1.1.1.1"));
        assert!(limiter.check("2.2.2.2"));
        assert!(!limiter.check("1.1.1.1"));
    }
}
