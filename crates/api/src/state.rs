use gateway_auth::AuthMiddleware;
use gateway_core::{Config, PoolRegistry};
use gateway_tenancy::{ApiStructure, BuildHandler, FlushDispatcher, FlushRateLimiter, HandlerCache, ServiceCache, TenantResolver};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub metadata_pool: PgPool,
    pub pools: PoolRegistry,
    pub service_cache: Arc<ServiceCache<ApiStructure>>,
    pub handler_cache: Arc<HandlerCache>,
    pub resolver: Arc<TenantResolver>,
    pub auth: Arc<AuthMiddleware>,
    pub builder: Arc<dyn BuildHandler>,
    pub flush_dispatcher: Arc<FlushDispatcher>,
    pub flush_limiter: Arc<FlushRateLimiter>,
}

impl AppState {
    /// The tenant database lives on the same cluster as the metadata database, under
    /// its own name — `pg.*` supplies host/port/credentials, `ApiStructure::dbname`
    /// supplies the database.
    pub fn tenant_pg_url(&self, dbname: &str) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.config.pg.user, self.config.pg.password, self.config.pg.host, self.config.pg.port, dbname
        )
    }
}
