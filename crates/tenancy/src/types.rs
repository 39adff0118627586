use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A resolved API, cached by [`crate::cache::ServiceCache`] against a [`TenantKey`].
///
/// Mirrors one row of the metadata database's API listing, normalized per
/// resolver step 5: schema list deduped, domains canonicalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiStructure {
    pub dbname: String,
    pub anon_role: String,
    pub auth_role: String,
    pub schema: Vec<String>,
    pub api_modules: HashMap<String, ApiModule>,
    pub rls_module: Option<RlsModule>,
    pub domains: Vec<String>,
    pub database_id: Uuid,
    pub is_public: bool,
}

/// An opaque, named configuration blob attached to an API. `cors` is interpreted by
/// `gateway_api`; every other name is forwarded to the handler factory untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiModule {
    pub name: String,
    pub data: serde_json::Value,
}

/// Row-level-security wiring for an API. Its presence gates whether
/// `gateway_auth::AuthMiddleware` does anything at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RlsModule {
    pub private_schema: String,
    pub authenticate: String,
    pub authenticate_strict: Option<String>,
    pub current_role: String,
    pub current_role_id: Option<String>,
}

/// Canonical cache key. The five shapes spec.md §3 describes (`api:<db>:<name>`,
/// `schemata:<db>:<joined schemas>`, `metaschema:api:<db>`, and the public
/// `domain`/`domain:subdomain` forms) all collapse to one newtype so cache and
/// invalidation code never need to branch on "which shape is this."
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantKey(pub String);

impl TenantKey {
    pub fn api(database_id: Uuid, name: &str) -> Self {
        Self(format!("api:{database_id}:{name}"))
    }

    pub fn schemata(database_id: Uuid, schemas: &[String]) -> Self {
        let mut sorted = schemas.to_vec();
        sorted.sort();
        Self(format!("schemata:{database_id}:{}", sorted.join(",")))
    }

    pub fn meta_schema(database_id: Uuid) -> Self {
        Self(format!("metaschema:api:{database_id}"))
    }

    pub fn domain(host: &str) -> Self {
        Self(format!("domain:{}", normalize_host(host)))
    }

    pub fn subdomain(host: &str, subdomain: &str) -> Self {
        Self(format!("domain:{}:{}", normalize_host(host), subdomain))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn normalize_host(host: &str) -> String {
    let lower = host.to_ascii_lowercase();
    lower.strip_prefix("www.").unwrap_or(&lower).to_string()
}

/// A row returned by a tenant's `authenticate`/`authenticate_strict` function.
/// `claims` holds every column beyond `id`/`user_id`, forwarded verbatim as
/// `jwt.claims.*` session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: Uuid,
    pub user_id: Uuid,
    pub claims: serde_json::Map<String, serde_json::Value>,
}

/// Per-request state threaded through resolution, auth, and dispatch.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub tenant_key: Option<TenantKey>,
    pub token: Option<Token>,
    pub ip_address: Option<String>,
    pub origin: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new(request_id: String) -> Self {
        Self {
            request_id,
            tenant_key: None,
            token: None,
            ip_address: None,
            origin: None,
            user_agent: None,
        }
    }
}

/// Contract every GraphQL-handling service must satisfy to be cached by
/// [`crate::handler_cache::HandlerCache`].
#[async_trait::async_trait]
pub trait Handler: Send + Sync {
    async fn dispatch(
        &self,
        settings: HashMap<String, String>,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, gateway_core::Error>;
}

/// Everything a [`BuildHandler`] factory needs to construct a [`Handler`] for one API.
#[derive(Debug, Clone)]
pub struct HandlerSpec {
    pub api: ApiStructure,
    pub pool: sqlx::PgPool,
}

/// External factory contract: turns a resolved API plus its acquired pool into a
/// live [`Handler`]. Implemented outside this crate (the actual GraphQL engine);
/// `gateway_tenancy` only coalesces and caches calls to it.
#[async_trait::async_trait]
pub trait BuildHandler: Send + Sync {
    async fn build(&self, spec: HandlerSpec) -> Result<Arc<dyn Handler>, gateway_core::Error>;
}

/// Cached, built handler plus the bookkeeping needed to release its pool reference
/// on eviction.
#[derive(Clone)]
pub struct HandlerEntry {
    pub dbname: String,
    pub schemas: Vec<String>,
    /// The API's `database_id`, carried so flush invalidation (spec.md §4.7/§4.8) can
    /// match entries by tenant identity instead of by `dbname`, which public-domain
    /// APIs don't key on.
    pub database_id: Uuid,
    pub handler: Arc<dyn Handler>,
    pub created_at: DateTime<Utc>,
}
