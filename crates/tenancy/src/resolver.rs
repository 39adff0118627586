//! Tenant resolution: turns an inbound request's headers/host into a cached
//! [`ApiStructure`], per spec.md §4.3's five-step algorithm.

use crate::cache::ServiceCache;
use crate::types::{ApiStructure, TenantKey};
use gateway_core::{ApiConfig, Error};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error as ThisError;
use uuid::Uuid;

#[derive(Debug, ThisError)]
pub enum ResolveError {
    #[error("no tenant matches this request")]
    NotFound,
    #[error("request matched more than one tenant")]
    Ambiguous,
    #[error("no requested schema is exposed by this database")]
    NoValidSchemas,
    #[error("the requested schema is not accessible")]
    AccessDenied,
    #[error("metadata database unavailable: {0}")]
    UpstreamUnavailable(#[source] sqlx::Error),
}

impl From<ResolveError> for Error {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::NotFound => Error::tenant_not_found("no tenant matches this request"),
            ResolveError::Ambiguous => Error::ambiguous_tenant("request matched more than one tenant"),
            ResolveError::NoValidSchemas => {
                Error::no_valid_schemas("no requested schema is exposed by this database")
            }
            ResolveError::AccessDenied => {
                Error::schema_access_denied("the requested schema is not accessible")
            }
            ResolveError::UpstreamUnavailable(source) => {
                Error::upstream_unavailable(format!("metadata database unavailable: {source}"))
            }
        }
    }
}

/// The routing inputs a single request carries; everything [`TenantResolver::resolve`]
/// needs and nothing more.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    pub host: Option<String>,
    pub x_api_name: Option<String>,
    pub x_schemata: Option<Vec<String>>,
    pub x_meta_schema: bool,
}

enum LookupMode {
    AdminSchemata(Vec<String>),
    ApiByName(String),
    AdminMetaSchema,
    PublicDomain,
}

pub struct TenantResolver {
    pool: PgPool,
    cache: Arc<ServiceCache<ApiStructure>>,
    config: ApiConfig,
}

impl TenantResolver {
    pub fn new(pool: PgPool, cache: Arc<ServiceCache<ApiStructure>>, config: ApiConfig) -> Self {
        Self { pool, cache, config }
    }

    pub async fn resolve(&self, req: &ResolveRequest) -> Result<(TenantKey, ApiStructure), ResolveError> {
        let mode = self.lookup_mode(req);
        let key = self.tenant_key(req, &mode);

        if let Some(api) = self.cache.get(&key) {
            return Ok((key, api));
        }

        let validated_schemas = self.validate_schemas(&mode).await?;

        let api = match mode {
            LookupMode::AdminSchemata(_) => self.admin_structure(validated_schemas),
            LookupMode::AdminMetaSchema => self.admin_structure(validated_schemas),
            LookupMode::ApiByName(name) => self.fetch_api_by_name(&name).await?,
            LookupMode::PublicDomain => self.fetch_public_api(req).await?,
        };

        let api = self.normalize(api);
        self.cache.set(key.clone(), api.clone());
        Ok((key, api))
    }

    fn lookup_mode(&self, req: &ResolveRequest) -> LookupMode {
        if self.config.is_public {
            return LookupMode::PublicDomain;
        }
        if let Some(name) = &req.x_api_name {
            return LookupMode::ApiByName(name.clone());
        }
        if let Some(schemas) = &req.x_schemata {
            return LookupMode::AdminSchemata(schemas.clone());
        }
        if req.x_meta_schema {
            return LookupMode::AdminMetaSchema;
        }
        LookupMode::PublicDomain
    }

    fn tenant_key(&self, req: &ResolveRequest, mode: &LookupMode) -> TenantKey {
        let database_id = self.config.default_database_id;
        match mode {
            LookupMode::AdminSchemata(schemas) => TenantKey::schemata(database_id, schemas),
            LookupMode::ApiByName(name) => TenantKey::api(database_id, name),
            LookupMode::AdminMetaSchema => TenantKey::meta_schema(database_id),
            LookupMode::PublicDomain => TenantKey::domain(req.host.as_deref().unwrap_or("")),
        }
    }

    async fn validate_schemas(&self, mode: &LookupMode) -> Result<Vec<String>, ResolveError> {
        let candidates: Vec<String> = match mode {
            LookupMode::AdminSchemata(schemas) => schemas.clone(),
            LookupMode::AdminMetaSchema | LookupMode::ApiByName(_) | LookupMode::PublicDomain => {
                self.config.meta_schemas.clone()
            }
        };

        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT schema_name FROM information_schema.schemata WHERE schema_name = ANY($1)",
        )
        .bind(&candidates)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::RowNotFound => ResolveError::NotFound,
            _ => ResolveError::UpstreamUnavailable(e),
        })?;

        let validated: Vec<String> = rows.into_iter().map(|(s,)| s).collect();
        if validated.is_empty() {
            // An explicit, non-empty `X-Schemata` header that survives validation with
            // nothing left over is the client asking for schemas it isn't allowed to see
            // (spec.md §8 scenario 3: 403 SCHEMA_ACCESS_DENIED). Absent/empty schemata,
            // or an empty candidate set from any other lookup mode, is the ordinary
            // "nothing here" case instead.
            return match mode {
                LookupMode::AdminSchemata(schemas) if !schemas.is_empty() => {
                    Err(ResolveError::AccessDenied)
                }
                _ => Err(ResolveError::NoValidSchemas),
            };
        }
        Ok(validated)
    }

    fn admin_structure(&self, schemas: Vec<String>) -> ApiStructure {
        ApiStructure {
            dbname: self.config.default_database_id.to_string(),
            anon_role: "administrator".to_string(),
            auth_role: "administrator".to_string(),
            schema: schemas,
            api_modules: HashMap::new(),
            rls_module: None,
            domains: Vec::new(),
            database_id: self.config.default_database_id,
            is_public: false,
        }
    }

    async fn fetch_api_by_name(&self, name: &str) -> Result<ApiStructure, ResolveError> {
        let row: Option<ApiRow> = sqlx::query_as(
            "SELECT dbname, anon_role, auth_role, schema, database_id, is_public \
             FROM services_public.apis WHERE database_id = $1 AND name = $2",
        )
        .bind(self.config.default_database_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(ResolveError::UpstreamUnavailable)?;

        row.map(ApiRow::into_structure).ok_or(ResolveError::NotFound)
    }

    async fn fetch_public_api(&self, req: &ResolveRequest) -> Result<ApiStructure, ResolveError> {
        let host = req.host.as_deref().unwrap_or("");
        let (domain, subdomain) = split_subdomain(host);

        let rows: Vec<ApiRow> = sqlx::query_as(
            "SELECT dbname, anon_role, auth_role, schema, database_id, is_public \
             FROM services_public.apis \
             WHERE domain = $1 AND (subdomain = $2 OR (subdomain IS NULL AND $2 IS NULL))",
        )
        .bind(domain)
        .bind(subdomain)
        .fetch_all(&self.pool)
        .await
        .map_err(ResolveError::UpstreamUnavailable)?;

        match rows.len() {
            0 => Err(ResolveError::NotFound),
            1 => Ok(rows.into_iter().next().unwrap().into_structure()),
            _ => Err(ResolveError::Ambiguous),
        }
    }

    fn normalize(&self, mut api: ApiStructure) -> ApiStructure {
        api.schema.sort();
        api.schema.dedup();
        api.domains = api
            .domains
            .into_iter()
            .map(|d| canonicalize_domain(&d))
            .collect();
        api
    }
}

#[derive(sqlx::FromRow)]
struct ApiRow {
    dbname: String,
    anon_role: String,
    auth_role: String,
    schema: Vec<String>,
    database_id: Uuid,
    is_public: bool,
}

impl ApiRow {
    fn into_structure(self) -> ApiStructure {
        ApiStructure {
            dbname: self.dbname,
            anon_role: self.anon_role,
            auth_role: self.auth_role,
            schema: self.schema,
            api_modules: HashMap::new(),
            rls_module: None,
            domains: Vec::new(),
            database_id: self.database_id,
            is_public: self.is_public,
        }
    }
}

fn split_subdomain(host: &str) -> (String, Option<String>) {
    let lower = host.to_ascii_lowercase();
    let parts: Vec<&str> = lower.splitn(2, '.').collect();
    match parts.as_slice() {
        [sub, rest] if parts.len() == 2 && rest.contains('.') => {
            (rest.to_string(), Some(sub.to_string()))
        }
        _ => (lower, None),
    }
}

fn canonicalize_domain(host: &str) -> String {
    if host == "localhost" || host.starts_with("localhost:") {
        format!("http://{host}")
    } else {
        format!("https://{host}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_subdomain_extracts_leading_label() {
        assert_eq!(
            split_subdomain("tenant.example.com"),
            ("example.com".to_string(), Some("tenant".to_string()))
        );
    }

    #[test]
    fn split_subdomain_treats_bare_domain_as_no_subdomain() {
        assert_eq!(split_subdomain("example.com"), ("example.com".to_string(), None));
    }

    #[test]
    fn canonicalize_domain_uses_http_for_localhost() {
        assert_eq!(canonicalize_domain("localhost:3000"), "http://localhost:3000");
        assert_eq!(canonicalize_domain("example.com"), "https://example.com");
    }
}
