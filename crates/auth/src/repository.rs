//! Calls a tenant's `authenticate`/`authenticate_strict` SQL function against its own
//! pool, per spec.md §4.6. There is no user table here — the tenant database owns the
//! whole authentication decision; this crate only shapes the call and the result.

use gateway_tenancy::Token;
use serde_json::Value;
use sqlx::{Column, PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Cookie,
    Bearer,
}

impl CredentialKind {
    fn as_str(self) -> &'static str {
        match self {
            CredentialKind::Cookie => "cookie",
            CredentialKind::Bearer => "bearer",
        }
    }
}

/// Request-scoped metadata forwarded as session settings alongside the credential
/// itself, so `authenticate` functions can log or rate-limit on them.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub ip_address: Option<String>,
    pub origin: Option<String>,
    pub user_agent: Option<String>,
}

pub struct AuthRepository;

impl AuthRepository {
    /// Invokes `SELECT * FROM <private_schema>.<function>($1)` on `pool`, setting the
    /// session variables the function may read via `current_setting`. Zero rows means
    /// "no usable credential" — the caller falls through to the next credential kind
    /// (cookie → bearer) or to the unauthenticated envelope.
    pub async fn authenticate(
        pool: &PgPool,
        private_schema: &str,
        function: &str,
        credential: &str,
        kind: Option<CredentialKind>,
        ctx: &AuthContext,
    ) -> Result<Option<Token>, sqlx::Error> {
        let mut conn = pool.acquire().await?;

        if let Some(kind) = kind {
            sqlx::query("SELECT set_config('request.credential_kind', $1, true)")
                .bind(kind.as_str())
                .execute(&mut *conn)
                .await?;
        }
        if let Some(ip) = &ctx.ip_address {
            sqlx::query("SELECT set_config('request.ip_address', $1, true)")
                .bind(ip)
                .execute(&mut *conn)
                .await?;
        }
        if let Some(origin) = &ctx.origin {
            sqlx::query("SELECT set_config('request.origin', $1, true)")
                .bind(origin)
                .execute(&mut *conn)
                .await?;
        }
        if let Some(ua) = &ctx.user_agent {
            sqlx::query("SELECT set_config('request.user_agent', $1, true)")
                .bind(ua)
                .execute(&mut *conn)
                .await?;
        }

        let sql = format!("SELECT * FROM {private_schema}.{function}($1)");
        let row = sqlx::query(&sql).bind(credential).fetch_optional(&mut *conn).await?;

        let Some(row) = row else { return Ok(None) };

        let id: Uuid = row.try_get("id")?;
        let user_id: Uuid = row.try_get("user_id")?;

        let mut claims = serde_json::Map::new();
        for column in row.columns() {
            let name = column.name();
            if name == "id" || name == "user_id" {
                continue;
            }
            let value: Option<String> = row.try_get(name).unwrap_or(None);
            claims.insert(name.to_string(), value.map(Value::String).unwrap_or(Value::Null));
        }

        Ok(Some(Token { id, user_id, claims }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_kind_serializes_to_lowercase() {
        assert_eq!(CredentialKind::Cookie.as_str(), "cookie");
        assert_eq!(CredentialKind::Bearer.as_str(), "bearer");
    }
}
