//! `POST /graphql` — runs auth (spec.md §4.6), builds/fetches the cached handler
//! (§4.4), computes the per-request settings hook (§4.5), and dispatches.

use crate::error_handler::create_api_error_with_request_id;
use crate::state::AppState;
use crate::util::bearer_token;
use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
    Extension, Json,
};
use axum_extra::extract::CookieJar;
use gateway_auth::AuthOutcome;
use gateway_core::Error;
use gateway_tenancy::{ApiStructure, RequestContext};
use serde_json::Value;
use std::collections::HashMap;

pub async fn graphql_handler(
    State(state): State<AppState>,
    Extension(api): Extension<ApiStructure>,
    Extension(context): Extension<RequestContext>,
    cookies: CookieJar,
    request: Request,
) -> Response {
    let headers = request.headers().clone();
    let bearer = bearer_token(&headers);

    // `AuthMiddleware` is a no-op passthrough whenever `rls_module` is absent (spec.md
    // §4.6); skip acquiring a tenant pool entirely in that case rather than auth
    // touching a connection it will never query.
    let context = if api.rls_module.is_some() {
        let pg_url = state.tenant_pg_url(&api.dbname);
        let pool = match state.pools.acquire(&api.dbname, &pg_url).await {
            Ok(pool) => pool,
            Err(e) => return respond_error(e, &request),
        };
        let outcome = state.auth.authenticate(&api, &pool, &cookies, bearer.as_deref(), context.clone()).await;
        state.pools.release(&api.dbname);

        match outcome {
            AuthOutcome::Passthrough => context,
            AuthOutcome::Authenticated(ctx) => ctx,
            AuthOutcome::Unauthenticated => {
                return Json(gateway_auth::unauthenticated_envelope()).into_response();
            }
            AuthOutcome::BadTokenDefinition(detail) => {
                return Json(gateway_auth::bad_token_definition_envelope(&detail)).into_response();
            }
        }
    } else {
        context
    };

    let Some(key) = context.tenant_key.clone() else {
        return respond_error(Error::tenant_not_found("no tenant resolved for this request"), &request);
    };

    let pg_url = state.tenant_pg_url(&api.dbname);
    let handler = match state
        .handler_cache
        .get_or_build(&key, api.clone(), pg_url, state.builder.clone())
        .await
    {
        Ok(handler) => handler,
        Err(e) => return respond_error(e, &request),
    };

    let settings = request_settings(&api, &context);

    let body: Value = match axum::body::to_bytes(request.into_body(), usize::MAX).await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or(Value::Null),
        Err(_) => Value::Null,
    };

    match handler.dispatch(settings, body).await {
        Ok(value) => Json(value).into_response(),
        Err(e) => crate::error_handler::create_api_error(e)
            .with_request_id(context.request_id)
            .into_response(),
    }
}

fn respond_error(error: Error, request: &Request) -> Response {
    create_api_error_with_request_id(error, request).into_response()
}

/// Session settings computed once per request, per spec.md §4.5 — `role` is the
/// auth role if a token was established this request, else the tenant's anon role.
fn request_settings(api: &ApiStructure, context: &RequestContext) -> HashMap<String, String> {
    let mut settings = HashMap::new();

    let role = if context.token.is_some() { &api.auth_role } else { &api.anon_role };
    settings.insert("role".to_string(), role.clone());
    settings.insert("jwt.claims.database_id".to_string(), api.database_id.to_string());

    if let Some(ip) = &context.ip_address {
        settings.insert("jwt.claims.ip_address".to_string(), ip.clone());
    }
    if let Some(origin) = &context.origin {
        settings.insert("jwt.claims.origin".to_string(), origin.clone());
    }
    if let Some(user_agent) = &context.user_agent {
        settings.insert("jwt.claims.user_agent".to_string(), user_agent.clone());
    }
    if let Some(token) = &context.token {
        settings.insert("jwt.claims.token_id".to_string(), token.id.to_string());
        settings.insert("jwt.claims.user_id".to_string(), token.user_id.to_string());
    }

    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_tenancy::TenantKey;
    use std::collections::HashMap as Map;

    fn api(rls: bool) -> ApiStructure {
        ApiStructure {
            dbname: "tenant_one".into(),
            anon_role: "anonymous".into(),
            auth_role: "authenticated".into(),
            schema: vec!["public".into()],
            api_modules: Map::new(),
            rls_module: if rls {
                Some(gateway_tenancy::RlsModule {
                    private_schema: "private".into(),
                    authenticate: "login".into(),
                    authenticate_strict: None,
                    current_role: "current_user".into(),
                    current_role_id: None,
                })
            } else {
                None
            },
            domains: vec![],
            database_id: uuid::Uuid::nil(),
            is_public: true,
        }
    }

    #[test]
    fn settings_use_anon_role_without_a_token() {
        let mut context = RequestContext::new("req-1".into());
        context.tenant_key = Some(TenantKey::domain("example.com"));
        let settings = request_settings(&api(true), &context);
        assert_eq!(settings.get("role"), Some(&"anonymous".to_string()));
    }

    #[test]
    fn settings_use_auth_role_with_a_token() {
        let mut context = RequestContext::new("req-1".into());
        context.token = Some(gateway_tenancy::Token {
            id: uuid::Uuid::nil(),
            user_id: uuid::Uuid::nil(),
            claims: serde_json::Map::new(),
        });
        let settings = request_settings(&api(true), &context);
        assert_eq!(settings.get("role"), Some(&"authenticated".to_string()));
        assert!(settings.contains_key("jwt.claims.token_id"));
    }
}
