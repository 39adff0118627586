use crate::repository::{AuthContext, AuthRepository, CredentialKind};
use axum_extra::extract::CookieJar;
use gateway_tenancy::{ApiStructure, RequestContext};
use serde_json::json;
use sqlx::PgPool;
use tracing::warn;

/// Outcome of running authentication for one request. `Unauthenticated` and
/// `BadTokenDefinition` are not errors — spec.md §4.6 requires both to reach the
/// client as an HTTP 200 GraphQL-shaped envelope, with the handler never invoked.
pub enum AuthOutcome {
    /// No RLS module configured for this API; auth is a no-op.
    Passthrough,
    Authenticated(RequestContext),
    Unauthenticated,
    BadTokenDefinition(String),
}

pub struct AuthMiddleware {
    strict: bool,
}

impl AuthMiddleware {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub async fn authenticate(
        &self,
        api: &ApiStructure,
        pool: &PgPool,
        cookies: &CookieJar,
        bearer: Option<&str>,
        mut context: RequestContext,
    ) -> AuthOutcome {
        let Some(rls) = &api.rls_module else {
            return AuthOutcome::Passthrough;
        };

        let function = if self.strict {
            match &rls.authenticate_strict {
                Some(f) => f,
                None => &rls.authenticate,
            }
        } else {
            &rls.authenticate
        };

        let ctx = AuthContext {
            ip_address: context.ip_address.clone(),
            origin: context.origin.clone(),
            user_agent: context.user_agent.clone(),
        };

        if let Some(cookie) = cookies.get("session") {
            match AuthRepository::authenticate(
                pool,
                &rls.private_schema,
                function,
                cookie.value(),
                Some(CredentialKind::Cookie),
                &ctx,
            )
            .await
            {
                Ok(Some(token)) => {
                    context.token = Some(token);
                    return AuthOutcome::Authenticated(context);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "authenticate() failed for cookie credential");
                    return AuthOutcome::BadTokenDefinition(e.to_string());
                }
            }
        }

        let Some(bearer) = bearer else {
            return AuthOutcome::Unauthenticated;
        };

        match AuthRepository::authenticate(pool, &rls.private_schema, function, bearer, None, &ctx)
            .await
        {
            Ok(Some(token)) => {
                context.token = Some(token);
                AuthOutcome::Authenticated(context)
            }
            Ok(None) => AuthOutcome::Unauthenticated,
            Err(e) => {
                warn!(error = %e, "authenticate() failed for bearer credential");
                AuthOutcome::BadTokenDefinition(e.to_string())
            }
        }
    }
}

/// The GraphQL-shaped error envelope spec.md §4.6 requires for both unauthenticated
/// and malformed-token-function outcomes — always HTTP 200, never routed to the handler.
pub fn unauthenticated_envelope() -> serde_json::Value {
    json!({
        "errors": [{
            "message": "unauthenticated",
            "extensions": { "code": "UNAUTHENTICATED" }
        }]
    })
}

pub fn bad_token_definition_envelope(detail: &str) -> serde_json::Value {
    json!({
        "errors": [{
            "message": "bad token definition",
            "extensions": { "code": "BAD_TOKEN_DEFINITION", "detail": detail }
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthenticated_envelope_carries_graphql_error_code() {
        let envelope = unauthenticated_envelope();
        assert_eq!(envelope["errors"][0]["extensions"]["code"], "UNAUTHENTICATED");
    }

    #[test]
    fn bad_token_definition_envelope_carries_detail() {
        let envelope = bad_token_definition_envelope("syntax error at or near \"x\"");
        assert_eq!(envelope["errors"][0]["extensions"]["code"], "BAD_TOKEN_DEFINITION");
        assert_eq!(
            envelope["errors"][0]["extensions"]["detail"],
            "syntax error at or near \"x\""
        );
    }
}
