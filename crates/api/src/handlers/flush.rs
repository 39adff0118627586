//! `POST /flush` (spec.md §4.8) — bearer-secret-gated cache eviction for one tenant.
//! The tenant identity comes from `tenant_context_middleware`'s resolve (§4.3), so this
//! handler does no DB lookup of its own; it only authenticates the caller, rate-limits,
//! and delegates to the same `FlushDispatcher` the NOTIFY listener (§4.7) uses.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use gateway_core::Error;
use gateway_tenancy::ApiStructure;
use serde_json::json;
use subtle::ConstantTimeEq;

use crate::error_handler::create_api_error_with_request_id;
use crate::state::AppState;
use crate::util::{bearer_token, client_ip};

pub async fn flush_handler(
    State(state): State<AppState>,
    Extension(api): Extension<ApiStructure>,
    request: Request,
) -> Response {
    let headers = request.headers().clone();
    let ip = client_ip(&headers, state.config.server.trust_proxy).unwrap_or_else(|| "unknown".to_string());

    if !state.flush_limiter.check(&ip) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": { "message": "flush rate limit exceeded" } })),
        )
            .into_response();
    }

    let secret = match gateway_core::Config::flush_secret() {
        Ok(secret) => secret,
        Err(_) => {
            return create_api_error_with_request_id(
                Error::internal("FLUSH_SECRET is not configured"),
                &request,
            )
            .into_response();
        }
    };

    let provided = bearer_token(&headers).unwrap_or_default();
    if provided.as_bytes().ct_eq(secret.as_bytes()).unwrap_u8() != 1 {
        return create_api_error_with_request_id(Error::unauthorized("invalid flush secret"), &request)
            .into_response();
    }

    state.flush_dispatcher.flush_service(api.database_id).await;

    Json(json!({ "status": "flushed", "database_id": api.database_id })).into_response()
}

#[cfg(test)]
mod tests {
    use subtle::ConstantTimeEq;

    #[test]
    fn constant_time_eq_rejects_mismatched_secrets() {
        assert_ne!(b"right".ct_eq(b"wrong").unwrap_u8(), 1);
        assert_eq!(b"right".ct_eq(b"right").unwrap_u8(), 1);
    }
}
