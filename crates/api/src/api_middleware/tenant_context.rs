//! Tenant Context Middleware
//!
//! Runs the five-step resolve algorithm (`gateway_tenancy::TenantResolver`) against the
//! inbound request's host and routing headers, per spec.md §4.3, and attaches the
//! resulting `ApiStructure` and `gateway_tenancy::RequestContext` to the request's
//! extensions for every downstream handler to read.

use crate::error_handler::create_api_error_with_request_id;
use crate::state::AppState;
use crate::util::{client_ip, header_flag, header_list, header_str};
use axum::{
    extract::{Host, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use gateway_core::error::RequestContext as CorrelationContext;
use gateway_tenancy::{RequestContext, ResolveRequest};
use uuid::Uuid;

pub async fn tenant_context_middleware(
    State(state): State<AppState>,
    Host(host): Host,
    mut req: Request,
    next: Next,
) -> Response {
    let headers = req.headers().clone();

    let resolve_request = ResolveRequest {
        host: Some(host),
        x_api_name: header_str(&headers, "x-api-name"),
        x_schemata: header_list(&headers, "x-schemata"),
        x_meta_schema: header_flag(&headers, "x-meta-schema"),
    };

    match state.resolver.resolve(&resolve_request).await {
        Ok((tenant_key, api)) => {
            let request_id = req
                .extensions()
                .get::<CorrelationContext>()
                .map(|ctx| ctx.request_id.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string());

            let mut context = RequestContext::new(request_id);
            context.tenant_key = Some(tenant_key);
            context.ip_address = client_ip(&headers, state.config.server.trust_proxy);
            context.origin = header_str(&headers, "origin");
            context.user_agent = header_str(&headers, "user-agent");

            req.extensions_mut().insert(api);
            req.extensions_mut().insert(context);
            next.run(req).await
        }
        Err(e) => create_api_error_with_request_id(e.into(), &req).into_response(),
    }
}
