//! # Gateway API Server
//!
//! HTTP entry point for the multi-tenant GraphQL gateway. A request's path through this
//! binary is: resolve tenant (`gateway_tenancy::TenantResolver`) → authenticate
//! (`gateway_auth::AuthMiddleware`) → fetch-or-build a cached handler
//! (`gateway_tenancy::HandlerCache`) → dispatch. Cache invalidation arrives out-of-band
//! via Postgres LISTEN/NOTIFY (`gateway_tenancy::NotifyListener`) or the `/flush`
//! endpoint, both funneling through the same `FlushDispatcher`.
//!
//! ## Middleware Stack
//!
//! Requests flow through middleware in this order:
//! 1. **Security Headers**: HSTS, CSP, X-Frame-Options
//! 2. **Request ID**: unique tracking for request tracing
//! 3. **Tenant Context**: resolves the tenant and inserts `ApiStructure`/`RequestContext`
//! 4. **Tracing**: structured logging with correlation IDs
//! 5. **Compression**: gzip/brotli response compression
//! 6. **CORS**: cross-origin resource sharing policies

use axum::{http::StatusCode, response::IntoResponse, routing::{get, post}, Json, Router};
use gateway_auth::AuthMiddleware;
use gateway_core::{Config, CorsConfig, PoolRegistry};
use gateway_tenancy::{FlushDispatcher, FlushRateLimiter, HandlerCache, NotifyListener, ServiceCache, TenantResolver};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use axum::http::{HeaderName, HeaderValue, Method};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod engine;
mod error;
mod error_handler;
mod handlers;
mod api_middleware;
mod state;
mod util;

use crate::{engine::UnimplementedBuilder, handlers::{flush, graphiql, graphql, healthz}, state::AppState};

/// Builds a CORS layer from configuration settings.
fn build_cors_layer(cors_config: &CorsConfig) -> Result<CorsLayer, Box<dyn std::error::Error>> {
    let mut cors = CorsLayer::new();

    if cors_config.allowed_origins.contains(&"*".to_string()) {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Result<Vec<HeaderValue>, _> =
            cors_config.allowed_origins.iter().map(|origin| origin.parse()).collect();
        cors = cors.allow_origin(origins?);
    }

    if cors_config.allowed_methods.contains(&"*".to_string()) {
        cors = cors.allow_methods(Any);
    } else {
        let methods: Result<Vec<Method>, _> =
            cors_config.allowed_methods.iter().map(|method| method.parse()).collect();
        cors = cors.allow_methods(methods?);
    }

    if cors_config.allowed_headers.contains(&"*".to_string()) {
        cors = cors.allow_headers(Any);
    } else {
        let headers: Result<Vec<HeaderName>, _> =
            cors_config.allowed_headers.iter().map(|header| header.parse()).collect();
        cors = cors.allow_headers(headers?);
    }

    if !cors_config.expose_headers.is_empty() {
        let expose_headers: Result<Vec<HeaderName>, _> =
            cors_config.expose_headers.iter().map(|header| header.parse()).collect();
        cors = cors.expose_headers(expose_headers?);
    }

    cors = cors.allow_credentials(cors_config.allow_credentials);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting gateway server...");

    // `Config::load()` validates internally (meta_schemas non-empty, pool size bounds,
    // production CORS/admin-key checks) — no separate validation pass needed here.
    let config = Config::load()?;
    info!("Configuration loaded successfully");

    let metadata_pool = PgPoolOptions::new()
        .max_connections(config.pg.max_connections)
        .min_connections(config.pg.min_connections)
        .connect(&config.pg.url())
        .await?;
    info!("Metadata database pool initialized");

    let pools = PoolRegistry::new(
        config.pg.max_connections,
        config.pg.min_connections,
        Duration::from_secs(config.cache.pool_close_grace_seconds),
    );

    let service_cache = Arc::new(ServiceCache::new(config.cache.service_cache_size));
    let handler_cache = Arc::new(HandlerCache::with_ttl(
        pools.clone(),
        config.cache.handler_cache_size,
        config.cache.handler_ttl_seconds.map(Duration::from_secs),
    ));
    let resolver = Arc::new(TenantResolver::new(metadata_pool.clone(), service_cache.clone(), config.api.clone()));
    let auth = Arc::new(AuthMiddleware::new(config.server.strict_auth));
    let builder = Arc::new(UnimplementedBuilder) as Arc<dyn gateway_tenancy::BuildHandler>;
    let flush_dispatcher = Arc::new(FlushDispatcher::new(metadata_pool.clone(), service_cache.clone(), handler_cache.clone()));
    let flush_limiter = Arc::new(FlushRateLimiter::new(config.flush.requests_per_minute));

    let listener = NotifyListener::new(metadata_pool.clone(), flush_dispatcher.clone());
    tokio::spawn(listener.run());
    info!("Tenant invalidation listener started");

    let app_state = AppState {
        config: config.clone(),
        metadata_pool,
        pools,
        service_cache,
        handler_cache,
        resolver,
        auth,
        builder,
        flush_dispatcher,
        flush_limiter,
    };

    let app = create_app(app_state)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("Server shutdown complete");
    Ok(())
}

fn create_app(state: AppState) -> Result<Router, Box<dyn std::error::Error>> {
    let cors = build_cors_layer(&state.config.cors)?;

    // `/healthz` and `/graphiql` need no resolved tenant; `/graphql` and `/flush` do, so
    // only those two run behind `tenant_context_middleware`.
    let tenant_routes = Router::new()
        .route("/graphql", post(graphql::graphql_handler))
        .route("/flush", post(flush::flush_handler))
        .layer(axum::middleware::from_fn_with_state(state.clone(), api_middleware::tenant_context_middleware));

    let public_routes = Router::new()
        .route("/graphiql", get(graphiql::graphiql))
        .route("/healthz", get(healthz::healthz));

    let router = tenant_routes
        .merge(public_routes)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(api_middleware::security_headers::security_headers_middleware))
                .layer(axum::middleware::from_fn(api_middleware::request_id::request_id_middleware))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
        .fallback(handler_404);

    Ok(router)
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "Resource not found" })))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "gateway_api=debug,gateway_tenancy=debug,gateway_auth=debug,gateway_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
