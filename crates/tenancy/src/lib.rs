pub mod cache;
pub mod flush;
pub mod handler_cache;
pub mod listener;
pub mod resolver;
pub mod types;

pub use cache::ServiceCache;
pub use flush::{FlushDispatcher, FlushRateLimiter};
pub use handler_cache::HandlerCache;
pub use listener::NotifyListener;
pub use resolver::{ResolveError, ResolveRequest, TenantResolver};
pub use types::{
    ApiModule, ApiStructure, BuildHandler, Handler, HandlerEntry, HandlerSpec, RequestContext,
    RlsModule, TenantKey, Token,
};
