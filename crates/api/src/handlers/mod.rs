//! HTTP handlers for the gateway's routes.

pub mod flush;
pub mod graphiql;
pub mod graphql;
pub mod healthz;
