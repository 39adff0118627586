//! The GraphQL execution engine is explicitly out of scope (spec.md §1): this crate
//! wires the `gateway_tenancy::BuildHandler` factory boundary but does not implement a
//! query planner/executor behind it. `UnimplementedBuilder` is that boundary's default,
//! minimal implementation — every dispatch returns `NotImplemented` rather than the
//! gateway pretending to execute GraphQL it was never asked to parse.

use async_trait::async_trait;
use gateway_core::{Error, ErrorCode};
use gateway_tenancy::{BuildHandler, Handler, HandlerSpec};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub struct UnimplementedBuilder;

struct UnimplementedHandler {
    dbname: String,
}

#[async_trait]
impl Handler for UnimplementedHandler {
    async fn dispatch(&self, _settings: HashMap<String, String>, _body: Value) -> Result<Value, Error> {
        Err(Error::new(
            ErrorCode::NotImplemented,
            format!("no GraphQL execution engine is wired in for database '{}'", self.dbname),
        ))
    }
}

#[async_trait]
impl BuildHandler for UnimplementedBuilder {
    async fn build(&self, spec: HandlerSpec) -> Result<Arc<dyn Handler>, Error> {
        Ok(Arc::new(UnimplementedHandler { dbname: spec.api.dbname }))
    }
}
