//! Background task watching `LISTEN "schema:update"` on the metadata database and
//! invalidating cached tenants for the notified `database_id`, per spec.md §4.7.

use crate::flush::FlushDispatcher;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

const CHANNEL: &str = "schema:update";
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct NotifyListener {
    metadata_pool: PgPool,
    dispatcher: Arc<FlushDispatcher>,
}

impl NotifyListener {
    pub fn new(metadata_pool: PgPool, dispatcher: Arc<FlushDispatcher>) -> Self {
        Self { metadata_pool, dispatcher }
    }

    /// Runs forever, reconnecting with exponential backoff on failure. Intended to be
    /// spawned as a dedicated background task; does not return under normal operation.
    /// No proactive full-cache flush on reconnect — a degraded window is expected and
    /// recoverable via the `/flush` endpoint.
    pub async fn run(self) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match self.listen_once().await {
                Ok(()) => backoff = INITIAL_BACKOFF,
                Err(e) => {
                    warn!(error = %e, backoff_secs = backoff.as_secs(), "notify listener disconnected, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn listen_once(&self) -> Result<(), sqlx::Error> {
        let mut listener = PgListener::connect_with(&self.metadata_pool).await?;
        listener.listen(CHANNEL).await?;
        info!(channel = CHANNEL, "listening for schema update notifications");

        loop {
            let notification = listener.recv().await?;
            let payload = notification.payload();

            match Uuid::parse_str(payload) {
                Ok(database_id) => self.dispatcher.flush_service(database_id).await,
                Err(_) => error!(payload, "malformed schema:update payload, ignoring"),
            }
        }
    }
}
