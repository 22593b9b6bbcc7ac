use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use parley_db::Database;
use parley_gateway::Broker;
use parley_gateway::longpoll::DEFAULT_SLICE;

use crate::bridge::Bridge;
use crate::error::ServiceError;

pub type AppState = Arc<AppStateInner>;

/// Tunables of the chat service. Plain values; the binary fills them from
/// the environment.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Longest single park inside a long-poll before re-reading.
    pub poll_slice: Duration,
    /// Long-poll duration when the client does not ask for one.
    pub default_wait: Duration,
    /// Upper bound on any requested long-poll duration.
    pub max_wait: Duration,
    /// Upper bound on `get_messages` page size.
    pub max_page_size: u32,
    /// Hard limit on one bridge call, on top of the bridge's own timeout.
    pub bridge_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            poll_slice: DEFAULT_SLICE,
            default_wait: Duration::from_secs(30),
            max_wait: Duration::from_secs(120),
            max_page_size: 500,
            bridge_timeout: Duration::from_secs(15),
        }
    }
}

/// The conversation service: store, wake broker and bot bridge.
pub struct AppStateInner {
    pub db: Arc<Database>,
    pub broker: Broker,
    pub bridge: Arc<dyn Bridge>,
    pub config: ServiceConfig,
}

impl AppStateInner {
    pub fn new(
        db: Database,
        broker: Broker,
        bridge: Arc<dyn Bridge>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            db: Arc::new(db),
            broker,
            bridge,
            config,
        }
    }

    /// Run blocking store work off the async runtime.
    pub(crate) async fn run_blocking<F, T>(&self, f: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&Database) -> Result<T, ServiceError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ServiceError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
            })?
    }
}
