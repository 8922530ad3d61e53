//! Shared exit list and the membership check consulted per request.

use crate::config::Config;
use crate::exit_list::{ExitListError, HttpListSource, ListSource, RelayList};
use crate::middleware::{default_rejection, RejectionHandler, TorBlockLayer};
use crate::scheduler::{RefreshScheduler, SchedulerHandle};
use axum::extract::Request;
use axum::response::Response;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Tor exit relay blocker.
///
/// Cheap to clone; clones share the same list, source and rejection
/// handler.
#[derive(Clone)]
pub struct TorBlock {
    inner: Arc<Inner>,
    rejection: RejectionHandler,
}

struct Inner {
    config: Config,
    source: Arc<dyn ListSource>,
    current: RwLock<Option<Arc<RelayList>>>,
    /// Held while the first on-demand fetch is in flight.
    initial_fetch: Mutex<()>,
}

impl TorBlock {
    /// Create a blocker that fetches from `config.exit_address_url`.
    ///
    /// Zero or empty settings fall back to their defaults (see
    /// [`Config::normalized`]); a URL that is still unusable is an error.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let config = config.normalized();
        config.validate()?;
        let source = HttpListSource::new(config.exit_address_url.clone(), config.timeout())?;
        Ok(Self::with_source(config, Arc::new(source)))
    }

    /// Create a blocker backed by an arbitrary list source.
    pub fn with_source(config: Config, source: Arc<dyn ListSource>) -> Self {
        let config = config.normalized();
        Self {
            inner: Arc::new(Inner {
                config,
                source,
                current: RwLock::new(None),
                initial_fetch: Mutex::new(()),
            }),
            rejection: Arc::new(default_rejection),
        }
    }

    /// Replace the response produced for blocked requests.
    pub fn with_rejection_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.rejection = Arc::new(handler);
        self
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Start periodic refreshes in the background.
    pub fn run(&self) -> SchedulerHandle {
        RefreshScheduler::new(self.clone(), self.inner.config.refresh_interval()).start()
    }

    /// Tower layer that screens requests before the wrapped service.
    pub fn layer(&self) -> TorBlockLayer {
        TorBlockLayer::new(self.clone())
    }

    /// Current list snapshot, if one has been loaded.
    pub fn current_list(&self) -> Option<Arc<RelayList>> {
        self.inner.snapshot()
    }

    /// Fetch a fresh list and swap it in, returning its record count.
    ///
    /// On failure the current list is left untouched.
    pub async fn refresh(&self) -> Result<usize, ExitListError> {
        let list = self.inner.source.fetch().await?;
        let count = list.len();
        self.replace(list);

        info!(
            source = self.inner.source.name(),
            exit_nodes = count,
            "Tor exit node list loaded"
        );

        Ok(count)
    }

    /// Install `list` as the current snapshot.
    pub fn replace(&self, list: RelayList) {
        let list = Arc::new(list);
        match self.inner.current.write() {
            Ok(mut current) => *current = Some(list),
            Err(poisoned) => *poisoned.into_inner() = Some(list),
        }
    }

    /// Check whether `addr` is a known exit address.
    ///
    /// Loads the list on first use. If that load fails the address is
    /// treated as not listed.
    pub async fn is_exit_node(&self, addr: &str) -> bool {
        let list = match self.inner.snapshot() {
            Some(list) => list,
            None => match self.load_on_demand().await {
                Some(list) => list,
                None => return false,
            },
        };

        match list.find(addr) {
            Some(record) => {
                if self.inner.config.log_blocked {
                    info!(ip = %addr, exit_node = %record.exit_node_id, "Tor exit node detected");
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn reject(&self, request: &Request) -> Response {
        (self.rejection)(request)
    }

    async fn load_on_demand(&self) -> Option<Arc<RelayList>> {
        let _guard = self.inner.initial_fetch.lock().await;

        // Another request may have finished the load while we waited.
        if let Some(list) = self.inner.snapshot() {
            return Some(list);
        }

        debug!("No Tor exit list loaded yet, fetching on demand");
        match self.refresh().await {
            Ok(_) => self.inner.snapshot(),
            Err(e) => {
                warn!(error = %e, "Failed to retrieve Tor exit node list");
                None
            }
        }
    }
}

impl Inner {
    fn snapshot(&self) -> Option<Arc<RelayList>> {
        match self.current.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
