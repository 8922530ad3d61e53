//! HTTP retrieval of the exit address document.

use super::{parse_exit_list, ExitListError, ListSource, RelayList};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Fetches the exit list with a plain unauthenticated GET.
pub struct HttpListSource {
    client: Client,
    url: String,
}

impl HttpListSource {
    /// Create a source for `url` whose requests give up after `timeout`.
    ///
    /// Fails only if the HTTP client cannot be built (for example when no
    /// TLS backend is available). That is a setup problem, not a fetch.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ListSource for HttpListSource {
    async fn fetch(&self) -> Result<RelayList, ExitListError> {
        debug!(url = %self.url, "Fetching Tor exit address list");

        let content = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        info!(url = %self.url, "Retrieved Tor exit address list");

        let records = parse_exit_list(&content)?;
        Ok(RelayList::new(records))
    }

    fn name(&self) -> &str {
        &self.url
    }
}
