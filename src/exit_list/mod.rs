//! Tor exit relay list: records, parsing and retrieval.

pub mod fetcher;
pub mod parser;

pub use fetcher::HttpListSource;
pub use parser::{parse_exit_list, TIME_FORMAT};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Address a relay was last seen exiting traffic from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitAddress {
    pub ip_address: String,
    /// `None` when the timestamp was missing or unparsable.
    pub observed_at: Option<DateTime<Utc>>,
}

/// One relay entry from the exit address document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayRecord {
    /// Relay fingerprint. Records without one are never emitted.
    pub exit_node_id: String,
    pub published_at: Option<DateTime<Utc>>,
    pub last_status_at: Option<DateTime<Utc>>,
    pub exit_address: ExitAddress,
}

/// Immutable snapshot of the relay list produced by one fetch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayList {
    records: Vec<RelayRecord>,
    fetched_at: DateTime<Utc>,
}

impl RelayList {
    /// Wrap parsed records, stamping them with the current time.
    pub fn new(records: Vec<RelayRecord>) -> Self {
        Self {
            records,
            fetched_at: Utc::now(),
        }
    }

    pub fn records(&self) -> &[RelayRecord] {
        &self.records
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Find the first record whose exit address equals `addr`.
    ///
    /// Comparison is lexical and ASCII case-insensitive; addresses are not
    /// normalized, so `::1` and `0:0:0:0:0:0:0:1` are different entries.
    pub fn find(&self, addr: &str) -> Option<&RelayRecord> {
        self.records
            .iter()
            .find(|record| record.exit_address.ip_address.eq_ignore_ascii_case(addr))
    }

    /// Check whether `addr` is a listed exit address.
    pub fn contains_address(&self, addr: &str) -> bool {
        self.find(addr).is_some()
    }
}

/// Failure of a single fetch cycle.
#[derive(Error, Debug)]
pub enum ExitListError {
    /// The source could not be reached or answered with a non-success status.
    #[error("failed to fetch exit list: {0}")]
    Fetch(#[from] reqwest::Error),

    /// The document did not have the expected record structure.
    #[error("malformed exit list at line {line}: `{tag}` needs {expected} fields, found {found}")]
    Format {
        line: usize,
        tag: String,
        expected: usize,
        found: usize,
    },
}

impl ExitListError {
    pub fn is_fetch(&self) -> bool {
        matches!(self, ExitListError::Fetch(_))
    }

    pub fn is_format(&self) -> bool {
        matches!(self, ExitListError::Format { .. })
    }
}

/// Somewhere a complete relay list can be loaded from.
#[async_trait]
pub trait ListSource: Send + Sync {
    /// Retrieve and parse a fresh list.
    async fn fetch(&self) -> Result<RelayList, ExitListError>;

    /// Source name for logging.
    fn name(&self) -> &str;
}
