//! Tor exit relay blocking middleware.
//!
//! Periodically downloads the Tor project's exit address list and rejects
//! HTTP requests whose remote address belongs to a listed exit relay.
//!
//! # Features
//!
//! - **Exit list parsing** - Reads the `ExitNode` / `Published` /
//!   `LastStatus` / `ExitAddress` document into typed records
//! - **Scheduled refresh** - Replaces the list wholesale on a fixed interval
//!   with a stoppable background task
//! - **Lazy first load** - The first request triggers a single fetch if no
//!   list has been loaded yet
//! - **Fail-open** - If the list cannot be fetched, traffic is allowed
//! - **Pluggable rejection** - Blocked callers get `500 Bad Host` unless a
//!   custom handler is installed
//!
//! # Example
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use std::net::SocketAddr;
//! use tor_exit_block::{Config, TorBlock};
//!
//! # async fn serve() -> anyhow::Result<()> {
//! let guard = TorBlock::new(Config::default())?;
//! let _scheduler = guard.run();
//!
//! let app = Router::new()
//!     .route("/", get(|| async { "hello" }))
//!     .layer(guard.layer());
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(
//!     listener,
//!     app.into_make_service_with_connect_info::<SocketAddr>(),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod exit_list;
pub mod filter;
pub mod middleware;
pub mod scheduler;

pub use config::Config;
pub use exit_list::{ExitAddress, ExitListError, ListSource, RelayList, RelayRecord};
pub use filter::TorBlock;
pub use middleware::{tor_block, TorBlockLayer, TorBlockService};
pub use scheduler::{RefreshScheduler, SchedulerHandle};
