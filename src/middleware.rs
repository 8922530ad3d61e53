//! Request screening for axum and tower stacks.
//!
//! Two forms are provided:
//!
//! - [`TorBlockLayer`] wraps a whole service:
//!   `router.layer(guard.layer())`
//! - [`tor_block`] is a `next`-style step:
//!   `router.layer(axum::middleware::from_fn_with_state(guard, tor_block))`
//!
//! Both read the caller address from [`ConnectInfo`], so the server must be
//! started with `into_make_service_with_connect_info::<SocketAddr>()`.

use crate::filter::TorBlock;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::debug;

/// Produces the response sent to blocked callers.
pub type RejectionHandler = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

/// Default rejection: `500 Bad Host`.
pub fn default_rejection(_request: &Request) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Bad Host").into_response()
}

/// Host part of the connection's remote address, if the server recorded it.
pub fn remote_host(request: &Request) -> Option<String> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

impl TorBlock {
    /// Screen a request. Hands the request back when it may proceed, or the
    /// rejection response when the caller is a listed exit relay.
    pub async fn screen(&self, request: Request) -> Result<Request, Response> {
        let Some(host) = remote_host(&request) else {
            debug!("No connection info on request, skipping Tor exit check");
            return Ok(request);
        };

        if self.is_exit_node(&host).await {
            debug!(ip = %host, uri = %request.uri(), "Rejecting request from Tor exit node");
            Err(self.reject(&request))
        } else {
            Ok(request)
        }
    }
}

/// `next`-style middleware for `axum::middleware::from_fn_with_state`.
pub async fn tor_block(State(guard): State<TorBlock>, request: Request, next: Next) -> Response {
    match guard.screen(request).await {
        Ok(request) => next.run(request).await,
        Err(rejection) => rejection,
    }
}

/// Layer applying [`TorBlockService`] to an inner service.
#[derive(Clone)]
pub struct TorBlockLayer {
    guard: TorBlock,
}

impl TorBlockLayer {
    pub fn new(guard: TorBlock) -> Self {
        Self { guard }
    }
}

impl<S> Layer<S> for TorBlockLayer {
    type Service = TorBlockService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TorBlockService {
            inner,
            guard: self.guard.clone(),
        }
    }
}

/// Service that rejects exit relay traffic before it reaches `inner`.
#[derive(Clone)]
pub struct TorBlockService<S> {
    inner: S,
    guard: TorBlock,
}

impl<S> Service<Request> for TorBlockService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let guard = self.guard.clone();
        // Take the service that was driven to readiness; leave a fresh clone.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match guard.screen(request).await {
                Ok(request) => inner.call(request).await,
                Err(rejection) => Ok(rejection),
            }
        })
    }
}
