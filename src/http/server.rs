//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler beneath the API prefix
//! - Wire up middleware (tracing, body limit)
//! - Bind server to listener, stop on shutdown signal
//! - Hand each request to the hedge dispatcher and relay the outcome

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::config::ProxyConfig;
use crate::hedge::{
    build_upstream_request, AttemptExecutor, CorrelationId, HedgeDispatcher, HttpAttemptExecutor,
    TargetError, UpstreamTarget,
};
use crate::http::request::read_inbound;
use crate::http::response::relay;
use crate::lifecycle::shutdown::wait_for;

/// Errors building the server from a validated config.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid upstream target: {0}")]
    Target(#[from] TargetError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<HedgeDispatcher>,
    pub target: Arc<UpstreamTarget>,
    pub max_body_size: usize,
}

/// HTTP server for the hedging proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a server that reaches the upstream over HTTP.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let connect_timeout = config
            .upstream
            .connect_timeout_ms
            .map(std::time::Duration::from_millis);
        let executor = HttpAttemptExecutor::new(connect_timeout)?;
        Self::with_executor(config, Arc::new(executor))
    }

    /// Create a server with a custom attempt executor.
    pub fn with_executor(
        config: ProxyConfig,
        executor: Arc<dyn AttemptExecutor>,
    ) -> Result<Self, ServerError> {
        let target = Arc::new(UpstreamTarget::from_config(&config.upstream)?);
        let dispatcher = Arc::new(HedgeDispatcher::new(executor, &config.hedge));

        let state = AppState {
            dispatcher,
            target,
            max_body_size: config.limits.max_body_size,
        };

        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let route = format!("{}/{{*path}}", state.target.path_prefix());
        Router::new()
            .route(&route, any(proxy_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_size))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.base_url,
            hedge_count = self.config.hedge.count,
            race_policy = ?self.config.hedge.race_policy,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(wait_for(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// The router, for driving the proxy without a socket.
    pub fn into_router(self) -> Router {
        self.router
    }
}

/// Main proxy handler.
/// Builds the upstream request, races the hedge attempts, relays the winner.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let inbound = match read_inbound(request, state.target.path_prefix(), state.max_body_size).await {
        Ok(inbound) => inbound,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected inbound request");
            return e.into_response();
        }
    };

    let id = CorrelationId::new();
    tracing::debug!(
        id = %id,
        method = %inbound.method,
        path = %inbound.path,
        stream = inbound.stream,
        hedge_count = state.dispatcher.hedge_count(),
        "Proxying request"
    );

    let upstream = build_upstream_request(&inbound, &state.target, id);
    relay(state.dispatcher.dispatch(upstream).await)
}
