//! HTTP front door.
//!
//! # Responsibilities
//! - Bind the plain HTTP listener and, when configured, the HTTPS listener
//! - Wire up middleware (request ID, tracing, timeout)
//! - Buffer each request and queue it for the dispatcher
//! - Hand the dispatcher's response back to the waiting connection
//!
//! # Design Decisions
//! - Every path goes to one fallback handler; routing is the dispatcher's job
//! - The queue is bounded, so a stalled dispatcher pushes back on clients
//!   instead of buffering without limit
//! - The dispatcher runs as one task and is the only reader of the queue

use std::path::Path;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::config::GateConfig;
use crate::http::dispatcher::Dispatcher;
use crate::http::request::RequestContext;
use crate::http::response::ResponseSink;
use crate::lifecycle::Shutdown;
use crate::net::{listener, tls, ListenerError};

/// Time listeners get to drain open connections after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Error type for running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// UUID v4 `x-request-id` for every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// State shared by the connection handlers of one listener.
#[derive(Clone)]
struct FrontDoor {
    queue: mpsc::Sender<RequestContext>,
    secure: bool,
    trust_forwarded_proto: bool,
    max_body_bytes: usize,
}

/// HTTP server: listeners plus the dispatcher task.
pub struct HttpServer {
    config: GateConfig,
    dispatcher: Dispatcher,
    shutdown: Shutdown,
}

impl HttpServer {
    pub fn new(config: GateConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            dispatcher,
            shutdown: Shutdown::new(),
        }
    }

    /// Continuation flag shared with the dispatcher and listeners.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Build the router for one listener.
    fn build_router(config: &GateConfig, queue: mpsc::Sender<RequestContext>, secure: bool) -> Router {
        let front = FrontDoor {
            queue,
            secure,
            trust_forwarded_proto: config.listener.trust_forwarded_proto,
            max_body_bytes: config.listener.max_body_bytes,
        };
        #[allow(deprecated)]
        let timeout = TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs));

        Router::new()
            .fallback(enqueue_handler)
            .with_state(front)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(timeout),
            )
    }

    /// Run until shutdown is triggered or a listener fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let HttpServer {
            config,
            dispatcher,
            shutdown,
        } = self;

        let (queue_tx, queue_rx) = mpsc::channel(config.listener.queue_depth);
        let dispatch_task = tokio::spawn(dispatcher.run(queue_rx, shutdown.clone()));

        let plain = {
            let router = Self::build_router(&config, queue_tx.clone(), false);
            let shutdown = shutdown.clone();
            let address = config.listener.bind_address.clone();
            async move {
                let result = serve_plain(&address, router, shutdown.clone()).await;
                if result.is_err() {
                    shutdown.trigger();
                }
                result
            }
        };

        let secure = {
            let router = Self::build_router(&config, queue_tx.clone(), true);
            let shutdown = shutdown.clone();
            let tls = config.listener.tls.clone();
            let address = config.listener.tls_bind_address.clone();
            async move {
                let Some(tls) = tls else {
                    tracing::warn!("No TLS configured; relying on a trusted proxy for HTTPS");
                    return Ok(());
                };
                let result = serve_tls(&address, &tls, router, shutdown.clone()).await;
                if result.is_err() {
                    shutdown.trigger();
                }
                result
            }
        };
        drop(queue_tx);

        let (plain_result, secure_result) = tokio::join!(plain, secure);
        shutdown.trigger();
        if let Err(e) = dispatch_task.await {
            tracing::error!(error = %e, "Dispatcher task failed");
        }

        plain_result?;
        secure_result?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn serve_plain(address: &str, router: Router, shutdown: Shutdown) -> Result<(), ServerError> {
    let listener = listener::bind(address).await?;
    tracing::info!(address = %address, "HTTP listener starting");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;
    Ok(())
}

async fn serve_tls(
    address: &str,
    tls: &crate::config::TlsConfig,
    router: Router,
    shutdown: Shutdown,
) -> Result<(), ServerError> {
    let addr = listener::parse_address(address)?;
    let rustls = tls::load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;

    let handle = axum_server::Handle::new();
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            shutdown.wait().await;
            handle.graceful_shutdown(Some(DRAIN_TIMEOUT));
        });
    }

    tracing::info!(address = %addr, "HTTPS listener starting");
    axum_server::bind_rustls(addr, rustls)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}

/// Queue the request for the dispatcher and wait for its response.
async fn enqueue_handler(State(front): State<FrontDoor>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, front.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, path = %parts.uri.path(), "Request body rejected");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let secure = front.secure || (front.trust_forwarded_proto && forwarded_https(&parts.headers));
    let (sink, reply) = ResponseSink::channel();
    let ctx = RequestContext::from_parts(parts, body, secure, sink);

    if front.queue.send(ctx).await.is_err() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Service is shutting down").into_response();
    }

    match reply.await {
        Ok(response) => response,
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response(),
    }
}

fn forwarded_https(headers: &HeaderMap) -> bool {
    headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|proto| proto.trim().eq_ignore_ascii_case("https"))
        .unwrap_or(false)
}
