//! Request dispatcher: the single consumer of the request queue.
//!
//! # Per-request State Machine
//! ```text
//! Received        plain transport      → 302 https://<host><path>
//! Authenticating  no identity          → CAS client already redirected
//! Routing         /app                 → 302 /app/
//! OriginCheck     foreign Origin/Referer → 400
//! Dispatch        static file          → bytes + content type
//!                 dynamic              → CSRF check → handler
//! Respond         GateError            → status + message (500 for faults)
//! ```
//!
//! # Design Decisions
//! - Exactly one request is resolved at a time, including the outbound CAS
//!   validation call. A slow handler or a hung CAS server stalls everyone;
//!   in exchange the session cache needs no locking
//! - Every stage returns `Result<(), GateError>` and the error is mapped to
//!   a response in one place
//! - A response that cannot be delivered is logged and dropped; it never
//!   stops the loop

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::Instant;

use axum::http::{header, Method, StatusCode};
use tokio::sync::mpsc;
use url::Url;

use crate::auth::cas::CasClient;
use crate::auth::csrf::{self, CSRF_PARAM};
use crate::auth::validator::ValidationError;
use crate::config::GateConfig;
use crate::error::GateError;
use crate::http::handler::{Content, Handler};
use crate::http::request::RequestContext;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::routing::resolver::{ContentType, RouteOutcome, StaticResolver};
use crate::routing::template::{self, Substitutions};

/// Values the dispatcher needs from configuration.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub app_name: String,
    pub public_host: String,
    pub own_origin: String,
}

impl DispatchSettings {
    pub fn from_config(config: &GateConfig) -> Self {
        Self {
            app_name: config.application.name.clone(),
            public_host: config.application.public_host.clone(),
            own_origin: config.own_origin(),
        }
    }
}

/// Resolves requests one at a time.
pub struct Dispatcher {
    settings: DispatchSettings,
    cas: CasClient,
    resolver: StaticResolver,
    handler: Box<dyn Handler>,
}

impl Dispatcher {
    pub fn new(config: &GateConfig, cas: CasClient, handler: Box<dyn Handler>) -> Self {
        Self {
            settings: DispatchSettings::from_config(config),
            cas,
            resolver: StaticResolver::new(&config.application),
            handler,
        }
    }

    /// Dispatcher with an HTTP CAS validator and a wall-clock session cache.
    pub fn from_config(
        config: &GateConfig,
        handler: Box<dyn Handler>,
    ) -> Result<Self, ValidationError> {
        Ok(Self::new(config, CasClient::from_config(config)?, handler))
    }

    pub fn cas(&self) -> &CasClient {
        &self.cas
    }

    /// Serve requests from `queue` until shutdown is triggered or every
    /// sender is gone.
    pub async fn run(mut self, mut queue: mpsc::Receiver<RequestContext>, shutdown: Shutdown) {
        tracing::info!(app = %self.settings.app_name, "Dispatcher started");

        while shutdown.is_running() {
            let next = tokio::select! {
                next = queue.recv() => next,
                _ = shutdown.wait() => None,
            };
            let Some(ctx) = next else {
                break;
            };
            self.dispatch(ctx).await;
        }

        tracing::info!("Dispatcher stopped");
    }

    /// Fully resolve one request and deliver its response.
    pub async fn dispatch(&mut self, mut ctx: RequestContext) {
        let start = Instant::now();
        let mut route = "received";

        let delivered = match self.process(&mut ctx, &mut route).await {
            Ok(()) => Ok(()),
            Err(err) => respond_error(&mut ctx, err),
        };

        if let Err(e) = delivered {
            tracing::warn!(error = %e, path = %ctx.path(), "Response could not be delivered, discarding");
        } else if !ctx.response.is_closed() {
            if let Err(e) = ctx.response.close() {
                tracing::warn!(error = %e, "Response could not be delivered, discarding");
            }
        }

        let status = ctx.response.status();
        tracing::debug!(
            method = %ctx.method(),
            path = %ctx.path(),
            status = status.as_u16(),
            route = route,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Request resolved"
        );
        metrics::record_request(ctx.method().as_str(), status.as_u16(), route, start);
    }

    async fn process(
        &mut self,
        ctx: &mut RequestContext,
        route: &mut &'static str,
    ) -> Result<(), GateError> {
        if !ctx.is_secure() {
            *route = "insecure";
            let target = format!("https://{}{}", self.settings.public_host, ctx.path_and_query());
            tracing::debug!(target = %target, "Redirecting plain HTTP request");
            return ctx.response.redirect(&target);
        }

        *route = "auth";
        let Some(identity) = self.cas.authenticate(ctx).await? else {
            return Ok(());
        };

        let outcome = self.resolver.classify(ctx.path())?;
        if !matches!(outcome, RouteOutcome::Redirect(_)) {
            *route = "rejected";
            self.check_origin(ctx)?;
        }

        match outcome {
            RouteOutcome::Redirect(target) => {
                *route = "root";
                ctx.response.redirect(&target)
            }
            RouteOutcome::StaticFile { path, content_type } => {
                *route = "static";
                self.serve_file(ctx, &identity, &path, content_type).await
            }
            RouteOutcome::Dynamic => {
                *route = "dynamic";
                self.serve_dynamic(ctx, &identity)
            }
        }
    }

    /// Reject requests whose Origin is not this service or whose Referer
    /// points at another authority.
    fn check_origin(&self, ctx: &RequestContext) -> Result<(), GateError> {
        if let Some(origin) = ctx.headers().get(header::ORIGIN) {
            let matches = origin
                .to_str()
                .map(|o| o.trim_end_matches('/').eq_ignore_ascii_case(&self.settings.own_origin))
                .unwrap_or(false);
            if !matches {
                tracing::warn!(origin = ?origin, path = %ctx.path(), "Cross-origin request rejected");
                return Err(GateError::bad_request("Cross-origin request rejected"));
            }
        }

        if let Some(referer) = ctx.headers().get(header::REFERER) {
            let own = request_authority(ctx).unwrap_or(self.settings.public_host.as_str());
            let same = referer
                .to_str()
                .ok()
                .and_then(referer_authority)
                .map(|authority| authority.eq_ignore_ascii_case(own))
                .unwrap_or(false);
            if !same {
                tracing::warn!(referer = ?referer, path = %ctx.path(), "Cross-site referer rejected");
                return Err(GateError::bad_request("Cross-site request rejected"));
            }
        }

        Ok(())
    }

    async fn serve_file(
        &self,
        ctx: &mut RequestContext,
        identity: &str,
        path: &Path,
        content_type: ContentType,
    ) -> Result<(), GateError> {
        if ctx.method() != Method::GET && ctx.method() != Method::HEAD {
            return Err(GateError::status(
                StatusCode::METHOD_NOT_ALLOWED,
                "Static resources only accept GET",
            ));
        }

        let is_file = tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(GateError::not_found(format!("Not found: {}", ctx.path())));
        }

        let bytes = tokio::fs::read(path).await?;
        let body = if content_type.binary {
            bytes
        } else {
            let text = String::from_utf8(bytes).map_err(|e| {
                GateError::internal(format!("{} is not valid UTF-8: {}", path.display(), e))
            })?;
            let subs = Substitutions {
                csrf_token: ctx.csrf_token().unwrap_or_default(),
                identity,
                app: &self.settings.app_name,
            };
            template::render(&text, &subs).into_bytes()
        };

        ctx.response.set_header(header::CONTENT_TYPE, content_type.mime)?;
        ctx.response.send(body)
    }

    fn serve_dynamic(&self, ctx: &mut RequestContext, identity: &str) -> Result<(), GateError> {
        let mut params = ctx.params();
        if !params.is_empty() {
            let submitted = params.remove(CSRF_PARAM);
            csrf::verify(ctx.csrf_token(), submitted.as_deref())?;
        }

        let handler = &self.handler;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            handler.handle(ctx, identity, &params)
        }));
        let content = match outcome {
            Ok(result) => result?,
            Err(panic) => {
                return Err(GateError::internal(format!(
                    "handler panicked: {}",
                    panic_message(panic.as_ref())
                )))
            }
        };

        write_content(ctx, content)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("settings", &self.settings)
            .field("cas", &self.cas)
            .field("resolver", &self.resolver)
            .finish()
    }
}

fn write_content(ctx: &mut RequestContext, content: Content) -> Result<(), GateError> {
    let (default_type, body) = match content {
        Content::Responded => {
            if !ctx.response.is_closed() {
                tracing::warn!(path = %ctx.path(), "Handler reported a finished response but left it open");
                ctx.response.close()?;
            }
            return Ok(());
        }
        Content::Text(text) => ("text/html; charset=utf-8", text.into_bytes()),
        Content::Json(value) => (
            "application/json",
            serde_json::to_vec(&value).map_err(|e| GateError::internal(e.to_string()))?,
        ),
        Content::Bytes(bytes) => ("application/octet-stream", bytes),
    };

    if !ctx.response.headers().contains_key(header::CONTENT_TYPE) {
        ctx.response.set_header(header::CONTENT_TYPE, default_type)?;
    }
    ctx.response.send(body)
}

/// Map an error to its response. Transport faults are passed back up.
fn respond_error(ctx: &mut RequestContext, err: GateError) -> Result<(), GateError> {
    if matches!(err, GateError::Transport(_)) {
        return Err(err);
    }

    if err.is_unexpected() {
        tracing::error!(error = %err, method = %ctx.method(), path = %ctx.path(), "Request failed");
    } else {
        tracing::debug!(error = %err, path = %ctx.path(), "Request rejected");
    }

    if ctx.response.is_closed() {
        return Ok(());
    }

    ctx.response.set_status(err.status_code());
    ctx.response
        .set_header(header::CONTENT_TYPE, "text/plain; charset=utf-8")?;
    ctx.response.send(err.public_message())
}

/// Authority the client addressed: Host header, else the URI authority (HTTP/2).
fn request_authority(ctx: &RequestContext) -> Option<&str> {
    ctx.header(header::HOST)
        .or_else(|| ctx.uri().authority().map(|a| a.as_str()))
}

fn referer_authority(referer: &str) -> Option<String> {
    let url = Url::parse(referer).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
