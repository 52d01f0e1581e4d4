//! CAS authentication client.
//!
//! # Handshake
//! ```text
//! day rolled over?        → flush session cache
//! session cookie cached?  → identity                        (done)
//!     with ?ticket=       → 302 app root                     (redirected)
//! stale cookie            → Set-Cookie deletion, continue
//! ?ticket= present        → serviceValidate
//!     success             → Set-Cookie, 302 app root         (redirected)
//!     failure             → log, continue
//! GET                     → 302 {cas}/logon?service=..       (redirected)
//! anything else           → NotReplayable
//! ```
//!
//! # Design Decisions
//! - The validated service ticket is reused as the session cookie value and
//!   as the CSRF token. It already carries CAS-grade randomness, so no second
//!   secret is minted; the cost is that a single-use value lives on as a
//!   day-long session token
//! - After a successful validation the user lands on the application root,
//!   never on the deep link carried through the external redirect chain

use axum::http::Method;

use crate::auth::session::SessionCache;
use crate::auth::validator::{cas_endpoint, HttpTicketValidator, TicketValidator, ValidationError};
use crate::config::GateConfig;
use crate::error::GateError;
use crate::http::request::RequestContext;
use crate::observability::metrics;

/// Query parameter CAS uses to hand back a service ticket.
pub const TICKET_PARAM: &str = "ticket";

/// Static parts of the handshake derived from configuration.
#[derive(Debug, Clone)]
pub struct CasSettings {
    /// Absolute URL of the CAS login endpoint.
    pub login_url: String,
    pub cookie_name: String,
    /// Application root, e.g. `/app/`. Scopes the cookie and is the
    /// post-login landing page.
    pub app_root: String,
    /// Authority clients use to reach this service.
    pub public_host: String,
}

impl CasSettings {
    pub fn from_config(config: &GateConfig) -> Self {
        Self {
            login_url: cas_endpoint(&config.cas.server_url, &config.cas.login_path),
            cookie_name: config.cookie_name(),
            app_root: format!("/{}/", config.application.name),
            public_host: config.application.public_host.clone(),
        }
    }
}

/// Runs the CAS handshake for each request and owns the session cache.
pub struct CasClient {
    settings: CasSettings,
    sessions: SessionCache,
    validator: Box<dyn TicketValidator>,
}

impl CasClient {
    pub fn new(
        settings: CasSettings,
        sessions: SessionCache,
        validator: Box<dyn TicketValidator>,
    ) -> Self {
        Self {
            settings,
            sessions,
            validator,
        }
    }

    /// Client with the wall-clock session cache and an HTTP validator.
    pub fn from_config(config: &GateConfig) -> Result<Self, ValidationError> {
        let validator = HttpTicketValidator::from_config(&config.cas)?;
        Ok(Self::new(
            CasSettings::from_config(config),
            SessionCache::default(),
            Box::new(validator),
        ))
    }

    pub fn settings(&self) -> &CasSettings {
        &self.settings
    }

    pub fn sessions(&self) -> &SessionCache {
        &self.sessions
    }

    /// Authenticate the request.
    ///
    /// Returns `Some(identity)` for an established session, or `None` after
    /// writing and closing a redirect on `ctx.response`.
    pub async fn authenticate(
        &mut self,
        ctx: &mut RequestContext,
    ) -> Result<Option<String>, GateError> {
        self.sessions.roll_over();

        if let Some(identity) = self.resume_session(ctx)? {
            if ctx.query_param(TICKET_PARAM).is_some() {
                // Signed in already; the returning ticket is not redeemed.
                tracing::debug!(identity = %identity, "Ticket on an established session, redirecting to root");
                metrics::record_auth("ticket_ignored");
                ctx.response.redirect(&self.settings.app_root)?;
                return Ok(None);
            }
            return Ok(Some(identity));
        }

        if let Some(ticket) = ctx.query_param(TICKET_PARAM) {
            if self.redeem_ticket(ctx, &ticket).await? {
                return Ok(None);
            }
        }

        self.redirect_to_login(ctx)?;
        Ok(None)
    }

    /// Look up the session cookie. A cookie the cache does not know is
    /// deleted on the client.
    fn resume_session(&self, ctx: &mut RequestContext) -> Result<Option<String>, GateError> {
        let mut presented = false;
        let mut hit = None;
        for value in ctx.cookies(&self.settings.cookie_name) {
            presented = true;
            if let Some(identity) = self.sessions.identity(value) {
                hit = Some((value.to_string(), identity.to_string()));
                break;
            }
        }

        if let Some((ticket, identity)) = hit {
            ctx.set_session(ticket);
            metrics::record_auth("session");
            return Ok(Some(identity));
        }

        if presented {
            tracing::debug!(cookie = %self.settings.cookie_name, "Unknown session cookie, deleting");
            metrics::record_auth("stale_cookie");
            ctx.response.add_cookie(&self.expired_cookie())?;
        }
        Ok(None)
    }

    /// Validate `ticket` with CAS. Returns true when a session was created
    /// and the redirect to the application root has been written.
    async fn redeem_ticket(
        &mut self,
        ctx: &mut RequestContext,
        ticket: &str,
    ) -> Result<bool, GateError> {
        let url = ctx.absolute_url(&self.settings.public_host);
        let Some(service) = strip_ticket(&url) else {
            tracing::error!(url = %url, "Ticket parameter present but could not be stripped from the service URL");
            return Ok(false);
        };

        let identity = match self.validator.validate(service, ticket).await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(error = %e, service = %service, "Service ticket validation failed");
                metrics::record_auth("validation_failed");
                return Ok(false);
            }
        };

        let session = self.sessions.establish(ticket, &identity);
        tracing::info!(
            identity = %identity,
            reused = session != ticket,
            sessions = self.sessions.len(),
            "CAS login succeeded"
        );
        metrics::record_auth("ticket");

        ctx.response.add_cookie(&self.session_cookie(&session))?;
        ctx.response.redirect(&self.settings.app_root)?;
        Ok(true)
    }

    fn redirect_to_login(&self, ctx: &mut RequestContext) -> Result<(), GateError> {
        if ctx.method() != Method::GET {
            return Err(GateError::NotReplayable {
                method: ctx.method().clone(),
            });
        }

        let url = ctx.absolute_url(&self.settings.public_host);
        let service = match ctx.query_param(TICKET_PARAM) {
            Some(_) => strip_ticket(&url).unwrap_or(url.as_str()),
            None => url.as_str(),
        };

        let target = self.login_url(service);
        tracing::debug!(service = %service, "Redirecting to CAS login");
        metrics::record_auth("login_redirect");
        ctx.response.redirect(&target)
    }

    /// CAS login URL for `service`.
    pub fn login_url(&self, service: &str) -> String {
        format!("{}?service={}", self.settings.login_url, escape(service))
    }

    fn session_cookie(&self, value: &str) -> String {
        format!(
            "{}={}; Path={}; Secure; HttpOnly",
            self.settings.cookie_name, value, self.settings.app_root
        )
    }

    fn expired_cookie(&self) -> String {
        format!(
            "{}=; Path={}; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Secure; HttpOnly",
            self.settings.cookie_name, self.settings.app_root
        )
    }
}

impl std::fmt::Debug for CasClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CasClient")
            .field("settings", &self.settings)
            .field("sessions", &self.sessions)
            .finish()
    }
}

/// Strip the trailing `ticket=` parameter CAS appended to a service URL.
///
/// Returns `None` when the URL does not end in a `ticket` parameter.
pub fn strip_ticket(url: &str) -> Option<&str> {
    let marker = format!("{}=", TICKET_PARAM);
    let start = url.rfind(&marker)?;
    let separator = start.checked_sub(1)?;

    if !matches!(url.as_bytes()[separator], b'?' | b'&') {
        return None;
    }
    if url[start..].contains('&') {
        return None;
    }
    Some(&url[..separator])
}

fn escape(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
