//! CAS 2.0 service ticket validation.
//!
//! # Responsibilities
//! - Call `{cas}/serviceValidate?service=..&ticket=..`
//! - Parse the XML service response into an identity
//! - Reject proxied authentications and anything malformed
//!
//! # Response Shape
//! ```text
//! <cas:serviceResponse xmlns:cas="http://www.yale.edu/tp/cas">
//!   <cas:authenticationSuccess>
//!     <cas:user>jdoe</cas:user>
//!   </cas:authenticationSuccess>
//! </cas:serviceResponse>
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use url::Url;

use crate::config::CasConfig;

/// Boxed future returned by object-safe async seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Why a ticket could not be exchanged for an identity.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("validation request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("CAS server answered with status {0}")]
    Status(u16),

    #[error("CAS rejected the ticket ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("malformed CAS response: {0}")]
    Malformed(String),

    #[error("proxied authentication is not accepted")]
    ProxyChain,

    #[error("invalid CAS endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Exchanges a service ticket for an identity.
pub trait TicketValidator: Send + Sync {
    fn validate<'a>(
        &'a self,
        service: &'a str,
        ticket: &'a str,
    ) -> BoxFuture<'a, Result<String, ValidationError>>;
}

/// Validator that talks to a real CAS server over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpTicketValidator {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpTicketValidator {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, ValidationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    pub fn from_config(cas: &CasConfig) -> Result<Self, ValidationError> {
        let endpoint = Url::parse(&cas_endpoint(&cas.server_url, &cas.validate_path))?;
        Self::new(endpoint, Duration::from_secs(cas.timeout_secs))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn exchange(&self, service: &str, ticket: &str) -> Result<String, ValidationError> {
        tracing::debug!(endpoint = %self.endpoint, service = %service, "Validating service ticket");

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("service", service), ("ticket", ticket)])
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ValidationError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_service_response(&body)
    }
}

impl TicketValidator for HttpTicketValidator {
    fn validate<'a>(
        &'a self,
        service: &'a str,
        ticket: &'a str,
    ) -> BoxFuture<'a, Result<String, ValidationError>> {
        Box::pin(self.exchange(service, ticket))
    }
}

/// Join the CAS base URL and an endpoint path.
pub fn cas_endpoint(server_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        server_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Extract the authenticated user from a CAS 2.0 `serviceResponse`.
pub fn parse_service_response(body: &str) -> Result<String, ValidationError> {
    let mut reader = Reader::from_str(body);
    let mut path: Vec<String> = Vec::new();

    let mut success = false;
    let mut proxied = false;
    let mut user = String::new();
    let mut failure: Option<(String, String)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "authenticationSuccess" => success = true,
                    "authenticationFailure" => {
                        let code = e
                            .attributes()
                            .flatten()
                            .find(|a| a.key.local_name().as_ref() == b"code")
                            .map(|a| String::from_utf8_lossy(&a.value).into_owned())
                            .unwrap_or_default();
                        failure = Some((code, String::new()));
                    }
                    "proxies" | "proxy" if success => proxied = true,
                    _ => {}
                }
                path.push(name);
            }
            Ok(Event::Empty(e)) => {
                let name = e.local_name();
                if success && matches!(name.as_ref(), b"proxies" | b"proxy") {
                    proxied = true;
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| ValidationError::Malformed(e.to_string()))?;
                collect_text(&path, text.trim(), &mut user, &mut failure);
            }
            Ok(Event::CData(c)) => {
                let raw = c.into_inner();
                let text = String::from_utf8_lossy(&raw);
                collect_text(&path, text.trim(), &mut user, &mut failure);
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ValidationError::Malformed(e.to_string())),
            _ => {}
        }
    }

    if let Some((code, message)) = failure {
        return Err(ValidationError::Rejected { code, message });
    }
    if !success {
        return Err(ValidationError::Malformed(
            "no authenticationSuccess element".to_string(),
        ));
    }
    if proxied {
        return Err(ValidationError::ProxyChain);
    }
    if user.is_empty() {
        return Err(ValidationError::Malformed("missing user element".to_string()));
    }
    Ok(user)
}

fn collect_text(
    path: &[String],
    text: &str,
    user: &mut String,
    failure: &mut Option<(String, String)>,
) {
    if text.is_empty() {
        return;
    }
    match path {
        [.., parent, leaf] if parent == "authenticationSuccess" && leaf == "user" => {
            user.push_str(text);
        }
        [.., leaf] if leaf == "authenticationFailure" => {
            if let Some((_, message)) = failure.as_mut() {
                message.push_str(text);
            }
        }
        _ => {}
    }
}
