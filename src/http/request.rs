//! Per-request context owned by the dispatcher.
//!
//! # Responsibilities
//! - Hold the parsed URL, method, headers and buffered body of one request
//! - Carry the open `ResponseSink` for that request
//! - Extract cookies, query values and submitted parameters
//!
//! # Design Decisions
//! - The context is moved into the dispatcher and dropped when the response
//!   is complete; nothing retains it past that point
//! - Parameter parsing is lossy: invalid UTF-8 never aborts a request

use axum::{
    body::Bytes,
    http::{header, request::Parts, HeaderMap, Method, Uri},
};
use url::form_urlencoded;

use crate::http::response::ResponseSink;

/// Request parameters (query string for GET, url-encoded body for POST).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    /// Parse `application/x-www-form-urlencoded` data.
    pub fn parse(input: &[u8]) -> Self {
        let pairs = form_urlencoded::parse(input)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { pairs }
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Remove every value for `name`, returning the first one.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let mut first = None;
        self.pairs.retain(|(k, v)| {
            if k == name {
                if first.is_none() {
                    first = Some(v.clone());
                }
                false
            } else {
                true
            }
        });
        first
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Everything the gate knows about one inbound request.
#[derive(Debug)]
pub struct RequestContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    secure: bool,
    session: Option<String>,
    /// Open response for this request.
    pub response: ResponseSink,
}

impl RequestContext {
    pub fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        secure: bool,
        response: ResponseSink,
    ) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
            secure,
            session: None,
            response,
        }
    }

    /// Build a context from the parts of an axum request.
    pub fn from_parts(parts: Parts, body: Bytes, secure: bool, response: ResponseSink) -> Self {
        Self::new(parts.method, parts.uri, parts.headers, body, secure, response)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Path plus query string, as it appeared on the request line.
    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| self.uri.path())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as a string, if present and visible ASCII.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Whether the request arrived over an encrypted transport.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Absolute URL of this request as seen through `public_host`.
    pub fn absolute_url(&self, public_host: &str) -> String {
        format!("https://{}{}", public_host, self.path_and_query())
    }

    /// All values of cookie `name`, across every `Cookie` header.
    pub fn cookies<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|line| line.split(';'))
            .filter_map(move |pair| {
                let (k, v) = pair.trim().split_once('=')?;
                (k.trim() == name).then(|| v.trim())
            })
    }

    /// Last value of query parameter `name`.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query()?;
        form_urlencoded::parse(query.as_bytes())
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .last()
    }

    /// Submitted parameters: the query string for GET/HEAD, the
    /// url-encoded body otherwise.
    pub fn params(&self) -> Params {
        if self.method == Method::GET || self.method == Method::HEAD {
            Params::parse(self.query().unwrap_or_default().as_bytes())
        } else if self.is_form_body() {
            Params::parse(&self.body)
        } else {
            Params::default()
        }
    }

    fn is_form_body(&self) -> bool {
        match self.header(header::CONTENT_TYPE) {
            Some(ct) => ct
                .split(';')
                .next()
                .map(|mime| mime.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"))
                .unwrap_or(false),
            // Bare form posts without a content type are still forms.
            None => !self.body.is_empty(),
        }
    }

    /// Session ticket of the authenticated user, which doubles as the CSRF token.
    pub fn csrf_token(&self) -> Option<&str> {
        self.session.as_deref()
    }

    pub(crate) fn set_session(&mut self, ticket: String) {
        self.session = Some(ticket);
    }
}
