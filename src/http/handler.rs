//! Application handler interface.
//!
//! The gate authenticates and filters; what an authenticated request
//! actually produces is decided by one injected [`Handler`].

use crate::error::GateError;
use crate::http::request::{Params, RequestContext};

/// Content produced by a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// UTF-8 text, served as HTML unless the handler set a content type.
    Text(String),
    /// Structured fragment, serialized as JSON.
    Json(serde_json::Value),
    /// Raw bytes, passed through unchanged.
    Bytes(Vec<u8>),
    /// The handler wrote and closed `ctx.response` itself.
    Responded,
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Content::Bytes(bytes)
    }
}

impl From<serde_json::Value> for Content {
    fn from(value: serde_json::Value) -> Self {
        Content::Json(value)
    }
}

/// Business logic invoked for authenticated, same-origin, CSRF-checked
/// dynamic requests.
///
/// Runs on the dispatch task: while it runs, no other request is served.
pub trait Handler: Send + Sync {
    fn handle(
        &self,
        ctx: &mut RequestContext,
        identity: &str,
        params: &Params,
    ) -> Result<Content, GateError>;
}

impl<F> Handler for F
where
    F: Fn(&mut RequestContext, &str, &Params) -> Result<Content, GateError> + Send + Sync,
{
    fn handle(
        &self,
        ctx: &mut RequestContext,
        identity: &str,
        params: &Params,
    ) -> Result<Content, GateError> {
        self(ctx, identity, params)
    }
}
