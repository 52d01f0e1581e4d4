//! Response sink handed to the dispatcher with every request.
//!
//! # Responsibilities
//! - Accumulate status, headers and body for one response
//! - Deliver the finished response to the waiting connection task
//! - Report delivery failures (peer gone, double close) as transport faults
//!
//! # Design Decisions
//! - Delivery goes through a oneshot channel, so "closing" a sink is the
//!   moment the connection task gets its response
//! - `Set-Cookie` is always appended so a deletion and a fresh cookie can
//!   travel in the same response

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderName, HeaderValue, Response, StatusCode},
};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::error::GateError;

/// Failure to deliver a response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("response already closed")]
    AlreadyClosed,
    #[error("peer disconnected before the response was delivered")]
    Disconnected,
}

/// Open response for a single request.
#[derive(Debug)]
pub struct ResponseSink {
    status: StatusCode,
    headers: HeaderMap,
    reply: Option<oneshot::Sender<Response<Body>>>,
}

impl ResponseSink {
    /// Wrap the reply half of a connection's oneshot channel.
    pub fn new(reply: oneshot::Sender<Response<Body>>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            reply: Some(reply),
        }
    }

    /// Create a sink together with the receiver that will observe its response.
    pub fn channel() -> (Self, oneshot::Receiver<Response<Body>>) {
        let (tx, rx) = oneshot::channel();
        (Self::new(tx), rx)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Set (replace) a header from a string value.
    pub fn set_header(&mut self, name: HeaderName, value: &str) -> Result<(), GateError> {
        self.headers.insert(name, HeaderValue::from_str(value)?);
        Ok(())
    }

    /// Append a `Set-Cookie` header.
    pub fn add_cookie(&mut self, cookie: &str) -> Result<(), GateError> {
        self.headers
            .append(header::SET_COOKIE, HeaderValue::from_str(cookie)?);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.reply.is_none()
    }

    /// Issue a `302 Found` to `location` and close the response.
    pub fn redirect(&mut self, location: &str) -> Result<(), GateError> {
        self.status = StatusCode::FOUND;
        self.set_header(header::LOCATION, location)?;
        self.close()
    }

    /// Write `body` with an exact `Content-Length` and close the response.
    pub fn send(&mut self, body: impl Into<Bytes>) -> Result<(), GateError> {
        let body = body.into();
        self.headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        self.deliver(Body::from(body))
    }

    /// Close the response with an empty body.
    pub fn close(&mut self) -> Result<(), GateError> {
        self.send(Bytes::new())
    }

    fn deliver(&mut self, body: Body) -> Result<(), GateError> {
        let reply = self.reply.take().ok_or(TransportError::AlreadyClosed)?;

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = std::mem::take(&mut self.headers);

        reply
            .send(response)
            .map_err(|_| GateError::from(TransportError::Disconnected))
    }
}
