//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (axum front door, buffers body, queues request)
//!     → request.rs (RequestContext: URL, headers, cookies, params)
//!     → dispatcher.rs (transport check → CAS → routing → origin → dispatch)
//!     → handler.rs (application callback for dynamic routes)
//!     → response.rs (ResponseSink delivers the response to the connection)
//! ```

pub mod dispatcher;
pub mod handler;
pub mod request;
pub mod response;
pub mod server;

pub use dispatcher::Dispatcher;
pub use handler::{Content, Handler};
pub use request::{Params, RequestContext};
pub use response::{ResponseSink, TransportError};
pub use server::HttpServer;
