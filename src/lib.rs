//! CAS-gated web endpoint.
//!
//! Every request is authenticated against a campus CAS server before it
//! reaches a static asset or the application's handler.
//!
//! # Architecture Overview
//!
//! ```text
//!   client ──▶ net/http front door ──▶ queue ──▶ Dispatcher (one request at a time)
//!                                                  │
//!                                                  ├─▶ auth::cas ──▶ auth::session
//!                                                  │        └──────▶ CAS serviceValidate
//!                                                  ├─▶ routing::resolver ──▶ asset tree
//!                                                  └─▶ Handler (application callback)
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::GateConfig;
pub use error::GateError;
pub use http::{Content, Dispatcher, Handler, HttpServer, Params, RequestContext};
pub use lifecycle::Shutdown;
