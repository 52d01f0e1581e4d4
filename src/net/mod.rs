//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind plain HTTP)
//!     → tls.rs (optional rustls configuration for the HTTPS listener)
//!     → Hand off to the HTTP front door
//! ```
//!
//! # Design Decisions
//! - Connections are accepted concurrently; requests are serialized later,
//!   at the dispatcher queue
//! - TLS is optional so the gate can sit behind a terminating proxy

pub mod listener;
pub mod tls;

pub use listener::ListenerError;
