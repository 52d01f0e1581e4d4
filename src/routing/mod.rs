//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Authenticated request path
//!     → resolver.rs (static file, redirect, or dynamic)
//!     → template.rs (placeholder substitution for served text files)
//! ```
//!
//! # Design Decisions
//! - Fixed path shapes only; no routing DSL
//! - Deterministic: same path and asset tree always give the same outcome

pub mod resolver;
pub mod template;

pub use resolver::{ContentType, RouteOutcome, StaticResolver};
