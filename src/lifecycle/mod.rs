//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build dispatcher → Start listeners
//!
//! Shutdown (shutdown.rs):
//!     Flag cleared → dispatcher finishes current request → listeners drain → exit
//!
//! Signals (signals.rs):
//!     SIGINT (Ctrl+C) → clear the continuation flag
//! ```
//!
//! # Design Decisions
//! - Shutdown is cooperative: the dispatch loop checks the flag once per
//!   request and never interrupts a request in flight

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
