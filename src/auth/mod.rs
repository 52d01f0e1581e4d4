//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! RequestContext
//!     → cas.rs (cookie check → ticket validation → login redirect)
//!         → session.rs (ticket ↔ identity, flushed daily)
//!         → validator.rs (serviceValidate over HTTPS, XML parsing)
//!     → identity, or a redirect already written
//!
//! csrf.rs checks submitted tokens against the session ticket.
//! ```

pub mod cas;
pub mod csrf;
pub mod session;
pub mod validator;

pub use cas::{CasClient, CasSettings};
pub use session::{Clock, LocalClock, ManualClock, SessionCache};
pub use validator::{HttpTicketValidator, TicketValidator, ValidationError};
