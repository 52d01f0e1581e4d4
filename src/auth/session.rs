//! Session cache: bidirectional ticket ↔ identity mapping.
//!
//! # Design Decisions
//! - Single owner: the cache lives inside the CAS client, which lives inside
//!   the dispatcher task. No locks; concurrent access is impossible by
//!   construction. Adding worker concurrency requires putting this behind a
//!   mutex or its own task first
//! - The cache epoch is the local calendar day. The first lookup after
//!   midnight flushes everything; there is no per-entry TTL
//! - An identity keeps at most one ticket, so repeated logins by the same
//!   user reuse the first ticket and the cache stays bounded by user count

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDate};

use crate::observability::metrics;

/// Source of "today" for the cache epoch.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    today: Arc<Mutex<NaiveDate>>,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Arc::new(Mutex::new(today)),
        }
    }

    pub fn set(&self, today: NaiveDate) {
        if let Ok(mut guard) = self.today.lock() {
            *guard = today;
        }
    }

    /// Move forward by one calendar day.
    pub fn advance_day(&self) {
        if let Ok(mut guard) = self.today.lock() {
            if let Some(next) = guard.succ_opt() {
                *guard = next;
            }
        }
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        match self.today.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Ticket ↔ identity cache with a calendar-day epoch.
pub struct SessionCache {
    identities: HashMap<String, String>,
    tickets: HashMap<String, String>,
    epoch: NaiveDate,
    clock: Box<dyn Clock>,
}

impl SessionCache {
    pub fn new(clock: Box<dyn Clock>) -> Self {
        let epoch = clock.today();
        Self {
            identities: HashMap::new(),
            tickets: HashMap::new(),
            epoch,
            clock,
        }
    }

    /// Flush the whole cache if the day has changed since the last check.
    ///
    /// Returns true when a flush happened.
    pub fn roll_over(&mut self) -> bool {
        let today = self.clock.today();
        if today == self.epoch {
            return false;
        }

        let flushed = self.identities.len();
        self.identities.clear();
        self.tickets.clear();
        self.epoch = today;
        metrics::record_session_count(0);

        tracing::info!(
            flushed_sessions = flushed,
            epoch = %today,
            "Day rolled over, session cache flushed"
        );
        true
    }

    /// Identity bound to `ticket`.
    pub fn identity(&self, ticket: &str) -> Option<&str> {
        self.identities.get(ticket).map(String::as_str)
    }

    /// Current ticket of `identity`.
    pub fn ticket(&self, identity: &str) -> Option<&str> {
        self.tickets.get(identity).map(String::as_str)
    }

    /// Record a validated ticket for `identity` and return the session value
    /// to hand out as the cookie.
    ///
    /// An identity that already has a session keeps its existing ticket.
    pub fn establish(&mut self, ticket: &str, identity: &str) -> String {
        if let Some(existing) = self.tickets.get(identity) {
            tracing::debug!(identity = %identity, "Reusing cached session");
            return existing.clone();
        }

        // A ticket belongs to exactly one identity.
        if let Some(previous) = self.identities.remove(ticket) {
            self.tickets.remove(&previous);
        }

        self.identities.insert(ticket.to_string(), identity.to_string());
        self.tickets.insert(identity.to_string(), ticket.to_string());
        metrics::record_session_count(self.identities.len());
        ticket.to_string()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn epoch(&self) -> NaiveDate {
        self.epoch
    }
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("sessions", &self.identities.len())
            .field("epoch", &self.epoch)
            .finish()
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(Box::new(LocalClock))
    }
}
