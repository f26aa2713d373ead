//! # Admission Tickets
//!
//! A ticket records one client's standing with one form's waiting room.
//!
//! Tickets live in the coordination store as JSON strings under a TTL'd key,
//! so any worker can pick up where another left off. Expiry is never stored:
//! a ticket is expired exactly when `last_seen_at + ttl <= now`, evaluated at
//! read time by whoever holds the ticket. The store's native key TTL is only
//! the garbage collector for records nobody reads again.

use serde::{Deserialize, Serialize};

/// Where a ticket currently stands.
///
/// There is deliberately no `Expired` variant. Expiry is a judgement made at
/// read time from `last_seen_at`, so two workers with the same clock always
/// agree on it without coordinating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketState {
    /// Waiting for a slot, ranked by `issued_at`.
    Queued,
    /// Holding one of the form's concurrent slots.
    Admitted,
}

/// One client's standing with one form, as stored in the coordination store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionTicket {
    pub form_id: String,
    pub client_id: String,
    /// When the client first entered the queue (or was admitted). Stable
    /// across refreshes so queue order never shuffles.
    pub issued_at: u64,
    /// Last poll we saw from this client, in epoch seconds.
    pub last_seen_at: u64,
    pub state: TicketState,
}

impl AdmissionTicket {
    pub fn queued(form_id: &str, client_id: &str, issued_at: u64, now: u64) -> Self {
        Self {
            form_id: form_id.to_string(),
            client_id: client_id.to_string(),
            issued_at,
            last_seen_at: now,
            state: TicketState::Queued,
        }
    }

    pub fn admitted(form_id: &str, client_id: &str, now: u64) -> Self {
        Self {
            form_id: form_id.to_string(),
            client_id: client_id.to_string(),
            issued_at: now,
            last_seen_at: now,
            state: TicketState::Admitted,
        }
    }

    /// Whether this ticket has gone stale: `last_seen_at + ttl <= now`.
    pub fn is_expired(&self, now: u64, ttl_secs: u64) -> bool {
        self.last_seen_at.saturating_add(ttl_secs) <= now
    }

    /// Records a poll from the client without disturbing queue order.
    pub fn touch(&mut self, now: u64) {
        self.last_seen_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ticket_is_not_expired() {
        let ticket = AdmissionTicket::queued("form", "client", 100, 100);
        assert!(!ticket.is_expired(100, 30));
        assert!(!ticket.is_expired(129, 30));
    }

    #[test]
    fn ticket_expires_exactly_at_ttl_boundary() {
        let ticket = AdmissionTicket::queued("form", "client", 100, 100);
        assert!(ticket.is_expired(130, 30));
        assert!(ticket.is_expired(500, 30));
    }

    #[test]
    fn touch_extends_lifetime_but_keeps_issue_time() {
        let mut ticket = AdmissionTicket::queued("form", "client", 100, 100);
        ticket.touch(125);

        assert_eq!(ticket.issued_at, 100);
        assert_eq!(ticket.last_seen_at, 125);
        assert!(!ticket.is_expired(130, 30));
    }

    #[test]
    fn ticket_round_trips_through_json() {
        let ticket = AdmissionTicket::admitted("form", "client", 42);
        let raw = serde_json::to_string(&ticket).unwrap();
        let back: AdmissionTicket = serde_json::from_str(&raw).unwrap();

        assert_eq!(back, ticket);
        assert_eq!(back.state, TicketState::Admitted);
    }
}
