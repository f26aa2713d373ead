//! # Ticket Tracker
//!
//! Lifecycle of a client's ticket: refresh on every poll, promotion
//! bookkeeping, wait estimation, and release. The tracker never decides
//! admission — that is the gate's job — it only keeps the stored ticket and
//! queue entries consistent with the decision.

use std::{sync::Arc, time::Duration};

use crate::{
    policy::FormAdmissionPolicy,
    store::{CoordinationStore, StoreError},
    ticket::AdmissionTicket,
};

pub struct TicketTracker {
    store: Arc<dyn CoordinationStore>,
}

impl TicketTracker {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    /// Best-effort wait estimate: `position * avg_processing`. Documented to
    /// clients as approximate, never a guarantee.
    pub fn compute_wait(policy: &FormAdmissionPolicy, position: u64) -> Duration {
        Duration::from_secs(position.saturating_mul(policy.avg_processing.as_secs()))
    }

    /// Writes the admitted ticket for a client that just won a slot.
    pub async fn record_admission(
        &self,
        policy: &FormAdmissionPolicy,
        form_id: &str,
        client_id: &str,
        now: u64,
    ) -> Result<(), StoreError> {
        let ticket = AdmissionTicket::admitted(form_id, client_id, now);
        self.store
            .put_ticket(&ticket, policy.ticket_ttl.as_secs())
            .await
    }

    /// Refreshes an admitted client's ticket record after a successful slot
    /// touch.
    pub async fn refresh_admitted(
        &self,
        policy: &FormAdmissionPolicy,
        mut ticket: AdmissionTicket,
        now: u64,
    ) -> Result<(), StoreError> {
        ticket.touch(now);
        self.store
            .put_ticket(&ticket, policy.ticket_ttl.as_secs())
            .await
    }

    /// Places (or keeps) the client in the queue and reports its standing.
    ///
    /// `issued_at` is the original issue time for a client already queued,
    /// or `now` for a fresh one — passing the original keeps queue order
    /// stable across refreshes.
    pub async fn track_queued(
        &self,
        policy: &FormAdmissionPolicy,
        form_id: &str,
        client_id: &str,
        issued_at: u64,
        now: u64,
    ) -> Result<(u64, Duration), StoreError> {
        let ttl_secs = policy.ticket_ttl.as_secs();

        self.store
            .enqueue(form_id, client_id, issued_at, now, ttl_secs)
            .await?;

        let ticket = AdmissionTicket::queued(form_id, client_id, issued_at, now);
        self.store.put_ticket(&ticket, ttl_secs).await?;

        let position = self
            .store
            .queue_position(form_id, client_id, now, ttl_secs)
            .await?
            // We enqueued a moment ago, so absence can only mean a racing
            // prune or admit; report the front of the queue.
            .unwrap_or(1);

        Ok((position, Self::compute_wait(policy, position)))
    }

    /// Frees the client's slot and forgets its ticket. Keyed by ticket
    /// identity in the store, so retries are harmless: only the first call
    /// reports an admitted slot freed.
    pub async fn release(&self, form_id: &str, client_id: &str) -> Result<bool, StoreError> {
        self.store.release(form_id, client_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{memory::MemoryStore, policy::test_policy};

    #[test]
    fn wait_scales_linearly_with_position() {
        let policy = test_policy("form", 2);

        assert_eq!(TicketTracker::compute_wait(&policy, 1), Duration::from_secs(30));
        assert_eq!(TicketTracker::compute_wait(&policy, 4), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn track_queued_keeps_original_issue_time() {
        let store = Arc::new(MemoryStore::new());
        let tracker = TicketTracker::new(store.clone());
        let policy = test_policy("form", 0);

        let (first, _) = tracker
            .track_queued(&policy, "form", "alice", 100, 100)
            .await
            .unwrap();
        assert_eq!(first, 1);

        // A later arrival, then a refresh of alice; alice keeps position 1.
        tracker
            .track_queued(&policy, "form", "bob", 105, 105)
            .await
            .unwrap();
        let (refreshed, wait) = tracker
            .track_queued(&policy, "form", "alice", 100, 110)
            .await
            .unwrap();

        assert_eq!(refreshed, 1);
        assert_eq!(wait, Duration::from_secs(30));

        let ticket = store.get_ticket("form", "alice").await.unwrap().unwrap();
        assert_eq!(ticket.issued_at, 100);
        assert_eq!(ticket.last_seen_at, 110);
    }

    #[tokio::test]
    async fn release_reports_freed_slot_once() {
        let store = Arc::new(MemoryStore::new());
        let tracker = TicketTracker::new(store.clone());
        let policy = test_policy("form", 1);

        store.try_admit("form", "alice", 1, 100, 60).await.unwrap();
        tracker
            .record_admission(&policy, "form", "alice", 100)
            .await
            .unwrap();

        assert!(tracker.release("form", "alice").await.unwrap());
        assert!(!tracker.release("form", "alice").await.unwrap());
        assert!(store.get_ticket("form", "alice").await.unwrap().is_none());
    }
}
