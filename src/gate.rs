//! # Admission Gate
//!
//! The decision point: given a form and a client, is the client admitted,
//! queued, or rejected? All state lives in the coordination store, so any
//! worker can serve any poll and the capacity bound holds across the fleet.
//!
//! ## Decision order
//!
//! 1. No policy configured — protection is disabled, admit unconditionally.
//! 2. Policy locked — reject with the lock message, touching no state.
//! 3. Live admitted ticket — refresh it and admit again.
//! 4. Atomic admit — one store round trip that prunes stale slots, compares
//!    the held count to capacity, and inserts. The only operation whose
//!    atomicity the capacity bound depends on.
//! 5. Otherwise queue, keeping the original issue time so order is stable.
//!
//! ## Fail-open
//!
//! If the store is unreachable the gate admits unconditionally rather than
//! turning a degraded waiting room into a full outage. The degraded decision
//! is logged and flagged `unprotected` so callers can tell it apart from a
//! real admission.

use std::{sync::Arc, time::Duration};

use tracing::warn;

use crate::{
    error::AppError,
    policy::{FormAdmissionPolicy, PolicyProvider},
    store::{CoordinationStore, StoreError},
    ticket::TicketState,
    tracker::TicketTracker,
    utils::{now_epoch, validate_client_id},
};

/// Outcome of one admission decision.
///
/// Explicit variants rather than flags so a queued client can never be
/// mistaken for an admitted one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionResult {
    /// The client holds a slot. `unprotected` marks admissions that bypassed
    /// capacity checks (no policy configured, or fail-open during an outage).
    Admitted { unprotected: bool },

    /// At capacity; the client is waiting at `position` (1-based).
    Queued {
        position: u64,
        estimated_wait: Duration,
    },

    /// Administratively locked; terminal for this poll.
    Rejected { message: String },
}

pub struct AdmissionGate {
    store: Arc<dyn CoordinationStore>,
    policies: Arc<dyn PolicyProvider>,
    tracker: TicketTracker,
}

impl AdmissionGate {
    pub fn new(store: Arc<dyn CoordinationStore>, policies: Arc<dyn PolicyProvider>) -> Self {
        Self {
            tracker: TicketTracker::new(store.clone()),
            store,
            policies,
        }
    }

    /// Decides admission for one poll.
    ///
    /// Only [`AppError::InvalidClient`] propagates; store failures are
    /// absorbed into fail-open admission.
    pub async fn admit(&self, form_id: &str, client_id: &str) -> Result<AdmissionResult, AppError> {
        self.admit_at(form_id, client_id, now_epoch()).await
    }

    async fn admit_at(
        &self,
        form_id: &str,
        client_id: &str,
        now: u64,
    ) -> Result<AdmissionResult, AppError> {
        validate_client_id(client_id)?;

        let Some(policy) = self.policies.policy(form_id).await else {
            return Ok(AdmissionResult::Admitted { unprotected: true });
        };

        if policy.locked {
            return Ok(AdmissionResult::Rejected {
                message: policy.lock_message(),
            });
        }

        match self.decide(&policy, form_id, client_id, now).await {
            Ok(result) => Ok(result),
            Err(err) => {
                warn!(form_id, error = %err, "coordination store unavailable, failing open");
                Ok(AdmissionResult::Admitted { unprotected: true })
            }
        }
    }

    async fn decide(
        &self,
        policy: &FormAdmissionPolicy,
        form_id: &str,
        client_id: &str,
        now: u64,
    ) -> Result<AdmissionResult, StoreError> {
        let ttl_secs = policy.ticket_ttl.as_secs();

        if let Some(ticket) = self.store.get_ticket(form_id, client_id).await? {
            if !ticket.is_expired(now, ttl_secs) {
                match ticket.state {
                    TicketState::Admitted => {
                        // The slot may have been reclaimed by pruning even
                        // though the ticket record survived; only a live
                        // slot counts.
                        if self
                            .store
                            .touch_admitted(form_id, client_id, now, ttl_secs)
                            .await?
                        {
                            self.tracker.refresh_admitted(policy, ticket, now).await?;
                            return Ok(AdmissionResult::Admitted { unprotected: false });
                        }
                    }
                    TicketState::Queued => {
                        return self
                            .admit_or_queue(policy, form_id, client_id, ticket.issued_at, now)
                            .await;
                    }
                }
            }
        }

        self.admit_or_queue(policy, form_id, client_id, now, now)
            .await
    }

    async fn admit_or_queue(
        &self,
        policy: &FormAdmissionPolicy,
        form_id: &str,
        client_id: &str,
        issued_at: u64,
        now: u64,
    ) -> Result<AdmissionResult, StoreError> {
        let admitted = self
            .store
            .try_admit(
                form_id,
                client_id,
                policy.max_concurrent,
                now,
                policy.ticket_ttl.as_secs(),
            )
            .await?;

        if admitted {
            self.tracker
                .record_admission(policy, form_id, client_id, now)
                .await?;
            return Ok(AdmissionResult::Admitted { unprotected: false });
        }

        let (position, estimated_wait) = self
            .tracker
            .track_queued(policy, form_id, client_id, issued_at, now)
            .await?;

        Ok(AdmissionResult::Queued {
            position,
            estimated_wait,
        })
    }

    /// Frees the client's slot immediately instead of waiting out the TTL.
    /// Called by the submission pipeline on completion; idempotent, and a
    /// store outage here is absorbed — the TTL reclaims the slot anyway.
    pub async fn release(&self, form_id: &str, client_id: &str) -> bool {
        match self.tracker.release(form_id, client_id).await {
            Ok(freed) => freed,
            Err(err) => {
                warn!(form_id, error = %err, "release failed, slot will expire via ttl");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        memory::MemoryStore,
        policy::{PolicyStore, test_policy},
    };

    async fn gate_with(
        policies: Vec<FormAdmissionPolicy>,
    ) -> (Arc<AdmissionGate>, Arc<MemoryStore>, Arc<PolicyStore>) {
        let store = Arc::new(MemoryStore::new());
        let policy_store = Arc::new(PolicyStore::new());
        for policy in policies {
            policy_store.upsert(policy).await;
        }
        let gate = Arc::new(AdmissionGate::new(store.clone(), policy_store.clone()));
        (gate, store, policy_store)
    }

    fn assert_admitted(result: &AdmissionResult) {
        assert_eq!(
            result,
            &AdmissionResult::Admitted { unprotected: false }
        );
    }

    #[tokio::test]
    async fn empty_client_id_is_rejected_without_state_change() {
        let (gate, _, _) = gate_with(vec![test_policy("form", 1)]).await;

        let err = gate.admit("form", "").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidClient));

        // Capacity untouched: the next real client gets the slot.
        assert_admitted(&gate.admit("form", "alice").await.unwrap());
    }

    #[tokio::test]
    async fn missing_policy_means_protection_disabled() {
        let (gate, _, _) = gate_with(vec![]).await;

        assert_eq!(
            gate.admit("form", "alice").await.unwrap(),
            AdmissionResult::Admitted { unprotected: true }
        );
    }

    #[tokio::test]
    async fn capacity_bound_holds_under_concurrent_admits() {
        let (gate, _, _) = gate_with(vec![test_policy("form", 3)]).await;

        let mut handles = Vec::new();
        for i in 0..40 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                gate.admit("form", &format!("client-{i:02}")).await.unwrap()
            }));
        }

        let mut admitted = 0;
        let mut queued = 0;
        for handle in handles {
            match handle.await.unwrap() {
                AdmissionResult::Admitted { unprotected: false } => admitted += 1,
                AdmissionResult::Queued { .. } => queued += 1,
                other => panic!("unexpected result: {other:?}"),
            }
        }

        assert_eq!(admitted, 3);
        assert_eq!(queued, 37);
    }

    #[tokio::test]
    async fn queue_positions_follow_issue_order() {
        let (gate, _, _) = gate_with(vec![test_policy("form", 1)]).await;

        assert_admitted(&gate.admit("form", "holder").await.unwrap());

        let now = now_epoch();
        let first = gate.admit_at("form", "early", now).await.unwrap();
        let second = gate.admit_at("form", "later", now + 1).await.unwrap();

        assert!(matches!(first, AdmissionResult::Queued { position: 1, .. }));
        assert!(matches!(second, AdmissionResult::Queued { position: 2, .. }));

        // Repeated polls do not shuffle the order.
        let again = gate.admit_at("form", "early", now + 2).await.unwrap();
        assert!(matches!(again, AdmissionResult::Queued { position: 1, .. }));
    }

    #[tokio::test]
    async fn simultaneous_arrivals_rank_lexicographically() {
        let (gate, _, _) = gate_with(vec![test_policy("form", 0)]).await;

        let now = now_epoch();
        let bravo = gate.admit_at("form", "bravo", now).await.unwrap();
        let alpha = gate.admit_at("form", "alpha", now).await.unwrap();

        assert!(matches!(alpha, AdmissionResult::Queued { position: 1, .. }));
        assert!(matches!(bravo, AdmissionResult::Queued { position: 2, .. }));
    }

    #[tokio::test]
    async fn release_frees_slot_for_next_queued_poll() {
        let (gate, _, _) = gate_with(vec![test_policy("form", 2)]).await;

        assert_admitted(&gate.admit("form", "a").await.unwrap());
        assert_admitted(&gate.admit("form", "b").await.unwrap());

        let queued = gate.admit("form", "c").await.unwrap();
        assert!(matches!(queued, AdmissionResult::Queued { position: 1, .. }));

        assert!(gate.release("form", "a").await);
        assert_admitted(&gate.admit("form", "c").await.unwrap());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let (gate, _, _) = gate_with(vec![test_policy("form", 1)]).await;

        assert_admitted(&gate.admit("form", "a").await.unwrap());
        assert!(gate.release("form", "a").await);
        assert!(!gate.release("form", "a").await);

        // The double release freed exactly one slot.
        assert_admitted(&gate.admit("form", "b").await.unwrap());
        let queued = gate.admit("form", "c").await.unwrap();
        assert!(matches!(queued, AdmissionResult::Queued { .. }));
    }

    #[tokio::test]
    async fn expired_holder_loses_slot_to_next_client() {
        let (gate, _, _) = gate_with(vec![test_policy("form", 1)]).await;
        let now = now_epoch();

        assert_admitted(&gate.admit_at("form", "ghost", now).await.unwrap());

        // Within the 60s test TTL the slot is held.
        let early = gate.admit_at("form", "next", now + 30).await.unwrap();
        assert!(matches!(early, AdmissionResult::Queued { .. }));

        // Past the TTL the ghost's slot is pruned inside the atomic admit.
        assert_admitted(&gate.admit_at("form", "next", now + 61).await.unwrap());
    }

    #[tokio::test]
    async fn returning_expired_holder_requeues_behind_new_holder() {
        let (gate, _, _) = gate_with(vec![test_policy("form", 1)]).await;
        let now = now_epoch();

        assert_admitted(&gate.admit_at("form", "ghost", now).await.unwrap());
        assert_admitted(&gate.admit_at("form", "next", now + 61).await.unwrap());

        // The ghost's ticket expired with its slot; it starts over.
        let back = gate.admit_at("form", "ghost", now + 62).await.unwrap();
        assert!(matches!(back, AdmissionResult::Queued { position: 1, .. }));
    }

    #[tokio::test]
    async fn silent_queued_client_loses_its_place() {
        let (gate, _, _) = gate_with(vec![test_policy("form", 0)]).await;
        let now = now_epoch();

        let ghost = gate.admit_at("form", "ghost", now).await.unwrap();
        assert!(matches!(ghost, AdmissionResult::Queued { position: 1, .. }));
        let steady = gate.admit_at("form", "steady", now + 1).await.unwrap();
        assert!(matches!(steady, AdmissionResult::Queued { position: 2, .. }));

        // Ghost stops polling; steady keeps at it and moves up once the
        // ghost's last-seen falls past the 60s test TTL.
        let steady = gate.admit_at("form", "steady", now + 30).await.unwrap();
        assert!(matches!(steady, AdmissionResult::Queued { position: 2, .. }));
        let steady = gate.admit_at("form", "steady", now + 61).await.unwrap();
        assert!(matches!(steady, AdmissionResult::Queued { position: 1, .. }));

        // The ghost's ticket expired with its place; it rejoins at the back.
        let ghost = gate.admit_at("form", "ghost", now + 62).await.unwrap();
        assert!(matches!(ghost, AdmissionResult::Queued { position: 2, .. }));
    }

    #[tokio::test]
    async fn locked_policy_rejects_even_with_capacity() {
        let mut policy = test_policy("form", 5);
        policy.locked = true;
        policy.lock_message = Some("Form closed for maintenance".to_string());
        let (gate, _, policies) = gate_with(vec![policy]).await;

        assert_eq!(
            gate.admit("form", "alice").await.unwrap(),
            AdmissionResult::Rejected {
                message: "Form closed for maintenance".to_string()
            }
        );

        // Unlocking restores normal admission for new polls.
        policies.set_locked("form", false, None).await;
        assert_admitted(&gate.admit("form", "alice").await.unwrap());
    }

    #[tokio::test]
    async fn store_outage_fails_open() {
        let (gate, store, _) = gate_with(vec![test_policy("form", 1)]).await;
        store.set_unavailable(true);

        for i in 0..5 {
            assert_eq!(
                gate.admit("form", &format!("client-{i}")).await.unwrap(),
                AdmissionResult::Admitted { unprotected: true }
            );
        }

        // Recovery: protection resumes once the store is back.
        store.set_unavailable(false);
        assert_admitted(&gate.admit("form", "alice").await.unwrap());
        let queued = gate.admit("form", "bob").await.unwrap();
        assert!(matches!(queued, AdmissionResult::Queued { .. }));
    }

    #[tokio::test]
    async fn zero_capacity_queues_everyone() {
        let (gate, _, _) = gate_with(vec![test_policy("form", 0)]).await;

        let result = gate.admit("form", "alice").await.unwrap();
        assert!(matches!(result, AdmissionResult::Queued { position: 1, .. }));
    }

    #[tokio::test]
    async fn admitted_holder_keeps_slot_across_polls() {
        let (gate, _, _) = gate_with(vec![test_policy("form", 1)]).await;
        let now = now_epoch();

        assert_admitted(&gate.admit_at("form", "a", now).await.unwrap());
        assert_admitted(&gate.admit_at("form", "a", now + 10).await.unwrap());

        // Refreshing never double-counts the holder.
        let queued = gate.admit_at("form", "b", now + 11).await.unwrap();
        assert!(matches!(queued, AdmissionResult::Queued { position: 1, .. }));
    }
}
