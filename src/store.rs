//! # Coordination Store
//!
//! Every cross-worker decision goes through this seam. Workers share no
//! memory; the store is the only place admission truth lives, so any number
//! of stateless instances can serve polls for the same form.
//!
//! ## Key layout (per form)
//!
//! - `waitroom:{form}:admitted` — sorted set, member = client id, score =
//!   last-seen epoch seconds. Cardinality after pruning stale members is the
//!   admission counter; it can never exceed `max_concurrent` because the
//!   prune + compare + insert happens in one atomic store operation.
//! - `waitroom:{form}:queue` — sorted set, member = client id, score =
//!   issue-time epoch seconds. Rank is the queue position; equal scores fall
//!   back to lexicographic member order, which keeps ranking deterministic.
//! - `waitroom:{form}:seen` — sorted set mirroring the queue with last-seen
//!   scores, used to prune clients that stopped polling.
//! - `waitroom:{form}:ticket:{client}` — JSON [`AdmissionTicket`] under the
//!   ticket TTL.
//!
//! All time-based state is derived from stored timestamps at read time;
//! nothing here schedules timers or background sweeps.

use async_trait::async_trait;
use thiserror::Error;

use crate::ticket::AdmissionTicket;

/// Failures at the store boundary.
///
/// These never reach a client: the admission gate absorbs every variant by
/// failing open (see [`crate::gate::AdmissionGate`]).
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached or the command failed in transit.
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),

    /// A stored ticket could not be encoded or decoded.
    #[error("ticket encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

pub fn admitted_key(form_id: &str) -> String {
    format!("waitroom:{form_id}:admitted")
}

pub fn queue_key(form_id: &str) -> String {
    format!("waitroom:{form_id}:queue")
}

pub fn seen_key(form_id: &str) -> String {
    format!("waitroom:{form_id}:seen")
}

pub fn ticket_key(form_id: &str, client_id: &str) -> String {
    format!("waitroom:{form_id}:ticket:{client_id}")
}

/// Atomic primitives the waiting room needs from a shared store.
///
/// Implemented for Redis by [`crate::database::RedisStore`] and in process by
/// [`crate::memory::MemoryStore`]. `now` and `ttl_secs` are always passed in
/// so expiry stays a pure function of stored timestamps.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Atomically prunes stale admitted slots, then admits `client_id` if
    /// fewer than `max_concurrent` slots remain held. Returns whether the
    /// client now holds a slot.
    ///
    /// This is the one operation that must be a single atomic round trip: a
    /// read-then-write pair here would let two workers both observe spare
    /// capacity and jointly exceed it.
    async fn try_admit(
        &self,
        form_id: &str,
        client_id: &str,
        max_concurrent: u32,
        now: u64,
        ttl_secs: u64,
    ) -> Result<bool, StoreError>;

    /// Refreshes an admitted client's last-seen score. Returns `false` when
    /// the slot no longer exists (expired and reclaimed), in which case the
    /// caller must compete for admission again.
    async fn touch_admitted(
        &self,
        form_id: &str,
        client_id: &str,
        now: u64,
        ttl_secs: u64,
    ) -> Result<bool, StoreError>;

    /// Adds the client to the queue at `issued_at`. Callers refreshing an
    /// existing ticket pass its original issue time so the client keeps its
    /// place; a fresh or expired client starts over at `now`.
    async fn enqueue(
        &self,
        form_id: &str,
        client_id: &str,
        issued_at: u64,
        now: u64,
        ttl_secs: u64,
    ) -> Result<(), StoreError>;

    /// Prunes queued clients not seen since the TTL cutoff, then returns the
    /// client's 1-based position, or `None` if the client is not queued.
    async fn queue_position(
        &self,
        form_id: &str,
        client_id: &str,
        now: u64,
        ttl_secs: u64,
    ) -> Result<Option<u64>, StoreError>;

    /// Drops every trace of the client: admitted slot, queue entries, and
    /// ticket record. Returns whether an admitted slot was actually freed,
    /// which makes release idempotent — the second call finds nothing.
    async fn release(&self, form_id: &str, client_id: &str) -> Result<bool, StoreError>;

    async fn get_ticket(
        &self,
        form_id: &str,
        client_id: &str,
    ) -> Result<Option<AdmissionTicket>, StoreError>;

    async fn put_ticket(&self, ticket: &AdmissionTicket, ttl_secs: u64) -> Result<(), StoreError>;
}
