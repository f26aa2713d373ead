//! In-process [`CoordinationStore`] with the same ordering semantics as the
//! Redis backend: scores ascending, ties broken lexicographically by member.
//!
//! Single-process only — useful for tests and local development, not for a
//! deployment with more than one worker. Outages can be simulated with
//! [`MemoryStore::set_unavailable`] to exercise the gate's fail-open path.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;

use crate::{
    store::{CoordinationStore, StoreError},
    ticket::AdmissionTicket,
};

/// Minimal sorted-set: members ordered by `(score, member)`.
#[derive(Default)]
struct ZSet {
    scores: HashMap<String, u64>,
}

impl ZSet {
    fn insert(&mut self, member: &str, score: u64) {
        self.scores.insert(member.to_string(), score);
    }

    fn remove(&mut self, member: &str) -> bool {
        self.scores.remove(member).is_some()
    }

    fn contains(&self, member: &str) -> bool {
        self.scores.contains_key(member)
    }

    fn len(&self) -> usize {
        self.scores.len()
    }

    /// Removes and returns every member with `score <= cutoff`.
    fn prune(&mut self, cutoff: u64) -> Vec<String> {
        let stale: Vec<String> = self
            .scores
            .iter()
            .filter(|&(_, &score)| score <= cutoff)
            .map(|(member, _)| member.clone())
            .collect();

        for member in &stale {
            self.scores.remove(member);
        }

        stale
    }

    /// 0-based rank by `(score, member)`, or `None` if absent.
    fn rank(&self, member: &str) -> Option<u64> {
        let own_score = *self.scores.get(member)?;
        let ahead = self
            .scores
            .iter()
            .filter(|&(other, &score)| {
                score < own_score || (score == own_score && other.as_str() < member)
            })
            .count();

        Some(ahead as u64)
    }
}

#[derive(Default)]
struct FormEntry {
    admitted: ZSet,
    queue: ZSet,
    seen: ZSet,
    tickets: HashMap<String, String>,
}

#[derive(Default)]
pub struct MemoryStore {
    forms: Mutex<HashMap<String, FormEntry>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail, simulating a store outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "simulated outage".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn try_admit(
        &self,
        form_id: &str,
        client_id: &str,
        max_concurrent: u32,
        now: u64,
        ttl_secs: u64,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut forms = self.forms.lock().unwrap();
        let entry = forms.entry(form_id.to_string()).or_default();

        entry.admitted.prune(now.saturating_sub(ttl_secs));
        if entry.admitted.len() >= max_concurrent as usize {
            return Ok(false);
        }

        entry.admitted.insert(client_id, now);
        entry.queue.remove(client_id);
        entry.seen.remove(client_id);
        Ok(true)
    }

    async fn touch_admitted(
        &self,
        form_id: &str,
        client_id: &str,
        now: u64,
        _ttl_secs: u64,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut forms = self.forms.lock().unwrap();
        let entry = forms.entry(form_id.to_string()).or_default();

        if !entry.admitted.contains(client_id) {
            return Ok(false);
        }

        entry.admitted.insert(client_id, now);
        Ok(true)
    }

    async fn enqueue(
        &self,
        form_id: &str,
        client_id: &str,
        issued_at: u64,
        now: u64,
        _ttl_secs: u64,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut forms = self.forms.lock().unwrap();
        let entry = forms.entry(form_id.to_string()).or_default();

        entry.queue.insert(client_id, issued_at);
        entry.seen.insert(client_id, now);
        Ok(())
    }

    async fn queue_position(
        &self,
        form_id: &str,
        client_id: &str,
        now: u64,
        ttl_secs: u64,
    ) -> Result<Option<u64>, StoreError> {
        self.check_available()?;
        let mut forms = self.forms.lock().unwrap();
        let entry = forms.entry(form_id.to_string()).or_default();

        for stale in entry.seen.prune(now.saturating_sub(ttl_secs)) {
            entry.queue.remove(&stale);
        }

        Ok(entry.queue.rank(client_id).map(|rank| rank + 1))
    }

    async fn release(&self, form_id: &str, client_id: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut forms = self.forms.lock().unwrap();
        let entry = forms.entry(form_id.to_string()).or_default();

        let freed = entry.admitted.remove(client_id);
        entry.queue.remove(client_id);
        entry.seen.remove(client_id);
        entry.tickets.remove(client_id);
        Ok(freed)
    }

    async fn get_ticket(
        &self,
        form_id: &str,
        client_id: &str,
    ) -> Result<Option<AdmissionTicket>, StoreError> {
        self.check_available()?;
        let forms = self.forms.lock().unwrap();
        let raw = forms
            .get(form_id)
            .and_then(|entry| entry.tickets.get(client_id).cloned());

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn put_ticket(&self, ticket: &AdmissionTicket, _ttl_secs: u64) -> Result<(), StoreError> {
        self.check_available()?;
        let raw = serde_json::to_string(ticket)?;
        let mut forms = self.forms.lock().unwrap();
        forms
            .entry(ticket.form_id.clone())
            .or_default()
            .tickets
            .insert(ticket.client_id.clone(), raw);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_orders_by_score_then_member() {
        let mut zset = ZSet::default();
        zset.insert("carol", 30);
        zset.insert("alice", 10);
        zset.insert("bob", 10);

        assert_eq!(zset.rank("alice"), Some(0));
        assert_eq!(zset.rank("bob"), Some(1));
        assert_eq!(zset.rank("carol"), Some(2));
        assert_eq!(zset.rank("ghost"), None);
    }

    #[test]
    fn prune_is_inclusive_of_cutoff() {
        let mut zset = ZSet::default();
        zset.insert("old", 10);
        zset.insert("edge", 20);
        zset.insert("fresh", 21);

        let mut stale = zset.prune(20);
        stale.sort();

        assert_eq!(stale, vec!["edge".to_string(), "old".to_string()]);
        assert_eq!(zset.len(), 1);
        assert!(zset.contains("fresh"));
    }

    #[tokio::test]
    async fn requeue_with_original_issue_time_keeps_rank() {
        let store = MemoryStore::new();

        store.enqueue("form", "a", 100, 100, 60).await.unwrap();
        store.enqueue("form", "b", 105, 105, 60).await.unwrap();

        // a refreshes later but passes its original issue time.
        store.enqueue("form", "a", 100, 110, 60).await.unwrap();

        assert_eq!(
            store.queue_position("form", "a", 110, 60).await.unwrap(),
            Some(1)
        );
        assert_eq!(
            store.queue_position("form", "b", 110, 60).await.unwrap(),
            Some(2)
        );
    }

    #[tokio::test]
    async fn admit_is_capped_and_release_is_idempotent() {
        let store = MemoryStore::new();

        assert!(store.try_admit("form", "a", 2, 100, 60).await.unwrap());
        assert!(store.try_admit("form", "b", 2, 100, 60).await.unwrap());
        assert!(!store.try_admit("form", "c", 2, 100, 60).await.unwrap());

        assert!(store.release("form", "a").await.unwrap());
        assert!(!store.release("form", "a").await.unwrap());

        assert!(store.try_admit("form", "c", 2, 101, 60).await.unwrap());
    }

    #[tokio::test]
    async fn stale_admitted_slots_are_reclaimed() {
        let store = MemoryStore::new();

        assert!(store.try_admit("form", "a", 1, 100, 30).await.unwrap());
        assert!(!store.try_admit("form", "b", 1, 110, 30).await.unwrap());

        // a's last-seen score of 100 falls at/below the cutoff 130.
        assert!(store.try_admit("form", "b", 1, 130, 30).await.unwrap());
    }

    #[tokio::test]
    async fn queue_position_prunes_silent_clients() {
        let store = MemoryStore::new();

        store.enqueue("form", "a", 100, 100, 30).await.unwrap();
        store.enqueue("form", "b", 101, 101, 30).await.unwrap();

        assert_eq!(
            store.queue_position("form", "b", 105, 30).await.unwrap(),
            Some(2)
        );

        // a stops polling; by 131 its seen score of 100 is stale.
        store.enqueue("form", "b", 101, 131, 30).await.unwrap();
        assert_eq!(
            store.queue_position("form", "b", 131, 30).await.unwrap(),
            Some(1)
        );
        assert_eq!(store.queue_position("form", "a", 131, 30).await.unwrap(), None);
    }

    #[tokio::test]
    async fn outage_fails_every_operation() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        assert!(store.try_admit("form", "a", 1, 100, 30).await.is_err());
        assert!(store.queue_position("form", "a", 100, 30).await.is_err());
        assert!(store.release("form", "a").await.is_err());
    }
}
