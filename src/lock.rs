//! Administrative lock override. Independent of counters and tickets: while
//! a form is locked every poll short-circuits to a rejection, and unlocking
//! never resurrects tickets that expired in the meantime — clients re-poll
//! and re-queue from scratch.

use std::sync::Arc;

use crate::policy::{PolicyProvider, PolicyStore};

pub struct LockController {
    policies: Arc<PolicyStore>,
}

impl LockController {
    pub fn new(policies: Arc<PolicyStore>) -> Self {
        Self { policies }
    }

    /// Returns `false` when the form has no policy to lock.
    pub async fn set_locked(&self, form_id: &str, locked: bool, message: Option<String>) -> bool {
        self.policies.set_locked(form_id, locked, message).await
    }

    pub async fn is_locked(&self, form_id: &str) -> bool {
        self.policies
            .policy(form_id)
            .await
            .is_some_and(|policy| policy.locked)
    }
}
