//! # Admission Policies
//!
//! One [`FormAdmissionPolicy`] per protected form. Policies are owned by the
//! wider platform (admins enable/disable protection); this module is the
//! read seam the gate consults plus the in-process registry behind it.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Shown when a form is locked without a custom message.
pub const DEFAULT_LOCK_MESSAGE: &str = "This form is currently not accepting new submissions.";

/// Admission rules for a single protected form.
#[derive(Debug, Clone)]
pub struct FormAdmissionPolicy {
    pub form_id: String,
    /// How many clients may hold an admitted slot at once. Zero means the
    /// room is open but nobody gets in, which queues everyone.
    pub max_concurrent: u32,
    /// How long an unrefreshed ticket stays alive.
    pub ticket_ttl: Duration,
    /// Administrative override. While set, every poll is rejected with
    /// `lock_message` regardless of capacity.
    pub locked: bool,
    pub lock_message: Option<String>,
    /// Expected per-submission duration, used for the wait estimate.
    pub avg_processing: Duration,
    /// Advertised upper bound on the wait, in minutes.
    pub max_wait_minutes: u32,
}

impl FormAdmissionPolicy {
    pub fn lock_message(&self) -> String {
        self.lock_message
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCK_MESSAGE.to_string())
    }
}

/// Read-only policy lookup, the collaborator interface the gate consumes.
#[async_trait]
pub trait PolicyProvider: Send + Sync {
    /// Returns the policy for `form_id`, or `None` when protection is
    /// disabled for that form.
    async fn policy(&self, form_id: &str) -> Option<FormAdmissionPolicy>;
}

/// In-process policy registry.
///
/// Policy truth for the platform lives outside this crate; this registry is
/// where admin actions land over the wire and what tests drive directly.
#[derive(Default)]
pub struct PolicyStore {
    inner: RwLock<HashMap<String, FormAdmissionPolicy>>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, policy: FormAdmissionPolicy) {
        self.inner
            .write()
            .await
            .insert(policy.form_id.clone(), policy);
    }

    /// Disables protection for the form. Returns whether a policy existed.
    pub async fn remove(&self, form_id: &str) -> bool {
        self.inner.write().await.remove(form_id).is_some()
    }

    /// Flips the administrative lock. Returns `false` when the form has no
    /// policy to lock.
    pub async fn set_locked(&self, form_id: &str, locked: bool, message: Option<String>) -> bool {
        let mut inner = self.inner.write().await;
        match inner.get_mut(form_id) {
            Some(policy) => {
                policy.locked = locked;
                if message.is_some() {
                    policy.lock_message = message;
                }
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl PolicyProvider for PolicyStore {
    async fn policy(&self, form_id: &str) -> Option<FormAdmissionPolicy> {
        self.inner.read().await.get(form_id).cloned()
    }
}

#[cfg(test)]
pub(crate) fn test_policy(form_id: &str, max_concurrent: u32) -> FormAdmissionPolicy {
    FormAdmissionPolicy {
        form_id: form_id.to_string(),
        max_concurrent,
        ticket_ttl: Duration::from_secs(60),
        locked: false,
        lock_message: None,
        avg_processing: Duration::from_secs(30),
        max_wait_minutes: 30,
    }
}
