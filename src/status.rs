//! # Status Responder
//!
//! The read path clients poll. Pure composition: lock check, then the gate's
//! decision, projected into the stable wire shape. Holds no state of its own.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    gate::{AdmissionGate, AdmissionResult},
    policy::PolicyProvider,
};

/// Status payload polled by waiting clients. `waitSeconds == 0` means the
/// client is admitted and may submit to `targetFormId`. The estimate is
/// approximate, capped at the advertised `maxWaitMinutes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingRoomStatusDto {
    pub wait_seconds: u64,
    pub target_form_id: String,
    pub max_wait_minutes: u32,
}

/// Terminal payload for a locked form; clients display the message and stop
/// polling (or back way off).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingRoomLockedErrorDto {
    pub inactive_message: String,
}

pub struct StatusResponder {
    gate: Arc<AdmissionGate>,
    policies: Arc<dyn PolicyProvider>,
    /// Advertised wait cap for forms without a policy of their own.
    default_max_wait_minutes: u32,
}

impl StatusResponder {
    pub fn new(
        gate: Arc<AdmissionGate>,
        policies: Arc<dyn PolicyProvider>,
        default_max_wait_minutes: u32,
    ) -> Self {
        Self {
            gate,
            policies,
            default_max_wait_minutes,
        }
    }

    pub async fn get_status(
        &self,
        form_id: &str,
        client_id: &str,
    ) -> Result<WaitingRoomStatusDto, AppError> {
        // Lock check first: cheap, and terminal for this poll.
        let max_wait_minutes = match self.policies.policy(form_id).await {
            Some(policy) if policy.locked => {
                return Err(AppError::FormLocked {
                    message: policy.lock_message(),
                });
            }
            Some(policy) => policy.max_wait_minutes,
            None => self.default_max_wait_minutes,
        };

        match self.gate.admit(form_id, client_id).await? {
            AdmissionResult::Admitted { .. } => Ok(WaitingRoomStatusDto {
                wait_seconds: 0,
                target_form_id: form_id.to_string(),
                max_wait_minutes,
            }),
            AdmissionResult::Queued { estimated_wait, .. } => Ok(WaitingRoomStatusDto {
                wait_seconds: estimated_wait
                    .as_secs()
                    .min(u64::from(max_wait_minutes) * 60),
                target_form_id: form_id.to_string(),
                max_wait_minutes,
            }),
            AdmissionResult::Rejected { message } => Err(AppError::FormLocked { message }),
        }
    }
}
