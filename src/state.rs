use std::sync::Arc;

use crate::{
    config::Config,
    database::RedisStore,
    gate::AdmissionGate,
    lock::LockController,
    policy::PolicyStore,
    status::StatusResponder,
    store::CoordinationStore,
};

pub struct AppState {
    pub config: Config,
    pub policies: Arc<PolicyStore>,
    pub gate: Arc<AdmissionGate>,
    pub lock: LockController,
    pub responder: StatusResponder,
}

impl AppState {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();

        let store: Arc<dyn CoordinationStore> =
            Arc::new(RedisStore::connect(&config.redis_url).await);

        Self::with_store(config, store)
    }

    /// Wires the components around any store backend; tests and local
    /// development pass a [`crate::memory::MemoryStore`].
    pub fn with_store(config: Config, store: Arc<dyn CoordinationStore>) -> Arc<Self> {
        let policies = Arc::new(PolicyStore::new());
        let gate = Arc::new(AdmissionGate::new(store, policies.clone()));
        let lock = LockController::new(policies.clone());
        let responder =
            StatusResponder::new(gate.clone(), policies.clone(), config.max_wait_minutes);

        Arc::new(Self {
            config,
            policies,
            gate,
            lock,
            responder,
        })
    }
}
