use std::{fmt, sync::Arc};

use leakscan_core::JobOrchestrator;
use leakscan_core::persistence::{FindingStore, JobRepository, ObjectLedger};

use crate::infra::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jobs: Arc<dyn JobRepository>,
    pub ledger: Arc<dyn ObjectLedger>,
    pub findings: Arc<dyn FindingStore>,
    pub orchestrator: Arc<JobOrchestrator>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
