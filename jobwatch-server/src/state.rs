use std::collections::HashMap;
use std::sync::Arc;

use libjobwatch::aggregate::EventAggregator;
use libjobwatch::config::AggregatorConfig;
use libjobwatch::log::*;
use tokio::sync::Mutex;

pub type JobId = u64;

pub type SharedState = Arc<Mutex<ServerState>>;

/// One aggregator per job that has pushed events or status.
#[derive(Debug, Default)]
pub struct ServerState {
    config: AggregatorConfig,
    jobs: HashMap<JobId, EventAggregator>,
}

impl ServerState {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            config,
            jobs: HashMap::new(),
        }
    }

    pub fn shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }

    /// The job's aggregator, created on first use.
    pub fn job_mut(&mut self, job_id: JobId) -> &mut EventAggregator {
        let config = &self.config;
        self.jobs.entry(job_id).or_insert_with(|| {
            info!("tracking job {}", job_id);
            EventAggregator::new(config.clone())
        })
    }

    pub fn job(&self, job_id: JobId) -> Option<&EventAggregator> {
        self.jobs.get(&job_id)
    }

    pub fn existing_job_mut(&mut self, job_id: JobId) -> Option<&mut EventAggregator> {
        self.jobs.get_mut(&job_id)
    }

    pub fn remove(&mut self, job_id: JobId) -> Option<EventAggregator> {
        let removed = self.jobs.remove(&job_id);
        if removed.is_some() {
            info!("dropped job {}", job_id);
        }
        removed
    }
}
