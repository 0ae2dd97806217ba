use std::sync::Arc;

use log::{info, warn};

use super::executable::{ExecutableJob, JobRunner};
use super::pool::WorkerPool;
use crate::error::WorkerError;
use crate::model::Job;
use crate::service::JobService;

/// Hands locked jobs to the worker pool. A job the pool refuses is unlocked
/// again so a later acquisition cycle can pick it up.
pub struct JobExecutor {
    pool: WorkerPool,
    jobs: Arc<JobService>,
}

impl JobExecutor {
    pub fn new(runner: Arc<JobRunner>, worker_count: usize, queue_capacity: usize) -> Result<Self, WorkerError> {
        let jobs = Arc::clone(&runner.jobs);
        Ok(Self {
            pool: WorkerPool::new(runner, worker_count, queue_capacity.max(1))?,
            jobs,
        })
    }

    /// Returns `true` when the job was queued.
    pub fn execute(&self, job: Job) -> bool {
        let id = job.id;
        let Some(task) = ExecutableJob::from_job(job) else {
            warn!("Job {} is not in an executable state, unlocking", id);
            self.release(id);
            return false;
        };
        match self.pool.submit(task) {
            Ok(()) => true,
            Err(e) => {
                warn!("{}", e);
                self.release(id);
                false
            }
        }
    }

    pub fn remaining_capacity(&self) -> usize {
        self.pool.remaining_capacity()
    }

    pub fn is_shutdown(&self) -> bool {
        self.pool.is_shutdown()
    }

    /// Stops the workers after their current job and unlocks whatever was
    /// still queued.
    pub fn shutdown(&self) {
        self.pool.shutdown();
        let leftover = self.pool.wait();
        if !leftover.is_empty() {
            info!("Unlocking {} queued job(s) on shutdown", leftover.len());
        }
        for task in leftover {
            self.release(task.job_id());
        }
    }

    fn release(&self, id: i64) {
        if let Err(e) = self.jobs.unlock(id) {
            warn!("Failed to unlock job {}: {}", id, e);
        }
    }
}
