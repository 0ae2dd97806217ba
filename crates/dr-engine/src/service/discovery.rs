use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::JobService;
use crate::compare::ComparisonEngine;
use crate::db::{object_repo, DatabaseError};
use crate::error::{Result, ServiceError};
use crate::execution::ActionExecutor;
use crate::model::{
    DiscoveredObject, Job, JobId, JobSpecificationRequest, JobStatus, ObjectQuery, Page,
};
use crate::pipeline::{DiscoveryPipeline, ReconcilePipeline};

const DISCOVERY_TERMINAL: [JobStatus; 3] = [
    JobStatus::Discovered,
    JobStatus::DiscoveryFailed,
    JobStatus::Completed,
];

const AUTO_RECONCILE_TERMINAL: [JobStatus; 4] = [
    JobStatus::DiscoveryFailed,
    JobStatus::Completed,
    JobStatus::PartiallyReconciled,
    JobStatus::ReconcileFailed,
];

/// Entry points for starting discovery and reading its results.
pub struct DiscoveryService {
    jobs: Arc<JobService>,
    discovery: DiscoveryPipeline,
    reconcile: ReconcilePipeline,
}

impl DiscoveryService {
    pub fn new(
        jobs: Arc<JobService>,
        executor: Arc<dyn ActionExecutor>,
        comparison: ComparisonEngine,
    ) -> Self {
        Self {
            discovery: DiscoveryPipeline::new(executor.clone(), comparison, jobs.clone()),
            reconcile: ReconcilePipeline::new(executor, jobs.clone()),
            jobs,
        }
    }

    /// Creates a NEW job. It is picked up by the next acquisition cycle.
    pub fn start_discovery(&self, request: &JobSpecificationRequest) -> Result<JobId> {
        Ok(self.jobs.create_job(request, None)?.id)
    }

    /// Like [`start_discovery`](Self::start_discovery), for a job triggered
    /// by a message subscription.
    pub fn start_discovery_from_message(
        &self,
        request: &JobSpecificationRequest,
        message_subscription_id: i64,
    ) -> Result<JobId> {
        Ok(self
            .jobs
            .create_job(request, Some(message_subscription_id))?
            .id)
    }

    /// Starts a new discovery with the specification of an existing job.
    pub fn start_duplicate_discovery(&self, job_id: JobId) -> Result<JobId> {
        Ok(self.jobs.duplicate_job(job_id)?.id)
    }

    /// Runs discovery on a locked job, followed by reconciliation when the
    /// job asks for it and something was discovered.
    pub fn execute_discovery(&self, job: &mut Job) -> std::result::Result<JobStatus, DatabaseError> {
        let status = self.discovery.run(job)?;
        if status == JobStatus::Discovered && job.auto_reconcile() {
            info!(job_id = job.id, "Auto reconcile");
            return self.reconcile.run(job);
        }
        Ok(status)
    }

    /// Creates a job and blocks until its discovery (and auto-reconcile, if
    /// requested) has finished or `timeout` elapses. Returns the job as it
    /// is at that point, including any error message.
    pub fn execute_discovery_synchronously(
        &self,
        request: &JobSpecificationRequest,
        timeout: Duration,
    ) -> Result<Job> {
        let targets: &[JobStatus] = if request.execution_options.auto_reconcile {
            &AUTO_RECONCILE_TERMINAL
        } else {
            &DISCOVERY_TERMINAL
        };

        let job = self.jobs.insert_job(request, None)?;
        let handle = self.jobs.events().waiter().register(job.id, targets)?;
        // An acquisition cycle may have run it already.
        let current = self.jobs.get_job(job.id)?;
        handle.offer(current.status);
        self.jobs.publish(&current);

        match handle.wait(timeout) {
            Some(status) => info!(job_id = job.id, %status, "Synchronous discovery finished"),
            None => info!(job_id = job.id, "Synchronous discovery timed out"),
        }
        self.jobs.get_job(job.id)
    }

    pub fn get_discovered_objects(
        &self,
        job_id: JobId,
        query: &ObjectQuery,
    ) -> Result<Page<DiscoveredObject>> {
        self.jobs.get_job(job_id)?;
        let (items, total_count) = object_repo::query(
            self.jobs.database(),
            job_id,
            query,
            self.jobs.default_limit(),
        )?;
        Ok(Page { items, total_count })
    }

    pub fn find_discovered_object(&self, job_id: JobId, object_id: i64) -> Result<DiscoveredObject> {
        self.jobs.get_job(job_id)?;
        object_repo::find_by_id(self.jobs.database(), job_id, object_id)?
            .ok_or_else(|| ServiceError::ObjectNotFound(object_id).into())
    }
}
