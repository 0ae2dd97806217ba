use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::JobService;
use crate::db::DatabaseError;
use crate::error::{Result, ServiceError};
use crate::execution::ActionExecutor;
use crate::model::{Job, JobId, JobStatus, ReconcileRequest};
use crate::pipeline::{merge_inputs, validate_inputs, ReconcilePipeline};

const RECONCILE_TERMINAL: [JobStatus; 3] = [
    JobStatus::Completed,
    JobStatus::PartiallyReconciled,
    JobStatus::ReconcileFailed,
];

pub struct ReconcileService {
    jobs: Arc<JobService>,
    pipeline: ReconcilePipeline,
}

impl ReconcileService {
    pub fn new(jobs: Arc<JobService>, executor: Arc<dyn ActionExecutor>) -> Self {
        Self {
            pipeline: ReconcilePipeline::new(executor, jobs.clone()),
            jobs,
        }
    }

    /// Stores the request on the job and moves it to RECONCILE_REQUESTED.
    /// Only DISCOVERED, PARTIALLY_RECONCILED and RECONCILE_FAILED jobs accept it.
    pub fn request_reconcile(&self, job_id: JobId, request: ReconcileRequest) -> Result<Job> {
        let mut job = self.prepare(job_id, request)?;
        self.jobs.save(&mut job)?;
        info!(job_id, "Reconcile requested");
        Ok(job)
    }

    /// Runs reconciliation on a locked job.
    pub fn execute_reconcile(&self, job: &mut Job) -> std::result::Result<JobStatus, DatabaseError> {
        self.pipeline.run(job)
    }

    /// Requests a reconcile and blocks until it has finished or `timeout`
    /// elapses. Returns the job as it is at that point.
    pub fn execute_reconcile_synchronously(
        &self,
        job_id: JobId,
        request: ReconcileRequest,
        timeout: Duration,
    ) -> Result<Job> {
        let mut job = self.prepare(job_id, request)?;
        let handle = self
            .jobs
            .events()
            .waiter()
            .register(job_id, &RECONCILE_TERMINAL)?;
        self.jobs.save(&mut job)?;

        match handle.wait(timeout) {
            Some(status) => info!(job_id, %status, "Synchronous reconcile finished"),
            None => info!(job_id, "Synchronous reconcile timed out"),
        }
        self.jobs.get_job(job_id)
    }

    fn prepare(&self, job_id: JobId, request: ReconcileRequest) -> Result<Job> {
        let mut job = self.jobs.get_job(job_id)?;
        if !job.status.allows_reconcile() {
            return Err(ServiceError::InvalidStateForReconcile {
                id: job_id,
                status: job.status.to_string(),
            }
            .into());
        }
        let app_job = self.jobs.application_job(&job)?;
        validate_inputs(
            app_job.reconcile_inputs(),
            &merge_inputs([&job.specification.inputs, &request.inputs]),
        )?;

        job.status = JobStatus::ReconcileRequested;
        job.error_message = None;
        job.reconcile_request = Some(request);
        Ok(job)
    }
}
