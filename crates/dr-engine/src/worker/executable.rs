use std::sync::Arc;

use log::{error, info, warn};

use crate::model::{Job, JobId, JobStatus};
use crate::service::{DiscoveryService, JobService, ReconcileService, ScheduleService};

/// The services a worker needs to run any kind of job.
pub struct JobRunner {
    pub jobs: Arc<JobService>,
    pub discovery: Arc<DiscoveryService>,
    pub reconcile: Arc<ReconcileService>,
    pub schedules: Arc<ScheduleService>,
}

/// A locked job, classified by what running it means.
#[derive(Debug, Clone)]
pub enum ExecutableJob {
    Discovery(Job),
    Reconcile(Job),
    /// A due SCHEDULED job: discovery, then the schedule's next job.
    Scheduled(Job),
}

impl ExecutableJob {
    pub fn from_job(job: Job) -> Option<Self> {
        match job.status {
            JobStatus::New => Some(Self::Discovery(job)),
            JobStatus::ReconcileRequested => Some(Self::Reconcile(job)),
            JobStatus::Scheduled => Some(Self::Scheduled(job)),
            _ => None,
        }
    }

    pub fn job(&self) -> &Job {
        match self {
            Self::Discovery(job) | Self::Reconcile(job) | Self::Scheduled(job) => job,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job().id
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Discovery(_) => "discovery",
            Self::Reconcile(_) => "reconcile",
            Self::Scheduled(_) => "scheduled",
        }
    }

    /// Runs the job to completion. The job is unlocked afterwards, also when
    /// its pipeline could not persist the outcome.
    pub fn run(self, runner: &JobRunner) {
        let kind = self.kind();
        let id = self.job_id();
        let outcome = match self {
            Self::Discovery(mut job) => runner.discovery.execute_discovery(&mut job),
            Self::Reconcile(mut job) => runner.reconcile.execute_reconcile(&mut job),
            Self::Scheduled(mut job) => {
                let outcome = runner.discovery.execute_discovery(&mut job);
                match runner.schedules.create_next_scheduled_job(&job) {
                    Ok(Some(next)) => info!("Job {} scheduled next run as job {}", id, next.id),
                    Ok(None) => {}
                    Err(e) => error!("Failed to schedule next run after job {}: {}", id, e),
                }
                outcome
            }
        };

        match outcome {
            Ok(status) => info!("{} job {} finished with {}", kind, id, status),
            Err(e) => {
                error!("{} job {} failed: {}", kind, id, e);
                if let Err(e) = runner.jobs.unlock(id) {
                    warn!("Failed to unlock job {}: {}", id, e);
                }
            }
        }
    }
}
