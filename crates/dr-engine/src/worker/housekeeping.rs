use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::db::{job_repo, DatabaseError};
use crate::error::{Result, WorkerError};
use crate::model::JobStatus;
use crate::service::{JobService, ScheduleService};

/// Deletes jobs started more than `max_age_days` before `now`. Jobs that are
/// still executing are kept.
pub fn sweep_expired_jobs(
    jobs: &JobService,
    max_age_days: u32,
    now: DateTime<Utc>,
) -> std::result::Result<usize, DatabaseError> {
    let cutoff = now - chrono::Duration::days(i64::from(max_age_days));
    let expired = job_repo::find_started_before(jobs.database(), cutoff)?;
    for job in &expired {
        job_repo::delete(jobs.database(), job)?;
    }
    if !expired.is_empty() {
        info!(count = expired.len(), %cutoff, "Deleted expired jobs");
    }
    Ok(expired.len())
}

/// Fails scheduled jobs this executor left in progress when it went down,
/// and queues the next run of their schedule.
pub fn repair_after_restart(jobs: &JobService, schedules: &ScheduleService) -> Result<usize> {
    let stranded = job_repo::find_in_progress_scheduled(jobs.database(), jobs.executor_name())?;
    for mut job in stranded.iter().cloned() {
        let status = match job.status {
            JobStatus::ReconcileInprogress => JobStatus::ReconcileFailed,
            _ => JobStatus::DiscoveryFailed,
        };
        warn!(job_id = job.id, from = %job.status, to = %status, "Repairing job after restart");
        job.status = status;
        job.error_message = Some(format!("Set job state to {status} after restart"));
        job.locked = false;
        job.lock_time = None;
        jobs.save(&mut job)?;
        schedules.create_next_scheduled_job(&job)?;
    }
    Ok(stranded.len())
}

/// Runs the retention sweep on a fixed interval.
pub struct HousekeepingTask {
    jobs: Arc<JobService>,
    max_age_days: u32,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl HousekeepingTask {
    pub fn new(jobs: Arc<JobService>, max_age_days: u32) -> Self {
        Self {
            jobs,
            max_age_days,
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn start(&self, interval: Duration) -> std::result::Result<JoinHandle<()>, WorkerError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;
        let jobs = Arc::clone(&self.jobs);
        let shutdown = Arc::clone(&self.shutdown);
        let wake = Arc::clone(&self.wake);
        let max_age_days = self.max_age_days;

        std::thread::Builder::new()
            .name("dr-housekeeping".into())
            .spawn(move || {
                rt.block_on(async {
                    let mut ticker = tokio::time::interval(interval);

                    loop {
                        tokio::select! {
                            _ = ticker.tick() => {},
                            _ = wake.notified() => {},
                        }
                        if shutdown.load(Ordering::Acquire) {
                            break;
                        }
                        if let Err(e) = sweep_expired_jobs(&jobs, max_age_days, Utc::now()) {
                            log::error!("Retention sweep failed: {}", e);
                        }
                    }
                });
            })
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_one();
    }
}
