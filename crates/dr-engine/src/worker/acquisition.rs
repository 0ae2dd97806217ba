//! Periodic job acquisition.
//!
//! One task per engine polls the job table on a fixed interval, and also
//! right away when a job becomes runnable, locks what the worker queue can
//! take and hands it to the [`JobExecutor`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Notify};

use super::executor::JobExecutor;
use crate::broadcast::JobEvent;
use crate::db::{job_repo, DatabaseError};
use crate::error::WorkerError;
use crate::service::JobService;

pub struct AcquisitionTask {
    executor: Arc<JobExecutor>,
    jobs: Arc<JobService>,
    max_jobs: usize,
    running: AtomicBool,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl AcquisitionTask {
    pub fn new(executor: Arc<JobExecutor>, jobs: Arc<JobService>, max_jobs: usize) -> Self {
        Self {
            executor,
            jobs,
            max_jobs,
            running: AtomicBool::new(false),
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Runs one acquisition cycle and returns the number of jobs queued.
    /// A cycle that overlaps a running one is skipped.
    pub fn acquire_once(&self) -> Result<usize, DatabaseError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("Acquisition already running, skipping");
            return Ok(0);
        }
        let result = self.acquire();
        self.running.store(false, Ordering::Release);
        result
    }

    fn acquire(&self) -> Result<usize, DatabaseError> {
        if self.executor.is_shutdown() {
            return Ok(0);
        }
        let limit = self.max_jobs.min(self.executor.remaining_capacity());
        if limit == 0 {
            log::debug!("Worker queue saturated, skipping acquisition");
            return Ok(0);
        }

        let locked = job_repo::find_and_lock_executable(self.jobs.database(), limit, Utc::now())?;
        let mut queued = 0;
        for job in locked {
            if self.executor.execute(job) {
                queued += 1;
            }
        }
        if queued > 0 {
            log::info!("Acquired {} job(s)", queued);
        }
        Ok(queued)
    }

    /// Starts the acquisition loop on its own thread. The loop wakes on every
    /// `interval` tick and on runnable job events.
    pub fn start(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<JobEvent>,
        interval: Duration,
    ) -> Result<JoinHandle<()>, WorkerError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;
        let task = Arc::clone(self);

        std::thread::Builder::new()
            .name("dr-acquisition".into())
            .spawn(move || {
                rt.block_on(async {
                    let mut ticker = tokio::time::interval(interval);
                    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

                    loop {
                        if task.is_stopped() {
                            break;
                        }

                        tokio::select! {
                            _ = ticker.tick() => {},
                            event = events.recv() => match event {
                                Ok(event) if event.is_runnable() => {
                                    log::debug!("Job {} is runnable, acquiring", event.job_id);
                                }
                                Ok(_) => continue,
                                Err(RecvError::Lagged(skipped)) => {
                                    log::debug!("Acquisition lagged {} job events", skipped);
                                }
                                Err(RecvError::Closed) => break,
                            },
                            _ = task.wake.notified() => {},
                        }

                        if task.is_stopped() {
                            break;
                        }

                        if let Err(e) = task.acquire_once() {
                            log::error!("Job acquisition failed: {}", e);
                        }
                    }
                    log::debug!("Acquisition loop stopped");
                });
            })
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))
    }

    /// Signals the loop to stop and wakes it.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
