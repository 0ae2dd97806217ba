//! Per-job wait latches for the synchronous APIs.
//!
//! A caller registers interest in a set of statuses for one job, triggers
//! the work, then blocks on the returned handle. Only one waiter per job id
//! may be registered at a time; the entry is removed when the handle drops.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use super::JobEvent;
use crate::error::ServiceError;
use crate::model::{JobId, JobStatus};

struct Latch {
    targets: Vec<JobStatus>,
    reached: Mutex<Option<JobStatus>>,
    cond: Condvar,
}

impl Latch {
    fn release(&self, status: JobStatus) -> bool {
        if !self.targets.contains(&status) {
            return false;
        }
        let mut reached = self.reached.lock().unwrap_or_else(PoisonError::into_inner);
        if reached.is_none() {
            *reached = Some(status);
            self.cond.notify_all();
        }
        true
    }
}

/// Registry of wait latches keyed by job id.
#[derive(Default)]
pub struct JobStatusWaiter {
    latches: Mutex<HashMap<JobId, Arc<Latch>>>,
}

impl JobStatusWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a latch released when the job reaches one of `statuses`.
    pub fn register(
        self: &Arc<Self>,
        job_id: JobId,
        statuses: &[JobStatus],
    ) -> Result<WaitHandle, ServiceError> {
        let mut latches = self.latches.lock().unwrap_or_else(PoisonError::into_inner);
        if latches.contains_key(&job_id) {
            return Err(ServiceError::AlreadyWaiting(job_id));
        }
        let latch = Arc::new(Latch {
            targets: statuses.to_vec(),
            reached: Mutex::new(None),
            cond: Condvar::new(),
        });
        latches.insert(job_id, latch.clone());
        Ok(WaitHandle {
            job_id,
            latch,
            registry: Arc::clone(self),
        })
    }

    /// Releases the job's latch if the event status is one it waits for.
    pub fn notify(&self, event: &JobEvent) {
        let latch = {
            let latches = self.latches.lock().unwrap_or_else(PoisonError::into_inner);
            latches.get(&event.job_id).cloned()
        };
        if let Some(latch) = latch {
            if latch.release(event.status) {
                log::debug!("Released waiter for job {} at {}", event.job_id, event.status);
            }
        }
    }

    pub fn is_waiting(&self, job_id: JobId) -> bool {
        self.latches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&job_id)
    }

    fn remove(&self, job_id: JobId, latch: &Arc<Latch>) {
        let mut latches = self.latches.lock().unwrap_or_else(PoisonError::into_inner);
        if latches
            .get(&job_id)
            .is_some_and(|current| Arc::ptr_eq(current, latch))
        {
            latches.remove(&job_id);
        }
    }
}

/// A registered wait. Dropping it unregisters the latch.
pub struct WaitHandle {
    job_id: JobId,
    latch: Arc<Latch>,
    registry: Arc<JobStatusWaiter>,
}

impl WaitHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Releases the latch directly, for a status read back after registering.
    pub fn offer(&self, status: JobStatus) -> bool {
        self.latch.release(status)
    }

    /// Blocks until a target status is reached or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> Option<JobStatus> {
        let reached = self
            .latch
            .reached
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (reached, _) = self
            .latch
            .cond
            .wait_timeout_while(reached, timeout, |r| r.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        *reached
    }
}

impl Drop for WaitHandle {
    fn drop(&mut self) {
        self.registry.remove(self.job_id, &self.latch);
    }
}
