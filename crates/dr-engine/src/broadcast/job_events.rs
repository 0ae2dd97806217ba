//! Job status change broadcaster.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::JobStatusWaiter;
use crate::model::{JobId, JobStatus};

/// Emitted after a job's status has been persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: JobId,
    pub status: JobStatus,
}

impl JobEvent {
    pub fn new(job_id: JobId, status: JobStatus) -> Self {
        Self { job_id, status }
    }

    /// The job is waiting to be picked up by the acquisition task.
    pub fn is_runnable(&self) -> bool {
        matches!(self.status, JobStatus::New | JobStatus::ReconcileRequested)
    }
}

/// Fans job events out to subscribers and releases matching waiters.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
    waiter: Arc<JobStatusWaiter>,
}

impl JobEventBroadcaster {
    pub fn new(capacity: usize, waiter: Arc<JobStatusWaiter>) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
            waiter,
        }
    }

    pub fn publish(&self, event: JobEvent) {
        log::debug!("Job {} is now {}", event.job_id, event.status);
        self.waiter.notify(&event);
        // No receivers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn waiter(&self) -> &Arc<JobStatusWaiter> {
        &self.waiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_subscribers() {
        let broadcaster = JobEventBroadcaster::new(16, Arc::new(JobStatusWaiter::new()));
        let mut rx = broadcaster.subscribe();
        broadcaster.publish(JobEvent::new(3, JobStatus::New));
        let event = rx.try_recv().unwrap();
        assert_eq!(event, JobEvent::new(3, JobStatus::New));
        assert!(event.is_runnable());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let broadcaster = JobEventBroadcaster::new(16, Arc::new(JobStatusWaiter::new()));
        broadcaster.publish(JobEvent::new(1, JobStatus::Completed));
    }

    #[test]
    fn test_publish_releases_waiter() {
        let waiter = Arc::new(JobStatusWaiter::new());
        let broadcaster = JobEventBroadcaster::new(16, waiter.clone());
        let handle = waiter.register(5, &[JobStatus::Discovered]).unwrap();
        broadcaster.publish(JobEvent::new(5, JobStatus::Discovered));
        assert_eq!(
            handle.wait(std::time::Duration::from_millis(10)),
            Some(JobStatus::Discovered)
        );
    }
}
