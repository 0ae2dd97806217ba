use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info};

use super::executable::{ExecutableJob, JobRunner};
use crate::error::WorkerError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Fixed set of worker threads fed by a bounded queue.
pub struct WorkerPool {
    job_sender: Sender<ExecutableJob>,
    job_receiver: Receiver<ExecutableJob>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
    busy: Arc<AtomicUsize>,
    capacity: usize,
}

impl WorkerPool {
    /// Starts `worker_count` workers sharing a queue of `queue_capacity` jobs.
    pub fn new(
        runner: Arc<JobRunner>,
        worker_count: usize,
        queue_capacity: usize,
    ) -> Result<Self, WorkerError> {
        let (job_sender, job_receiver) = bounded::<ExecutableJob>(queue_capacity);
        let shutdown = Arc::new(AtomicBool::new(false));
        let busy = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let busy_count = Arc::clone(&busy);
            let worker_runner = Arc::clone(&runner);

            let handle = thread::Builder::new()
                .name(format!("dr-worker-{worker_id}"))
                .spawn(move || {
                    run_worker(worker_id, job_rx, shutdown_flag, busy_count, worker_runner);
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;
            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            job_sender,
            job_receiver,
            workers: Mutex::new(workers),
            shutdown,
            busy,
            capacity: queue_capacity,
        })
    }

    /// Queues a job without blocking. Fails when the queue is full or the
    /// pool is shutting down; the job is handed back in neither case.
    pub fn submit(&self, job: ExecutableJob) -> Result<(), WorkerError> {
        let id = job.job_id();
        if self.is_shutdown() {
            return Err(WorkerError::ShuttingDown(id));
        }
        self.job_sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => WorkerError::QueueFull(id),
            TrySendError::Disconnected(_) => WorkerError::ChannelClosed,
        })
    }

    /// Free slots in the queue.
    pub fn remaining_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.job_sender.len())
    }

    pub fn busy_workers(&self) -> usize {
        self.busy.load(Ordering::Acquire)
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Release);
    }

    /// Joins all workers, then returns the jobs still queued.
    pub fn wait(&self) -> Vec<ExecutableJob> {
        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        for (i, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }
        info!("All workers have stopped");
        self.job_receiver.try_iter().collect()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<ExecutableJob>,
    shutdown: Arc<AtomicBool>,
    busy: Arc<AtomicUsize>,
    runner: Arc<JobRunner>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Acquire) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(POLL_INTERVAL) {
            Ok(job) => {
                debug!("Worker {} running {} job {}", worker_id, job.kind(), job.job_id());
                busy.fetch_add(1, Ordering::AcqRel);
                job.run(&runner);
                busy.fetch_sub(1, Ordering::AcqRel);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
