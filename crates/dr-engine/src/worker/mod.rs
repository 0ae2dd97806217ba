//! Background execution: the worker pool, the acquisition loop feeding it
//! and the housekeeping tasks.

pub mod acquisition;
pub mod executable;
pub mod executor;
pub mod housekeeping;
pub mod pool;

pub use acquisition::AcquisitionTask;
pub use executable::{ExecutableJob, JobRunner};
pub use executor::JobExecutor;
pub use housekeeping::{repair_after_restart, sweep_expired_jobs, HousekeepingTask};
pub use pool::WorkerPool;
