//! Job status events and the blocking wait registry built on them.

pub mod job_events;
pub mod waiter;

pub use job_events::{JobEvent, JobEventBroadcaster};
pub use waiter::{JobStatusWaiter, WaitHandle};
