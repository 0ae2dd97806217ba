//! The engine's API: job creation and lookup, discovery, reconcile and
//! schedules.

mod discovery;
mod job;
mod reconcile;
mod schedule;

pub use discovery::DiscoveryService;
pub use job::{generate_job_name, JobService};
pub use reconcile::ReconcileService;
pub use schedule::{next_due_date, ScheduleService};
