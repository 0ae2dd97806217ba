//! Discovery and reconcile pipelines.
//!
//! Each pipeline runs its stages in order on the worker thread that owns
//! the job's lock. The first failing stage routes the job to its failed
//! finalisation; the job is always unlocked when the pipeline returns.

mod context;
mod discovery;
mod inputs;
mod reconcile;

pub use context::{discovery_substitution_context, reconcile_substitution_context};
pub use discovery::DiscoveryPipeline;
pub use inputs::{merge_inputs, validate_inputs};
pub use reconcile::{PlannedObject, ReconcilePipeline, ReconcilePlan};
