//! Status roll-ups: filter statuses into an object status, object status
//! counts into a job status. Both are pure functions.

use std::collections::{BTreeSet, HashMap};

use crate::model::{FilterStatus, JobStatus, ObjectStatus};

/// Computes a discovered object's status from the set of its filter statuses.
pub fn evaluate_object_status<I>(filter_statuses: I) -> ObjectStatus
where
    I: IntoIterator<Item = FilterStatus>,
{
    let statuses: BTreeSet<FilterStatus> = filter_statuses.into_iter().collect();
    let has = |s: FilterStatus| statuses.contains(&s);

    if statuses.len() == 1 && has(FilterStatus::Completed) {
        ObjectStatus::Reconciled
    } else if (statuses.len() == 1 && has(FilterStatus::Failed))
        || (statuses.len() == 2 && has(FilterStatus::Failed) && has(FilterStatus::NotStarted))
    {
        ObjectStatus::ReconcileFailed
    } else if has(FilterStatus::Inprogress) {
        ObjectStatus::Reconciling
    } else if statuses.len() > 1 && has(FilterStatus::Completed) {
        ObjectStatus::PartiallyReconciled
    } else {
        ObjectStatus::Discovered
    }
}

/// Number of discovered objects of a job per status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredObjectStatusCounts {
    counts: HashMap<ObjectStatus, i64>,
}

impl DiscoveredObjectStatusCounts {
    pub fn new<I>(counts: I) -> Self
    where
        I: IntoIterator<Item = (ObjectStatus, i64)>,
    {
        let mut map = HashMap::new();
        for (status, count) in counts {
            if count > 0 {
                *map.entry(status).or_insert(0) += count;
            }
        }
        Self { counts: map }
    }

    pub fn get(&self, status: ObjectStatus) -> i64 {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    /// Number of distinct statuses present.
    pub fn total_statuses(&self) -> usize {
        self.counts.len()
    }

    pub fn total_objects(&self) -> i64 {
        self.counts.values().sum()
    }
}

/// Computes a job's status from the aggregate status of its objects.
pub fn evaluate_job_status(counts: &DiscoveredObjectStatusCounts) -> JobStatus {
    let discovered = counts.get(ObjectStatus::Discovered);
    let reconciled = counts.get(ObjectStatus::Reconciled);
    let partial = counts.get(ObjectStatus::PartiallyReconciled);
    let failed = counts.get(ObjectStatus::ReconcileFailed);
    let reconciling = counts.get(ObjectStatus::Reconciling);
    let total = counts.total_statuses();

    if total == 1 && discovered > 0 {
        JobStatus::Discovered
    } else if total == 1 && reconciled > 0 {
        JobStatus::Completed
    } else if failed > 0 && reconciled == 0 && partial == 0 {
        JobStatus::ReconcileFailed
    } else if reconciling == 0 && ((reconciled > 0 && total > 1) || partial > 0) {
        JobStatus::PartiallyReconciled
    } else if reconciling > 0 {
        JobStatus::ReconcileInprogress
    } else {
        JobStatus::Discovered
    }
}
