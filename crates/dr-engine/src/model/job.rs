use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PropertyMap, ReconcileRequest};

pub type JobId = i64;

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    New,
    Scheduled,
    DiscoveryInprogress,
    Discovered,
    DiscoveryFailed,
    ReconcileRequested,
    ReconcileInprogress,
    Completed,
    PartiallyReconciled,
    ReconcileFailed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 10] = [
        JobStatus::New,
        JobStatus::Scheduled,
        JobStatus::DiscoveryInprogress,
        JobStatus::Discovered,
        JobStatus::DiscoveryFailed,
        JobStatus::ReconcileRequested,
        JobStatus::ReconcileInprogress,
        JobStatus::Completed,
        JobStatus::PartiallyReconciled,
        JobStatus::ReconcileFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "NEW",
            JobStatus::Scheduled => "SCHEDULED",
            JobStatus::DiscoveryInprogress => "DISCOVERY_INPROGRESS",
            JobStatus::Discovered => "DISCOVERED",
            JobStatus::DiscoveryFailed => "DISCOVERY_FAILED",
            JobStatus::ReconcileRequested => "RECONCILE_REQUESTED",
            JobStatus::ReconcileInprogress => "RECONCILE_INPROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::PartiallyReconciled => "PARTIALLY_RECONCILED",
            JobStatus::ReconcileFailed => "RECONCILE_FAILED",
        }
    }

    /// Discovery or reconcile is currently executing.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            JobStatus::DiscoveryInprogress | JobStatus::ReconcileInprogress
        )
    }

    /// A reconcile may be requested from this status.
    pub fn allows_reconcile(&self) -> bool {
        matches!(
            self,
            JobStatus::Discovered | JobStatus::PartiallyReconciled | JobStatus::ReconcileFailed
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, JobStatus::DiscoveryFailed | JobStatus::ReconcileFailed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown job status '{}'", s))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOptions {
    #[serde(default)]
    pub auto_reconcile: bool,
}

/// A validated, persisted job specification. Shared by all jobs of a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpecification {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub feature_pack_id: String,
    pub feature_pack_name: String,
    pub application_id: String,
    pub application_name: String,
    pub application_job_name: String,
    pub inputs: PropertyMap,
    pub execution_options: ExecutionOptions,
}

/// A job specification as submitted by a caller, before resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpecificationRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub feature_pack_id: Option<String>,
    #[serde(default)]
    pub feature_pack_name: Option<String>,
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub application_name: Option<String>,
    pub application_job_name: String,
    #[serde(default)]
    pub inputs: PropertyMap,
    #[serde(default)]
    pub execution_options: ExecutionOptions,
}

impl From<&JobSpecification> for JobSpecificationRequest {
    fn from(spec: &JobSpecification) -> Self {
        Self {
            name: Some(spec.name.clone()),
            description: spec.description.clone(),
            feature_pack_id: Some(spec.feature_pack_id.clone()),
            feature_pack_name: Some(spec.feature_pack_name.clone()),
            application_id: Some(spec.application_id.clone()),
            application_name: Some(spec.application_name.clone()),
            application_job_name: spec.application_job_name.clone(),
            inputs: spec.inputs.clone(),
            execution_options: spec.execution_options.clone(),
        }
    }
}

/// A unit of discovery and reconcile work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub specification: JobSpecification,
    pub status: JobStatus,
    pub job_schedule_id: Option<i64>,
    pub message_subscription_id: Option<i64>,
    pub discovered_objects_count: i64,
    pub reconciled_objects_count: i64,
    pub reconciled_objects_error_count: i64,
    pub error_message: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub modified_date: DateTime<Utc>,
    pub completed_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub locked: bool,
    pub lock_time: Option<DateTime<Utc>>,
    pub executor: Option<String>,
    pub reconcile_request: Option<ReconcileRequest>,
    pub version: i64,
}

impl Job {
    /// A job not yet persisted. `id` and `version` are assigned on insert.
    pub fn new(specification: JobSpecification, status: JobStatus) -> Self {
        Self {
            id: 0,
            specification,
            status,
            job_schedule_id: None,
            message_subscription_id: None,
            discovered_objects_count: 0,
            reconciled_objects_count: 0,
            reconciled_objects_error_count: 0,
            error_message: None,
            start_date: None,
            modified_date: Utc::now(),
            completed_date: None,
            due_date: None,
            locked: false,
            lock_time: None,
            executor: None,
            reconcile_request: None,
            version: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.specification.name
    }

    pub fn feature_pack_id(&self) -> &str {
        &self.specification.feature_pack_id
    }

    pub fn auto_reconcile(&self) -> bool {
        self.specification.execution_options.auto_reconcile
    }

    /// Triggered by a schedule or a message rather than a direct request.
    pub fn is_triggered_externally(&self) -> bool {
        self.job_schedule_id.is_some() || self.message_subscription_id.is_some()
    }
}
