use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobSpecification, JobSpecificationRequest};

/// A cron schedule producing one SCHEDULED job at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSchedule {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub expression: String,
    pub enabled: bool,
    pub specification: JobSpecification,
    pub creation_date: DateTime<Utc>,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobSchedule {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub expression: String,
    pub job_specification: JobSpecificationRequest,
}
