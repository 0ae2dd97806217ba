use serde::{Deserialize, Serialize};

use super::{JobStatus, ObjectStatus};

/// One page of results plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
}

/// Job listing and bulk-delete filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobQuery {
    pub status: Option<JobStatus>,
    pub name: Option<String>,
    pub feature_pack_name: Option<String>,
    pub application_name: Option<String>,
    pub job_schedule_id: Option<i64>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl JobQuery {
    /// True when no filter criterion is set. Paging alone does not count.
    pub fn has_no_criteria(&self) -> bool {
        self.status.is_none()
            && self.name.is_none()
            && self.feature_pack_name.is_none()
            && self.application_name.is_none()
            && self.job_schedule_id.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectSort {
    #[default]
    IdAsc,
    IdDesc,
    StatusAsc,
    StatusDesc,
}

impl ObjectSort {
    pub(crate) fn order_by(&self) -> &'static str {
        match self {
            ObjectSort::IdAsc => "o.id ASC",
            ObjectSort::IdDesc => "o.id DESC",
            ObjectSort::StatusAsc => "o.status ASC, o.id ASC",
            ObjectSort::StatusDesc => "o.status DESC, o.id ASC",
        }
    }
}

/// Discovered object listing filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectQuery {
    pub status: Option<ObjectStatus>,
    pub filter_name: Option<String>,
    #[serde(default)]
    pub sort: ObjectSort,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}
