use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, PropertyMap};

/// Status of a discovered object, derived from its filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectStatus {
    Discovered,
    Reconciling,
    Reconciled,
    PartiallyReconciled,
    ReconcileFailed,
}

impl ObjectStatus {
    pub const ALL: [ObjectStatus; 5] = [
        ObjectStatus::Discovered,
        ObjectStatus::Reconciling,
        ObjectStatus::Reconciled,
        ObjectStatus::PartiallyReconciled,
        ObjectStatus::ReconcileFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectStatus::Discovered => "DISCOVERED",
            ObjectStatus::Reconciling => "RECONCILING",
            ObjectStatus::Reconciled => "RECONCILED",
            ObjectStatus::PartiallyReconciled => "PARTIALLY_RECONCILED",
            ObjectStatus::ReconcileFailed => "RECONCILE_FAILED",
        }
    }
}

impl fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown object status '{}'", s))
    }
}

/// Reconcile status of a single matched filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterStatus {
    NotStarted,
    Inprogress,
    Completed,
    Failed,
}

impl FilterStatus {
    pub const ALL: [FilterStatus; 4] = [
        FilterStatus::NotStarted,
        FilterStatus::Inprogress,
        FilterStatus::Completed,
        FilterStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterStatus::NotStarted => "NOT_STARTED",
            FilterStatus::Inprogress => "INPROGRESS",
            FilterStatus::Completed => "COMPLETED",
            FilterStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for FilterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown filter status '{}'", s))
    }
}

/// A filter matched against a discovered object, with its reconcile state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub id: i64,
    pub name: String,
    pub discrepancy: String,
    pub reconcile_action: Option<String>,
    pub status: FilterStatus,
    pub command: Option<String>,
    pub command_response: Option<String>,
    pub error_msg: Option<String>,
    pub version: i64,
}

impl Filter {
    /// Moves the filter to INPROGRESS, clearing the previous attempt.
    pub fn start(&mut self) {
        self.status = FilterStatus::Inprogress;
        self.command = None;
        self.command_response = None;
        self.error_msg = None;
    }

    pub fn complete(&mut self, command: String, response: String) {
        self.status = FilterStatus::Completed;
        self.command = Some(command);
        self.command_response = Some(response);
    }

    pub fn fail(&mut self, error: String, command: Option<String>, response: Option<String>) {
        self.status = FilterStatus::Failed;
        self.error_msg = Some(error);
        if command.is_some() {
            self.command = command;
        }
        if response.is_some() {
            self.command_response = response;
        }
    }
}

/// A persisted discovered object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredObject {
    pub id: i64,
    pub job_id: JobId,
    pub source_properties: Option<PropertyMap>,
    pub target_properties: Option<PropertyMap>,
    pub status: ObjectStatus,
    pub error_message: Option<String>,
    pub filters: Vec<Filter>,
    pub creation_date: DateTime<Utc>,
    pub modified_date: DateTime<Utc>,
    pub version: i64,
}

impl DiscoveredObject {
    pub fn filter_mut(&mut self, name: &str) -> Option<&mut Filter> {
        self.filters.iter_mut().find(|f| f.name == name)
    }

    pub fn filter_statuses(&self) -> impl Iterator<Item = FilterStatus> + '_ {
        self.filters.iter().map(|f| f.status)
    }

    /// Already being reconciled by another run, or nothing left to do.
    pub fn is_reconcile_ongoing_or_completed(&self) -> bool {
        matches!(
            self.status,
            ObjectStatus::Reconciling | ObjectStatus::Reconciled
        )
    }
}

/// A discovered object about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDiscoveredObject {
    pub source_properties: Option<PropertyMap>,
    pub target_properties: Option<PropertyMap>,
    pub filters: Vec<NewFilter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFilter {
    pub name: String,
    pub discrepancy: String,
    pub reconcile_action: Option<String>,
}
