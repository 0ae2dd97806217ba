use std::path::PathBuf;
use thiserror::Error;

pub use crate::db::DatabaseError;
pub use crate::execution::ExecutionError;

#[derive(Error, Debug)]
pub enum DrError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("{0}")]
    Service(#[from] ServiceError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

impl DrError {
    /// Classifies the error into the taxonomy callers branch on.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DrError::Config(_) => ErrorKind::Validation,
            DrError::Database(DatabaseError::StaleWrite { .. }) => ErrorKind::StaleWrite,
            DrError::Database(_) => ErrorKind::Infrastructure,
            DrError::Service(e) => e.kind(),
            DrError::Execution(_) | DrError::Script(_) | DrError::Pipeline(_) => {
                ErrorKind::Execution
            }
            DrError::Worker(_) => ErrorKind::Infrastructure,
        }
    }

    /// Returns the service error carried by this error, if any.
    pub fn as_service(&self) -> Option<&ServiceError> {
        match self {
            DrError::Service(e) => Some(e),
            _ => None,
        }
    }
}

/// Broad error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    StaleWrite,
    Execution,
    Infrastructure,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("Failed to scan '{path}': {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Errors raised by the service API. Each variant carries a stable `DR-nn` code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Feature pack '{0}' not found")]
    FeaturePackNotFound(String),

    #[error("Application '{0}' not found")]
    AppNotFound(String),

    #[error("Job '{job_name}' not found in application '{application}'")]
    JobNotFoundInConfig {
        application: String,
        job_name: String,
    },

    #[error("Missing mandatory inputs: {}", .0.join(", "))]
    MissingInputs(Vec<String>),

    #[error("Job '{0}' not found")]
    JobNotFound(i64),

    #[error("Operation ongoing for job '{0}'")]
    OperationOngoing(i64),

    #[error("Invalid filter parameter: {0}")]
    InvalidFilterParam(String),

    #[error("Filter condition not supported: {0}")]
    FilterConditionNotSupported(String),

    #[error("Non unique source target mapping for link expression '{0}'")]
    NonUniqueSourceTargetMapping(String),

    #[error("Either id or name must be provided for {0}")]
    IdOrNameNotProvided(String),

    #[error("Job '{id}' is in state {status}, reconcile is only allowed from DISCOVERED, PARTIALLY_RECONCILED or RECONCILE_FAILED")]
    InvalidStateForReconcile { id: i64, status: String },

    #[error("Discovered object '{0}' not found")]
    ObjectNotFound(i64),

    #[error("Job schedule '{0}' not found")]
    JobScheduleNotFound(i64),

    #[error("Job schedule '{0}' already exists")]
    JobScheduleExists(String),

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("Job '{0}' is scheduled and can only be removed by deleting its schedule")]
    CannotDeleteScheduledJob(i64),

    #[error("Job '{0}' is in progress and belongs to an enabled schedule")]
    CannotDeleteActiveScheduledJob(i64),

    #[error("Job schedule '{0}' cannot be enabled while one of its jobs is in progress")]
    CannotEnableJobSchedule(i64),

    #[error("Cannot force delete in progress jobs belonging to a schedule: {}", .0.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", "))]
    CannotForceDeleteInProgressScheduledJobs(Vec<i64>),

    #[error("Job '{0}' is already being waited on")]
    AlreadyWaiting(i64),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::FeaturePackNotFound(_) => "DR-01",
            ServiceError::AppNotFound(_) => "DR-06",
            ServiceError::JobNotFoundInConfig { .. } => "DR-15",
            ServiceError::MissingInputs(_) => "DR-16",
            ServiceError::JobNotFound(_) => "DR-17",
            ServiceError::OperationOngoing(_) => "DR-18",
            ServiceError::InvalidFilterParam(_) => "DR-23",
            ServiceError::FilterConditionNotSupported(_) => "DR-24",
            ServiceError::NonUniqueSourceTargetMapping(_) => "DR-25",
            ServiceError::IdOrNameNotProvided(_) => "DR-35",
            ServiceError::InvalidStateForReconcile { .. } => "DR-36",
            ServiceError::ObjectNotFound(_) => "DR-37",
            ServiceError::JobScheduleNotFound(_) => "DR-38",
            ServiceError::JobScheduleExists(_) => "DR-39",
            ServiceError::InvalidCronExpression { .. } => "DR-40",
            ServiceError::CannotDeleteScheduledJob(_) => "DR-41",
            ServiceError::CannotDeleteActiveScheduledJob(_) => "DR-42",
            ServiceError::CannotEnableJobSchedule(_) => "DR-44",
            ServiceError::CannotForceDeleteInProgressScheduledJobs(_) => "DR-57",
            ServiceError::AlreadyWaiting(_) => "DR-500",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::MissingInputs(_)
            | ServiceError::InvalidFilterParam(_)
            | ServiceError::FilterConditionNotSupported(_)
            | ServiceError::IdOrNameNotProvided(_)
            | ServiceError::InvalidCronExpression { .. }
            | ServiceError::JobNotFoundInConfig { .. } => ErrorKind::Validation,
            ServiceError::FeaturePackNotFound(_)
            | ServiceError::AppNotFound(_)
            | ServiceError::JobNotFound(_)
            | ServiceError::ObjectNotFound(_)
            | ServiceError::JobScheduleNotFound(_) => ErrorKind::NotFound,
            ServiceError::OperationOngoing(_)
            | ServiceError::NonUniqueSourceTargetMapping(_)
            | ServiceError::InvalidStateForReconcile { .. }
            | ServiceError::JobScheduleExists(_)
            | ServiceError::CannotDeleteScheduledJob(_)
            | ServiceError::CannotDeleteActiveScheduledJob(_)
            | ServiceError::CannotEnableJobSchedule(_)
            | ServiceError::CannotForceDeleteInProgressScheduledJobs(_)
            | ServiceError::AlreadyWaiting(_) => ErrorKind::Conflict,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Script '{name}' not found in feature pack '{feature_pack}'")]
    NotFound { feature_pack: String, name: String },

    #[error("Failed to evaluate expression: {0}")]
    Evaluation(String),

    #[error("Failed to convert script value: {0}")]
    Conversion(String),
}

/// Failures while linking or filtering fetched objects.
#[derive(Error, Debug)]
pub enum CompareError {
    #[error("Invalid property pairs '{0}', expected 'sourceProp:targetProp&sourceProp2:targetProp2'")]
    InvalidPropertyPairs(String),

    #[error("{0}")]
    Service(#[from] ServiceError),

    #[error("Filter '{filter}' failed: {source}")]
    Script {
        filter: String,
        #[source]
        source: ScriptError,
    },
}

/// A failed pipeline stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Service(#[from] ServiceError),

    #[error("{0}")]
    Execution(#[from] ExecutionError),

    #[error("{0}")]
    Script(#[from] ScriptError),

    #[error("{0}")]
    Compare(#[from] CompareError),

    #[error("{0}")]
    Database(#[from] DatabaseError),

    #[error("{0}")]
    Stage(String),

    /// Several failures collected from one stage.
    #[error("{}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(";"))]
    Multiple(Vec<PipelineError>),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Worker queue is full, job {0} rejected")]
    QueueFull(i64),

    #[error("Worker pool is shutting down, job {0} rejected")]
    ShuttingDown(i64),
}

pub type Result<T> = std::result::Result<T, DrError>;
