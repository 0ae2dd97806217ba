pub mod alarm;
pub mod broadcast;
pub mod compare;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod execution;
pub mod model;
pub mod pipeline;
pub mod script;
pub mod service;
pub mod status;
pub mod telemetry;
pub mod worker;

pub use alarm::{AlarmSink, LogAlarmSink};
pub use broadcast::{JobEvent, JobEventBroadcaster, JobStatusWaiter, WaitHandle};
pub use compare::{ComparisonEngine, Condition, FetchedObject};
pub use config::{
    load_application, load_application_from_str, load_engine_config, ApplicationCatalog,
    ApplicationConfig, EngineConfig, FileApplicationCatalog,
};
pub use db::{Database, DatabaseError};
pub use engine::{Engine, EngineBuilder};
pub use error::{
    ConfigError, DrError, ErrorKind, PipelineError, Result, ScriptError, ServiceError,
    WorkerError,
};
pub use execution::{ActionExecutor, ExecutionError, ExecutionResult};
pub use model::{
    CreateJobSchedule, DiscoveredObject, ExecutionOptions, Filter, FilterStatus, Job, JobQuery,
    JobSchedule, JobSpecification, JobSpecificationRequest, JobStatus, ObjectQuery, ObjectSort,
    ObjectStatus, Page, PropertyMap, ReconcileObject, ReconcileRequest,
};
pub use script::{RhaiScriptEvaluator, ScriptEvaluator};
pub use service::{DiscoveryService, JobService, ReconcileService, ScheduleService};
pub use telemetry::init_tracing;
pub use worker::{AcquisitionTask, ExecutableJob, JobExecutor, WorkerPool};
