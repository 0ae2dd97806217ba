pub mod application;
pub mod catalog;
pub mod engine;
pub mod loader;

pub use application::{
    ActionDescriptor, ApplicationConfig, ApplicationJobConfig, ConditionName, DiscoverConfig,
    DiscoverSourceConfig, DiscoverTargetConfig, FilterCondition, FilterDefinition,
    InputDeclaration, ReconcileConfig, ReconcileSourceConfig, ReconcileTargetConfig,
};
pub use catalog::{ApplicationCatalog, ApplicationRef, FileApplicationCatalog};
pub use engine::{
    AcquisitionConfig, CleanupConfig, EngineConfig, JobsConfig, LogFormat, LoggingConfig,
    PaginationConfig,
};
pub use loader::{
    load_application, load_application_from_str, load_engine_config,
    load_engine_config_from_str,
};
