use std::collections::HashSet;
use std::path::Path;

use crate::compare::PropertiesArg;
use crate::config::application::{ApplicationConfig, ApplicationJobConfig, ConditionName};
use crate::config::engine::EngineConfig;
use crate::error::ConfigError;

const APPLICATION_SCHEMA_JSON: &str = include_str!("../../schema/application-v1.json");

pub fn load_engine_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let content = read(path.as_ref())?;
    load_engine_config_from_str(&content)
}

pub fn load_engine_config_from_str(content: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = serde_json::from_str(content)?;
    validate_engine_config(&config)?;
    Ok(config)
}

pub fn load_application<P: AsRef<Path>>(path: P) -> Result<ApplicationConfig, ConfigError> {
    let content = read(path.as_ref())?;
    load_application_from_str(&content)
}

pub fn load_application_from_str(content: &str) -> Result<ApplicationConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let app: ApplicationConfig = serde_json::from_value(json_value)?;

    validate_application(&app)?;

    Ok(app)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })
}

fn validate_engine_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.jobs.worker_count == 0 {
        return Err(validation("jobs.workerCount must be greater than 0"));
    }
    if config.jobs.queue_capacity() == 0 {
        return Err(validation("jobs.queueCapacity must be greater than 0"));
    }
    if config.jobs.acquisition.max_jobs == 0 {
        return Err(validation("jobs.acquisition.maxJobs must be greater than 0"));
    }
    if config.pagination.default_limit == 0 {
        return Err(validation("pagination.defaultLimit must be greater than 0"));
    }
    Ok(())
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(APPLICATION_SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_application(app: &ApplicationConfig) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for job in &app.jobs {
        if job.name.trim().is_empty() {
            return Err(validation(format!(
                "Application '{}' has a job without a name",
                app.name
            )));
        }
        if !names.insert(job.name.as_str()) {
            return Err(validation(format!(
                "Application '{}' has duplicate job '{}'",
                app.name, job.name
            )));
        }
        validate_job(job)?;
    }
    Ok(())
}

fn validate_job(job: &ApplicationJobConfig) -> Result<(), ConfigError> {
    if let Some(link) = &job.discover.link_source_and_target {
        PropertiesArg::parse(link).map_err(|e| {
            validation(format!("Job '{}': invalid link expression: {}", job.name, e))
        })?;
    }

    let actions = job
        .reconcile
        .as_ref()
        .and_then(|r| r.target.as_ref())
        .map(|t| &t.reconcile_actions);

    for filter in &job.discover.filters {
        if let Some(condition) = &filter.condition {
            match condition.name {
                ConditionName::SourceMismatchedInTarget
                | ConditionName::SourceScript
                | ConditionName::TargetScript
                    if condition.arg.as_deref().map_or(true, str::is_empty) =>
                {
                    return Err(validation(format!(
                        "Job '{}', filter '{}': condition {:?} requires an arg",
                        job.name, filter.name, condition.name
                    )));
                }
                ConditionName::SourceInTarget
                | ConditionName::SourceNotInTarget
                | ConditionName::SourceMismatchedInTarget
                | ConditionName::TargetNotInSource => {
                    if let Some(arg) = condition.arg.as_deref().filter(|a| !a.is_empty()) {
                        PropertiesArg::parse(arg).map_err(|e| {
                            validation(format!(
                                "Job '{}', filter '{}': {}",
                                job.name, filter.name, e
                            ))
                        })?;
                    }
                }
                ConditionName::SourceScript | ConditionName::TargetScript => {}
            }
        }

        if let (Some(actions), Some(action)) = (actions, &filter.reconcile_action) {
            if !actions.contains_key(action) {
                return Err(validation(format!(
                    "Job '{}', filter '{}': reconcile action '{}' is not defined",
                    job.name, filter.name, action
                )));
            }
        }
    }
    Ok(())
}

fn validation(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}
