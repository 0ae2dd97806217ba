//! Test harness running a complete engine against a temporary database.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;

use dr_engine::config::ActionDescriptor;
use dr_engine::{
    ActionExecutor, AlarmSink, ApplicationConfig, Database, Engine, EngineConfig,
    ExecutionError, ExecutionResult, FileApplicationCatalog, Job, JobSpecificationRequest,
    PropertyMap,
};

use super::builders::{job_request, FEATURE_PACK};

pub const WAIT: Duration = Duration::from_secs(10);

/// Answers actions by their `op` name with canned records or failures,
/// and records every call with its context.
#[derive(Default)]
pub struct FakeExecutor {
    answers: Mutex<HashMap<String, Result<Vec<Value>, String>>>,
    calls: Mutex<Vec<(String, PropertyMap)>>,
}

impl FakeExecutor {
    pub fn returns(&self, op: &str, records: Vec<Value>) {
        self.answers.lock().unwrap().insert(op.into(), Ok(records));
    }

    pub fn fails(&self, op: &str, message: &str) {
        self.answers
            .lock()
            .unwrap()
            .insert(op.into(), Err(message.into()));
    }

    /// Back to the default answer: success without records.
    pub fn succeeds(&self, op: &str) {
        self.answers.lock().unwrap().remove(op);
    }

    pub fn ops(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(op, _)| op.clone())
            .collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.ops().iter().filter(|o| *o == op).count()
    }

    pub fn contexts(&self, op: &str) -> Vec<PropertyMap> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _)| o == op)
            .map(|(_, context)| context.clone())
            .collect()
    }
}

impl ActionExecutor for FakeExecutor {
    fn execute(
        &self,
        _feature_pack_id: &str,
        action: &ActionDescriptor,
        context: &PropertyMap,
    ) -> Result<ExecutionResult, ExecutionError> {
        let op = action.0["op"].as_str().unwrap_or_default().to_string();
        self.calls.lock().unwrap().push((op.clone(), context.clone()));
        match self.answers.lock().unwrap().get(&op) {
            Some(Ok(records)) => Ok(ExecutionResult {
                mapped_records: records
                    .iter()
                    .filter_map(|r| r.as_object().cloned())
                    .collect(),
                command: op.clone(),
                response: "ok".into(),
            }),
            Some(Err(message)) => Err(ExecutionError::new(message.clone()).with_command(op)),
            None => Ok(ExecutionResult {
                mapped_records: vec![],
                command: op,
                response: "ok".into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RaisedAlarm {
    pub fault: String,
    pub description: String,
    pub resource: String,
}

#[derive(Default)]
pub struct RecordingAlarms(Mutex<Vec<RaisedAlarm>>);

impl RecordingAlarms {
    pub fn raised(&self) -> Vec<RaisedAlarm> {
        self.0.lock().unwrap().clone()
    }
}

impl AlarmSink for RecordingAlarms {
    fn raise_alarm(&self, fault_name: &str, description: &str, resource: &str) {
        self.0.lock().unwrap().push(RaisedAlarm {
            fault: fault_name.into(),
            description: description.into(),
            resource: resource.into(),
        });
    }
}

/// A started engine with a fake executor, on its own database file.
pub struct TestHarness {
    temp_dir: TempDir,
    pub db_path: PathBuf,
    pub engine: Engine,
    pub executor: Arc<FakeExecutor>,
    pub alarms: Arc<RecordingAlarms>,
}

impl TestHarness {
    pub fn new(app: ApplicationConfig) -> Self {
        Self::with_config(app, |_| {})
    }

    pub fn with_config(app: ApplicationConfig, customize: impl FnOnce(&mut EngineConfig)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("dr.db");
        let mut config = test_config(db_path.clone());
        customize(&mut config);

        let executor = Arc::new(FakeExecutor::default());
        let alarms = Arc::new(RecordingAlarms::default());
        let engine = build_engine(config, app, executor.clone(), alarms.clone());
        engine.start().expect("engine starts");

        Self {
            temp_dir,
            db_path,
            engine,
            executor,
            alarms,
        }
    }

    pub fn database(&self) -> &Database {
        self.engine.jobs().database()
    }

    /// Runs a discovery through the acquisition loop and waits for it.
    pub fn discover(&self, request: &JobSpecificationRequest) -> Job {
        self.engine
            .discovery()
            .execute_discovery_synchronously(request, WAIT)
            .expect("discovery accepted")
    }

    pub fn discover_default(&self) -> Job {
        self.discover(&job_request())
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.engine.shutdown();
    }
}

pub fn test_config(database_path: PathBuf) -> EngineConfig {
    let mut config = EngineConfig {
        database_path,
        executor_name: "node-1".into(),
        ..Default::default()
    };
    config.jobs.worker_count = 2;
    config.jobs.acquisition.scheduler_delay_ms = 50;
    config
}

pub fn build_engine(
    config: EngineConfig,
    app: ApplicationConfig,
    executor: Arc<FakeExecutor>,
    alarms: Arc<RecordingAlarms>,
) -> Engine {
    let catalog = Arc::new(FileApplicationCatalog::new());
    catalog.register_application(FEATURE_PACK, app);
    Engine::builder(config)
        .file_catalog(catalog)
        .action_executor(executor)
        .alarms(alarms)
        .build()
        .expect("engine builds")
}

/// Polls `check` until it returns `Some` or `WAIT` elapses.
pub fn eventually<T>(mut check: impl FnMut() -> Option<T>) -> T {
    let deadline = std::time::Instant::now() + WAIT;
    loop {
        if let Some(value) = check() {
            return value;
        }
        assert!(std::time::Instant::now() < deadline, "condition not met in time");
        std::thread::sleep(Duration::from_millis(20));
    }
}
