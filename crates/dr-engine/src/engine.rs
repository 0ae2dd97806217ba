//! Top-level wiring: one [`Engine`] per process owns the database, the
//! services, the worker pool and the background loops.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{info, warn};

use crate::alarm::{AlarmSink, LogAlarmSink};
use crate::broadcast::{JobEventBroadcaster, JobStatusWaiter};
use crate::compare::ComparisonEngine;
use crate::config::{ApplicationCatalog, EngineConfig, FileApplicationCatalog};
use crate::db::Database;
use crate::error::{ConfigError, Result};
use crate::execution::ActionExecutor;
use crate::script::{RhaiScriptEvaluator, ScriptAssets, ScriptEvaluator};
use crate::service::{DiscoveryService, JobService, ReconcileService, ScheduleService};
use crate::worker::{
    repair_after_restart, AcquisitionTask, HousekeepingTask, JobExecutor, JobRunner,
};

const EVENT_CAPACITY: usize = 1024;

/// Collects the collaborators of an [`Engine`]. A catalog and an action
/// executor are required; everything else has a default.
pub struct EngineBuilder {
    config: EngineConfig,
    catalog: Option<Arc<dyn ApplicationCatalog>>,
    script_assets: Option<Arc<dyn ScriptAssets>>,
    scripts: Option<Arc<dyn ScriptEvaluator>>,
    executor: Option<Arc<dyn ActionExecutor>>,
    alarms: Option<Arc<dyn AlarmSink>>,
    database: Option<Database>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            catalog: None,
            script_assets: None,
            scripts: None,
            executor: None,
            alarms: None,
            database: None,
        }
    }

    pub fn catalog(mut self, catalog: Arc<dyn ApplicationCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Uses a file catalog both for application definitions and for the
    /// named scripts of its feature packs.
    pub fn file_catalog(mut self, catalog: Arc<FileApplicationCatalog>) -> Self {
        self.script_assets = Some(catalog.clone() as Arc<dyn ScriptAssets>);
        self.catalog = Some(catalog as Arc<dyn ApplicationCatalog>);
        self
    }

    pub fn scripts(mut self, scripts: Arc<dyn ScriptEvaluator>) -> Self {
        self.scripts = Some(scripts);
        self
    }

    pub fn action_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn alarms(mut self, alarms: Arc<dyn AlarmSink>) -> Self {
        self.alarms = Some(alarms);
        self
    }

    /// Uses an already opened database instead of `config.database_path`.
    pub fn database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    /// Opens the database and starts the worker threads. Background loops
    /// only run after [`Engine::start`].
    pub fn build(self) -> Result<Engine> {
        let config = self.config;
        let catalog = self.catalog.ok_or_else(|| ConfigError::Validation {
            message: "an application catalog is required".into(),
        })?;
        let executor = self.executor.ok_or_else(|| ConfigError::Validation {
            message: "an action executor is required".into(),
        })?;
        let scripts: Arc<dyn ScriptEvaluator> = match self.scripts {
            Some(scripts) => scripts,
            None => {
                let assets: Arc<dyn ScriptAssets> = match self.script_assets {
                    Some(assets) => assets,
                    None => Arc::new(FileApplicationCatalog::new()),
                };
                Arc::new(RhaiScriptEvaluator::new(assets))
            }
        };
        let alarms: Arc<dyn AlarmSink> = match self.alarms {
            Some(alarms) => alarms,
            None => Arc::new(LogAlarmSink),
        };
        let database = match self.database {
            Some(db) => db,
            None => Database::open(&config.database_path)?,
        };

        let events = JobEventBroadcaster::new(EVENT_CAPACITY, Arc::new(JobStatusWaiter::new()));
        let jobs = Arc::new(JobService::new(
            database,
            catalog,
            events,
            alarms,
            config.executor_name.clone(),
            config.pagination.default_limit,
        ));
        let runner = Arc::new(JobRunner {
            discovery: Arc::new(DiscoveryService::new(
                jobs.clone(),
                executor.clone(),
                ComparisonEngine::new(scripts),
            )),
            reconcile: Arc::new(ReconcileService::new(jobs.clone(), executor)),
            schedules: Arc::new(ScheduleService::new(jobs.clone())),
            jobs: jobs.clone(),
        });

        let job_executor = Arc::new(JobExecutor::new(
            runner.clone(),
            config.jobs.worker_count,
            config.jobs.queue_capacity(),
        )?);
        let acquisition = Arc::new(AcquisitionTask::new(
            job_executor.clone(),
            jobs,
            config.jobs.acquisition.max_jobs,
        ));
        let housekeeping =
            HousekeepingTask::new(runner.jobs.clone(), config.jobs.cleanup.max_age_days);

        info!(
            "Engine '{}' ready with {} worker(s)",
            config.executor_name, config.jobs.worker_count
        );

        Ok(Engine {
            config,
            runner,
            executor: job_executor,
            acquisition,
            housekeeping,
            threads: Mutex::new(Vec::new()),
        })
    }
}

pub struct Engine {
    config: EngineConfig,
    runner: Arc<JobRunner>,
    executor: Arc<JobExecutor>,
    acquisition: Arc<AcquisitionTask>,
    housekeeping: HousekeepingTask,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn jobs(&self) -> &Arc<JobService> {
        &self.runner.jobs
    }

    pub fn discovery(&self) -> &Arc<DiscoveryService> {
        &self.runner.discovery
    }

    pub fn reconcile(&self) -> &Arc<ReconcileService> {
        &self.runner.reconcile
    }

    pub fn schedules(&self) -> &Arc<ScheduleService> {
        &self.runner.schedules
    }

    /// Repairs jobs left behind by a previous run of this executor, then
    /// starts the acquisition and housekeeping loops. Calling it again is a
    /// no-op.
    pub fn start(&self) -> Result<()> {
        let mut threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        if !threads.is_empty() {
            return Ok(());
        }

        let repaired = repair_after_restart(&self.runner.jobs, &self.runner.schedules)?;
        if repaired > 0 {
            warn!("Repaired {} job(s) interrupted by a restart", repaired);
        }

        let jobs = &self.config.jobs;
        threads.push(self.acquisition.start(
            self.runner.jobs.events().subscribe(),
            Duration::from_millis(jobs.acquisition.scheduler_delay_ms),
        )?);
        threads.push(
            self.housekeeping
                .start(Duration::from_secs(jobs.cleanup.interval_secs))?,
        );
        info!("Engine started");
        Ok(())
    }

    /// Runs one acquisition cycle right away. Returns the number of jobs
    /// handed to the workers.
    pub fn acquire_now(&self) -> Result<usize> {
        Ok(self.acquisition.acquire_once()?)
    }

    /// Stops the loops, lets running jobs finish and unlocks queued ones.
    pub fn shutdown(&self) {
        info!("Shutting down engine...");
        self.acquisition.stop();
        self.housekeeping.stop();

        let threads = std::mem::take(
            &mut *self.threads.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for handle in threads {
            if handle.join().is_err() {
                warn!("Background thread panicked");
            }
        }
        self.executor.shutdown();
        info!("Engine shutdown complete");
    }
}
