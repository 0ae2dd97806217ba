use std::sync::Arc;
use std::thread;

use tracing::{debug, info, info_span};

use super::context::discovery_substitution_context;
use super::inputs::validate_inputs;
use crate::compare::{link_sources_and_targets, ComparisonEngine, FetchedObject, ObjectRole};
use crate::config::{ActionDescriptor, ApplicationJobConfig};
use crate::db::{object_repo, DatabaseError};
use crate::error::PipelineError;
use crate::execution::{ActionExecutor, ExecutionError};
use crate::model::{Job, JobStatus, NewDiscoveredObject};
use crate::service::JobService;

/// Fetches sources and targets, compares them and persists every object
/// that matched at least one filter.
pub struct DiscoveryPipeline {
    executor: Arc<dyn ActionExecutor>,
    comparison: ComparisonEngine,
    jobs: Arc<JobService>,
}

#[derive(Default)]
struct DiscoveryContext {
    app_job: Option<Arc<ApplicationJobConfig>>,
    sources: Vec<FetchedObject>,
    targets: Vec<FetchedObject>,
    discovered: i64,
}

impl DiscoveryPipeline {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        comparison: ComparisonEngine,
        jobs: Arc<JobService>,
    ) -> Self {
        Self {
            executor,
            comparison,
            jobs,
        }
    }

    /// Runs discovery for a locked job and leaves it unlocked in DISCOVERED,
    /// COMPLETED or DISCOVERY_FAILED. Stage failures are recorded on the job;
    /// only a failure to persist the outcome is returned.
    pub fn run(&self, job: &mut Job) -> Result<JobStatus, DatabaseError> {
        let _pipeline_span = info_span!("discovery",
            job_id = job.id,
            name = %job.name(),
        )
        .entered();

        self.jobs
            .set_in_progress(job, JobStatus::DiscoveryInprogress)?;

        let mut ctx = DiscoveryContext::default();
        match self.run_stages(job, &mut ctx) {
            Ok(()) => {
                self.jobs.discovery_completed(job, ctx.discovered)?;
                info!(discovered = ctx.discovered, status = %job.status, "Discovery finished");
            }
            Err(e) => self.jobs.discovery_failed(job, &e.to_string())?,
        }
        Ok(job.status)
    }

    fn run_stages(&self, job: &Job, ctx: &mut DiscoveryContext) -> Result<(), PipelineError> {
        // Step 1: Validate inputs
        {
            let _step = info_span!("validate").entered();
            self.step_validate(job, ctx)?;
        }

        // Step 2: Fetch sources and targets
        {
            let _step = info_span!("fetch").entered();
            self.step_fetch(job, ctx)?;
        }

        // Step 3: Enrich
        {
            let _step = info_span!("enrich").entered();
            self.step_enrich(job, ctx)?;
        }

        // Step 4: Link
        {
            let _step = info_span!("link").entered();
            self.step_link(ctx)?;
        }

        // Step 5: Compare
        {
            let _step = info_span!("compare").entered();
            self.step_compare(job, ctx)?;
        }

        // Step 6: Save
        {
            let _step = info_span!("save").entered();
            self.step_save(job, ctx)?;
        }

        Ok(())
    }

    fn step_validate(&self, job: &Job, ctx: &mut DiscoveryContext) -> Result<(), PipelineError> {
        let app_job = self.jobs.application_job(job)?;
        let inputs = &job.specification.inputs;
        validate_inputs(&app_job.discover.inputs, inputs)?;
        if job.auto_reconcile() {
            validate_inputs(app_job.reconcile_inputs(), inputs)?;
        }
        ctx.app_job = Some(app_job);
        Ok(())
    }

    fn step_fetch(&self, job: &Job, ctx: &mut DiscoveryContext) -> Result<(), PipelineError> {
        let app_job = app_job(ctx)?;
        let source_action = &app_job.discover.source.fetch_action;
        let target_action = app_job
            .discover
            .target
            .as_ref()
            .and_then(|t| t.fetch_action.as_ref());

        let (sources, targets) = thread::scope(|scope| {
            let targets = target_action.map(|action| scope.spawn(move || self.fetch(job, action)));
            let sources = self.fetch(job, source_action);
            let targets = match targets {
                Some(handle) => handle
                    .join()
                    .unwrap_or_else(|_| Err(ExecutionError::new("Target fetch panicked"))),
                None => Ok(Vec::new()),
            };
            (sources, targets)
        });

        match (sources, targets) {
            (Ok(sources), Ok(targets)) => {
                debug!(sources = sources.len(), targets = targets.len(), "Fetched");
                ctx.sources = sources;
                ctx.targets = targets;
                Ok(())
            }
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e.into()),
            (Err(a), Err(b)) => Err(PipelineError::Multiple(vec![a.into(), b.into()])),
        }
    }

    fn fetch(
        &self,
        job: &Job,
        action: &ActionDescriptor,
    ) -> Result<Vec<FetchedObject>, ExecutionError> {
        let context = discovery_substitution_context(job, None);
        let result = self
            .executor
            .execute(job.feature_pack_id(), action, &context)?;
        Ok(result
            .mapped_records
            .into_iter()
            .map(FetchedObject::new)
            .collect())
    }

    fn step_enrich(&self, job: &Job, ctx: &mut DiscoveryContext) -> Result<(), PipelineError> {
        let app_job = app_job(ctx)?;
        if let Some(action) = &app_job.discover.source.enrich_action {
            for object in ctx.sources.iter_mut() {
                self.enrich(job, action, ObjectRole::Source, object)?;
            }
        }
        let target_enrich = app_job
            .discover
            .target
            .as_ref()
            .and_then(|t| t.enrich_action.as_ref());
        if let Some(action) = target_enrich {
            for object in ctx.targets.iter_mut() {
                self.enrich(job, action, ObjectRole::Target, object)?;
            }
        }
        Ok(())
    }

    fn enrich(
        &self,
        job: &Job,
        action: &ActionDescriptor,
        role: ObjectRole,
        object: &mut FetchedObject,
    ) -> Result<(), ExecutionError> {
        let context = discovery_substitution_context(job, Some((role, &object.properties)));
        let result = self
            .executor
            .execute(job.feature_pack_id(), action, &context)?;
        let record = result
            .mapped_records
            .into_iter()
            .next()
            .ok_or_else(|| ExecutionError::new("Enrich action returned no records"))?;
        object.merge(record);
        Ok(())
    }

    fn step_link(&self, ctx: &mut DiscoveryContext) -> Result<(), PipelineError> {
        let app_job = app_job(ctx)?;
        if let Some(expression) = app_job.discover.link_source_and_target.as_deref() {
            link_sources_and_targets(expression, &mut ctx.sources, &mut ctx.targets)?;
        }
        Ok(())
    }

    fn step_compare(&self, job: &Job, ctx: &mut DiscoveryContext) -> Result<(), PipelineError> {
        let app_job = app_job(ctx)?;
        self.comparison.compare(
            &app_job.discover.filters,
            &mut ctx.sources,
            &mut ctx.targets,
            &job.specification.inputs,
            job.feature_pack_id(),
        )?;
        Ok(())
    }

    fn step_save(&self, job: &Job, ctx: &mut DiscoveryContext) -> Result<(), PipelineError> {
        let sources = std::mem::take(&mut ctx.sources);
        let targets = std::mem::take(&mut ctx.targets);
        let objects: Vec<NewDiscoveredObject> = sources
            .into_iter()
            .filter(|o| !o.matches.is_empty())
            .map(|o| o.into_new_discovered(ObjectRole::Source))
            .chain(
                targets
                    .into_iter()
                    .filter(|o| !o.matches.is_empty())
                    .map(|o| o.into_new_discovered(ObjectRole::Target)),
            )
            .collect();

        let saved = object_repo::insert_all(self.jobs.database(), job.id, &objects)?;
        ctx.discovered = saved as i64;
        Ok(())
    }
}

fn app_job(ctx: &DiscoveryContext) -> Result<Arc<ApplicationJobConfig>, PipelineError> {
    ctx.app_job
        .clone()
        .ok_or_else(|| PipelineError::Stage("Application job not resolved".into()))
}
