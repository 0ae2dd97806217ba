use std::sync::Arc;

use tracing::{debug, info, info_span, warn};

use super::context::reconcile_substitution_context;
use super::inputs::{merge_inputs, validate_inputs};
use crate::config::{ActionDescriptor, ApplicationJobConfig};
use crate::db::{object_repo, Database, DatabaseError};
use crate::error::PipelineError;
use crate::execution::{ActionExecutor, ExecutionError, ExecutionResult};
use crate::model::{
    DiscoveredObject, FilterStatus, Job, JobStatus, ObjectStatus, PropertyMap, ReconcileRequest,
};
use crate::service::JobService;
use crate::status::evaluate_object_status;

/// One object selected for reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedObject {
    pub object_id: i64,
    /// Filters to run, in order.
    pub filters: Vec<String>,
    pub inputs: PropertyMap,
}

/// What a reconcile request resolves to for one job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub objects: Vec<PlannedObject>,
}

impl ReconcilePlan {
    /// An empty object list selects every object not yet RECONCILED; an empty
    /// filter list selects all filters of the application job. Per-object
    /// filters replace the request's; inputs layer job, request, then object.
    pub fn resolve(
        db: &Database,
        job: &Job,
        app_job: &ApplicationJobConfig,
        request: &ReconcileRequest,
    ) -> Result<Self, DatabaseError> {
        let filters = if request.filters.is_empty() {
            app_job.filter_names()
        } else {
            request.filters.clone()
        };
        let inputs = merge_inputs([&job.specification.inputs, &request.inputs]);

        let objects = if request.objects.is_empty() {
            object_repo::ids_not_in_status(db, job.id, &[ObjectStatus::Reconciled])?
                .into_iter()
                .map(|object_id| PlannedObject {
                    object_id,
                    filters: filters.clone(),
                    inputs: inputs.clone(),
                })
                .collect()
        } else {
            request
                .objects
                .iter()
                .map(|o| PlannedObject {
                    object_id: o.object_id,
                    filters: if o.filters.is_empty() {
                        filters.clone()
                    } else {
                        o.filters.clone()
                    },
                    inputs: merge_inputs([&inputs, &o.inputs]),
                })
                .collect()
        };
        Ok(Self { objects })
    }
}

/// Runs the reconcile actions of the matched filters of a job's objects.
pub struct ReconcilePipeline {
    executor: Arc<dyn ActionExecutor>,
    jobs: Arc<JobService>,
}

impl ReconcilePipeline {
    pub fn new(executor: Arc<dyn ActionExecutor>, jobs: Arc<JobService>) -> Self {
        Self { executor, jobs }
    }

    /// Reconciles a locked job according to its stored reconcile request
    /// (or everything, when there is none). The job ends unlocked with a
    /// status derived from its objects.
    pub fn run(&self, job: &mut Job) -> Result<JobStatus, DatabaseError> {
        let _pipeline_span = info_span!("reconcile",
            job_id = job.id,
            name = %job.name(),
        )
        .entered();

        self.jobs
            .set_in_progress(job, JobStatus::ReconcileInprogress)?;
        let request = job.reconcile_request.clone().unwrap_or_default();

        // Step 1: Prepare
        let prepared = {
            let _step = info_span!("prepare").entered();
            self.step_prepare(job, &request)
        };
        let (app_job, plan) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                self.jobs.reconcile_failed(job, &e.to_string())?;
                return Ok(job.status);
            }
        };

        // Step 2: Enrich
        let mut errors = {
            let _step = info_span!("enrich").entered();
            self.step_enrich(job, &app_job, &plan)
        };

        // Step 3: Reconcile objects
        if errors.is_empty() {
            let _step = info_span!("reconcile_objects").entered();
            errors = self.step_reconcile(job, &app_job, &plan);
        }

        // Step 4: Finalise
        let error = if errors.is_empty() {
            None
        } else {
            Some(PipelineError::Multiple(errors).to_string())
        };
        self.jobs.reconcile_completed(job, error)?;
        Ok(job.status)
    }

    fn step_prepare(
        &self,
        job: &Job,
        request: &ReconcileRequest,
    ) -> Result<(Arc<ApplicationJobConfig>, ReconcilePlan), PipelineError> {
        let app_job = self.jobs.application_job(job)?;
        validate_inputs(
            app_job.reconcile_inputs(),
            &merge_inputs([&job.specification.inputs, &request.inputs]),
        )?;
        let plan = ReconcilePlan::resolve(self.jobs.database(), job, &app_job, request)?;
        debug!(objects = plan.objects.len(), "Reconcile plan resolved");
        Ok((app_job, plan))
    }

    fn step_enrich(
        &self,
        job: &Job,
        app_job: &ApplicationJobConfig,
        plan: &ReconcilePlan,
    ) -> Vec<PipelineError> {
        let source_action = app_job.reconcile_source_enrich();
        let target_action = app_job.reconcile_target_enrich();
        if source_action.is_none() && target_action.is_none() {
            return Vec::new();
        }

        let mut errors = Vec::new();
        for planned in &plan.objects {
            if let Err(e) = self.enrich_object(job, planned, source_action, target_action) {
                warn!(object_id = planned.object_id, "Enrichment failed: {}", e);
                errors.push(e);
            }
        }
        errors
    }

    fn enrich_object(
        &self,
        job: &Job,
        planned: &PlannedObject,
        source_action: Option<&ActionDescriptor>,
        target_action: Option<&ActionDescriptor>,
    ) -> Result<(), PipelineError> {
        let db = self.jobs.database();
        let Some(mut object) = object_repo::find_by_id(db, job.id, planned.object_id)? else {
            return Ok(());
        };
        if object.is_reconcile_ongoing_or_completed() {
            return Ok(());
        }

        let enriched = self.enrich_properties(job, planned, &mut object, source_action, target_action);
        if let Err(e) = &enriched {
            object.status = ObjectStatus::ReconcileFailed;
            object.error_message = Some(e.message.clone());
        }
        object_repo::update(db, &mut object)?;
        enriched.map_err(PipelineError::from)
    }

    fn enrich_properties(
        &self,
        job: &Job,
        planned: &PlannedObject,
        object: &mut DiscoveredObject,
        source_action: Option<&ActionDescriptor>,
        target_action: Option<&ActionDescriptor>,
    ) -> Result<(), ExecutionError> {
        if let Some(action) = source_action.filter(|_| object.source_properties.is_some()) {
            let record = self.first_record(job, planned, object, action)?;
            if let Some(properties) = object.source_properties.as_mut() {
                properties.extend(record);
            }
        }
        if let Some(action) = target_action.filter(|_| object.target_properties.is_some()) {
            let record = self.first_record(job, planned, object, action)?;
            if let Some(properties) = object.target_properties.as_mut() {
                properties.extend(record);
            }
        }
        Ok(())
    }

    fn first_record(
        &self,
        job: &Job,
        planned: &PlannedObject,
        object: &DiscoveredObject,
        action: &ActionDescriptor,
    ) -> Result<PropertyMap, ExecutionError> {
        let context = reconcile_substitution_context(job, planned.inputs.clone(), object);
        self.executor
            .execute(job.feature_pack_id(), action, &context)?
            .mapped_records
            .into_iter()
            .next()
            .ok_or_else(|| ExecutionError::new("Enrich action returned no records"))
    }

    fn step_reconcile(
        &self,
        job: &Job,
        app_job: &ApplicationJobConfig,
        plan: &ReconcilePlan,
    ) -> Vec<PipelineError> {
        let mut errors = Vec::new();
        for planned in &plan.objects {
            if let Err(e) = self.reconcile_object(job, app_job, planned) {
                warn!(object_id = planned.object_id, "Reconcile failed: {}", e);
                errors.push(e);
            }
        }
        errors
    }

    /// Runs the object's pending filters in order. The first failure stops
    /// the remaining filters of this object.
    fn reconcile_object(
        &self,
        job: &Job,
        app_job: &ApplicationJobConfig,
        planned: &PlannedObject,
    ) -> Result<(), PipelineError> {
        let db = self.jobs.database();
        let Some(mut object) = object_repo::find_by_id(db, job.id, planned.object_id)? else {
            info!(object_id = planned.object_id, "Discovered object not found, skipping");
            return Ok(());
        };
        if object.is_reconcile_ongoing_or_completed() {
            debug!(object_id = object.id, status = %object.status, "Skipping object");
            return Ok(());
        }

        let executable: Vec<(String, Option<String>)> = planned
            .filters
            .iter()
            .filter_map(|name| {
                object
                    .filters
                    .iter()
                    .find(|f| &f.name == name && f.status != FilterStatus::Completed)
                    .map(|f| (f.name.clone(), f.reconcile_action.clone()))
            })
            .collect();
        if executable.is_empty() {
            return Ok(());
        }

        object.error_message = None;
        let context = reconcile_substitution_context(job, planned.inputs.clone(), &object);

        for (name, action_name) in &executable {
            if let Some(filter) = object.filter_mut(name) {
                filter.start();
            }
            object.status = evaluate_object_status(object.filter_statuses());
            object_repo::update(db, &mut object)?;

            match self.execute_filter(job, app_job, name, action_name.as_deref(), &context) {
                Ok(result) => {
                    if let Some(filter) = object.filter_mut(name) {
                        filter.complete(result.command, result.response);
                    }
                    object_repo::update(db, &mut object)?;
                }
                Err(e) => {
                    if let Some(filter) = object.filter_mut(name) {
                        filter.fail(e.message.clone(), e.command.clone(), e.response.clone());
                    }
                    object.status = evaluate_object_status(object.filter_statuses());
                    object_repo::update(db, &mut object)?;
                    return Err(e.into());
                }
            }
        }

        object.status = evaluate_object_status(object.filter_statuses());
        object_repo::update(db, &mut object)?;
        debug!(object_id = object.id, status = %object.status, "Object reconciled");
        Ok(())
    }

    fn execute_filter(
        &self,
        job: &Job,
        app_job: &ApplicationJobConfig,
        filter_name: &str,
        action_name: Option<&str>,
        context: &PropertyMap,
    ) -> Result<ExecutionResult, ExecutionError> {
        let action = action_name
            .and_then(|a| app_job.reconcile_action(a))
            .ok_or_else(|| {
                ExecutionError::new(format!(
                    "No reconcile action configured for filter '{}'",
                    filter_name
                ))
            })?;
        self.executor
            .execute(job.feature_pack_id(), action, context)
    }
}
