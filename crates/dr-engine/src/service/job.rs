use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::alarm::{raise_job_alarm, AlarmSink};
use crate::broadcast::{JobEvent, JobEventBroadcaster};
use crate::config::{ApplicationCatalog, ApplicationJobConfig};
use crate::db::{job_repo, object_repo, schedule_repo, specification_repo, Database, DatabaseError};
use crate::error::{Result, ServiceError};
use crate::model::{
    Job, JobId, JobQuery, JobSpecification, JobSpecificationRequest, JobStatus, ObjectStatus,
    Page,
};
use crate::pipeline::validate_inputs;
use crate::status::{evaluate_job_status, DiscoveredObjectStatusCounts};

/// Job lifecycle: creation, lookup, deletion and every status transition.
///
/// Each write goes through an optimistic version check and is followed by a
/// [`JobEvent`], so listeners and synchronous waiters see every transition.
pub struct JobService {
    db: Database,
    catalog: Arc<dyn ApplicationCatalog>,
    events: JobEventBroadcaster,
    alarms: Arc<dyn AlarmSink>,
    executor_name: String,
    default_limit: u64,
}

impl JobService {
    pub fn new(
        db: Database,
        catalog: Arc<dyn ApplicationCatalog>,
        events: JobEventBroadcaster,
        alarms: Arc<dyn AlarmSink>,
        executor_name: impl Into<String>,
        default_limit: u64,
    ) -> Self {
        Self {
            db,
            catalog,
            events,
            alarms,
            executor_name: executor_name.into(),
            default_limit,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn events(&self) -> &JobEventBroadcaster {
        &self.events
    }

    pub fn executor_name(&self) -> &str {
        &self.executor_name
    }

    pub fn default_limit(&self) -> u64 {
        self.default_limit
    }

    /// Resolves the feature pack, application and application job named by
    /// `request` and returns an unsaved specification.
    ///
    /// Mandatory inputs are only checked when the request carries inputs;
    /// a job created without any fails at its validate stage instead.
    pub fn resolve_specification(
        &self,
        request: &JobSpecificationRequest,
        now: DateTime<Utc>,
    ) -> Result<JobSpecification> {
        let app = self.catalog.resolve(request)?;
        let app_job = self
            .catalog
            .find_job(&app.application_id, &request.application_job_name)
            .ok_or_else(|| ServiceError::JobNotFoundInConfig {
                application: app.application_name.clone(),
                job_name: request.application_job_name.clone(),
            })?;

        if !request.inputs.is_empty() {
            validate_inputs(&app_job.discover.inputs, &request.inputs)?;
            if request.execution_options.auto_reconcile {
                validate_inputs(app_job.reconcile_inputs(), &request.inputs)?;
            }
        }

        let name = request
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| generate_job_name(&request.application_job_name, now));

        Ok(JobSpecification {
            id: 0,
            name,
            description: request.description.clone(),
            feature_pack_id: app.feature_pack_id,
            feature_pack_name: app.feature_pack_name,
            application_id: app.application_id,
            application_name: app.application_name,
            application_job_name: request.application_job_name.clone(),
            inputs: request.inputs.clone(),
            execution_options: request.execution_options.clone(),
        })
    }

    /// Creates a NEW job, optionally tied to a message subscription.
    pub fn create_job(
        &self,
        request: &JobSpecificationRequest,
        message_subscription_id: Option<i64>,
    ) -> Result<Job> {
        let job = self.insert_job(request, message_subscription_id)?;
        self.publish(&job);
        Ok(job)
    }

    /// Persists a NEW job without announcing it.
    pub(crate) fn insert_job(
        &self,
        request: &JobSpecificationRequest,
        message_subscription_id: Option<i64>,
    ) -> Result<Job> {
        let mut spec = self.resolve_specification(request, Utc::now())?;
        let job = self.db.transaction(|tx| {
            specification_repo::insert_in(tx, &mut spec)?;
            let mut job = Job::new(spec.clone(), JobStatus::New);
            job.message_subscription_id = message_subscription_id;
            job_repo::insert_in(tx, &mut job)?;
            Ok(job)
        })?;
        info!(job_id = job.id, name = %job.name(), "Created job");
        Ok(job)
    }

    /// Creates a NEW job sharing the specification of an existing one.
    pub fn duplicate_job(&self, id: JobId) -> Result<Job> {
        let original = self.get_job(id)?;
        let job = self.db.with_conn(|conn| {
            let mut job = Job::new(original.specification.clone(), JobStatus::New);
            job_repo::insert_in(conn, &mut job)?;
            Ok(job)
        })?;
        info!(job_id = job.id, original = id, "Duplicated job");
        self.publish(&job);
        Ok(job)
    }

    /// Looks up the application job a persisted job runs.
    pub fn application_job(&self, job: &Job) -> std::result::Result<Arc<ApplicationJobConfig>, ServiceError> {
        let spec = &job.specification;
        self.catalog
            .find_job(&spec.application_id, &spec.application_job_name)
            .ok_or_else(|| ServiceError::JobNotFoundInConfig {
                application: spec.application_name.clone(),
                job_name: spec.application_job_name.clone(),
            })
    }

    pub fn get_job(&self, id: JobId) -> Result<Job> {
        job_repo::find_by_id(&self.db, id)?.ok_or_else(|| ServiceError::JobNotFound(id).into())
    }

    pub fn list_jobs(&self, query: &JobQuery) -> Result<Page<Job>> {
        let (items, total_count) = job_repo::query(&self.db, query, self.default_limit)?;
        Ok(Page { items, total_count })
    }

    /// Deletes one job, with its objects and (if unreferenced) its specification.
    pub fn delete_job(&self, id: JobId, force: bool) -> Result<()> {
        let job = self.get_job(id)?;
        if job.status == JobStatus::Scheduled {
            return Err(ServiceError::CannotDeleteScheduledJob(id).into());
        }
        if job.status.is_in_progress() {
            if !force {
                return Err(ServiceError::OperationOngoing(id).into());
            }
            if let Some(schedule_id) = job.job_schedule_id {
                let enabled = schedule_repo::find_by_id(&self.db, schedule_id)?
                    .is_some_and(|s| s.enabled);
                if enabled {
                    return Err(ServiceError::CannotDeleteActiveScheduledJob(id).into());
                }
            }
        }
        job_repo::delete(&self.db, &job)?;
        info!(job_id = id, force, "Deleted job");
        Ok(())
    }

    /// Deletes every job matching `query`. SCHEDULED jobs are never touched;
    /// in-progress jobs only with `force`. Returns the number deleted.
    pub fn delete_jobs(&self, query: &JobQuery, force: bool) -> Result<usize> {
        if query.has_no_criteria() {
            return Err(ServiceError::InvalidFilterParam("Cannot be empty".into()).into());
        }
        let matched = job_repo::find_matching(&self.db, query)?;

        if force {
            let blocked: Vec<JobId> = matched
                .iter()
                .filter(|j| j.status.is_in_progress() && j.job_schedule_id.is_some())
                .map(|j| j.id)
                .collect();
            if !blocked.is_empty() {
                return Err(ServiceError::CannotForceDeleteInProgressScheduledJobs(blocked).into());
            }
        }

        let mut deleted = 0;
        for job in matched
            .iter()
            .filter(|j| j.status != JobStatus::Scheduled)
            .filter(|j| force || !j.status.is_in_progress())
        {
            job_repo::delete(&self.db, job)?;
            deleted += 1;
        }
        info!(deleted, force, "Deleted jobs by filter");
        Ok(deleted)
    }

    /// Persists the job and publishes its status.
    pub fn save(&self, job: &mut Job) -> std::result::Result<(), DatabaseError> {
        self.update(job)?;
        self.publish(job);
        Ok(())
    }

    /// Persists the job without publishing.
    pub(crate) fn update(&self, job: &mut Job) -> std::result::Result<(), DatabaseError> {
        job_repo::update(&self.db, job)
    }

    pub fn publish(&self, job: &Job) {
        self.events.publish(JobEvent::new(job.id, job.status));
    }

    /// Enters an in-progress status on behalf of this executor.
    pub fn set_in_progress(
        &self,
        job: &mut Job,
        status: JobStatus,
    ) -> std::result::Result<(), DatabaseError> {
        job.status = status;
        job.executor = Some(self.executor_name.clone());
        if status == JobStatus::DiscoveryInprogress {
            job.start_date = Some(Utc::now());
        }
        self.save(job)
    }

    /// Finishes a discovery: COMPLETED when nothing was found, DISCOVERED
    /// otherwise.
    pub fn discovery_completed(
        &self,
        job: &mut Job,
        discovered: i64,
    ) -> std::result::Result<(), DatabaseError> {
        if discovered == 0 {
            job.status = JobStatus::Completed;
            job.completed_date = Some(Utc::now());
        } else {
            job.status = JobStatus::Discovered;
        }
        job.discovered_objects_count = discovered;
        release_lock(job);
        self.save(job)
    }

    pub fn discovery_failed(
        &self,
        job: &mut Job,
        message: &str,
    ) -> std::result::Result<(), DatabaseError> {
        warn!(job_id = job.id, "Discovery failed: {}", message);
        job.status = JobStatus::DiscoveryFailed;
        job.error_message = Some(message.to_string());
        release_lock(job);
        raise_job_alarm(self.alarms.as_ref(), job);
        self.save(job)
    }

    /// Fails a reconcile before any object was touched.
    pub fn reconcile_failed(
        &self,
        job: &mut Job,
        message: &str,
    ) -> std::result::Result<(), DatabaseError> {
        warn!(job_id = job.id, "Reconcile failed: {}", message);
        job.status = JobStatus::ReconcileFailed;
        job.error_message = Some(message.to_string());
        release_lock(job);
        raise_job_alarm(self.alarms.as_ref(), job);
        self.save(job)
    }

    /// Finishes a reconcile run. The job status is derived from the
    /// aggregate status of its objects.
    pub fn reconcile_completed(
        &self,
        job: &mut Job,
        error: Option<String>,
    ) -> std::result::Result<(), DatabaseError> {
        let counts =
            DiscoveredObjectStatusCounts::new(object_repo::count_by_status(&self.db, job.id)?);
        job.status = evaluate_job_status(&counts);
        if job.status == JobStatus::Completed {
            job.completed_date = Some(Utc::now());
        }
        job.reconciled_objects_count = counts.get(ObjectStatus::Reconciled);
        job.reconciled_objects_error_count = counts.get(ObjectStatus::ReconcileFailed);
        job.error_message = error;
        release_lock(job);
        raise_job_alarm(self.alarms.as_ref(), job);
        info!(
            job_id = job.id,
            status = %job.status,
            reconciled = job.reconciled_objects_count,
            failed = job.reconciled_objects_error_count,
            "Reconcile finished"
        );
        self.save(job)
    }

    /// Clears the lock without touching anything else.
    pub fn unlock(&self, id: JobId) -> std::result::Result<(), DatabaseError> {
        job_repo::unlock(&self.db, id)
    }
}

fn release_lock(job: &mut Job) {
    job.locked = false;
    job.lock_time = None;
}

/// `<applicationJobName>_<yyyy-MM-dd_HH:mm:ss>`
pub fn generate_job_name(application_job_name: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}_{}",
        application_job_name,
        now.format("%Y-%m-%d_%H:%M:%S")
    )
}
