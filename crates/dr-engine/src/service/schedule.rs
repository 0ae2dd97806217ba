use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cron::Schedule;
use rusqlite::Connection;
use tracing::info;

use super::JobService;
use crate::db::{job_repo, schedule_repo, specification_repo, DatabaseError};
use crate::error::{Result, ServiceError};
use crate::model::{CreateJobSchedule, Job, JobSchedule, JobStatus, Page};

/// Next occurrence of a cron expression strictly after `after`, in UTC.
pub fn next_due_date(expression: &str, after: DateTime<Utc>) -> std::result::Result<DateTime<Utc>, ServiceError> {
    let invalid = |reason: String| ServiceError::InvalidCronExpression {
        expression: expression.to_string(),
        reason,
    };
    let schedule = Schedule::from_str(expression).map_err(|e| invalid(e.to_string()))?;
    schedule
        .after(&after)
        .next()
        .ok_or_else(|| invalid("no upcoming occurrence".into()))
}

/// Cron schedules. Each enabled schedule has exactly one pending SCHEDULED
/// job; running it creates the next one.
pub struct ScheduleService {
    jobs: Arc<JobService>,
}

impl ScheduleService {
    pub fn new(jobs: Arc<JobService>) -> Self {
        Self { jobs }
    }

    pub fn create_job_schedule(&self, request: &CreateJobSchedule) -> Result<JobSchedule> {
        let db = self.jobs.database();
        if schedule_repo::find_by_name(db, &request.name)?.is_some() {
            return Err(ServiceError::JobScheduleExists(request.name.clone()).into());
        }
        let now = Utc::now();
        let due_date = next_due_date(&request.expression, now)?;
        let spec = self.jobs.resolve_specification(&request.job_specification, now)?;

        let schedule = db.transaction(|tx| {
            let mut spec = spec;
            specification_repo::insert_in(tx, &mut spec)?;
            let mut schedule = JobSchedule {
                id: 0,
                name: request.name.clone(),
                description: request.description.clone(),
                expression: request.expression.clone(),
                enabled: true,
                specification: spec,
                creation_date: now,
                version: 0,
            };
            schedule_repo::insert_in(tx, &mut schedule)?;
            insert_scheduled_job(tx, &schedule, due_date)?;
            Ok(schedule)
        })?;
        info!(
            schedule_id = schedule.id,
            name = %schedule.name,
            due = %due_date,
            "Created job schedule"
        );
        Ok(schedule)
    }

    pub fn get_job_schedule(&self, id: i64) -> Result<JobSchedule> {
        schedule_repo::find_by_id(self.jobs.database(), id)?
            .ok_or_else(|| ServiceError::JobScheduleNotFound(id).into())
    }

    pub fn list_job_schedules(
        &self,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Page<JobSchedule>> {
        let (items, total_count) = schedule_repo::list(
            self.jobs.database(),
            offset.unwrap_or(0),
            limit.unwrap_or_else(|| self.jobs.default_limit()),
        )?;
        Ok(Page { items, total_count })
    }

    /// Enables or disables a schedule. Enabling creates the SCHEDULED job if
    /// it is missing; disabling removes it. Setting the current value is a
    /// no-op.
    pub fn enable_job_schedule(&self, id: i64, enabled: bool) -> Result<JobSchedule> {
        let db = self.jobs.database();
        let mut schedule = self.get_job_schedule(id)?;
        if schedule.enabled == enabled {
            return Ok(schedule);
        }

        if enabled {
            let running = job_repo::find_by_schedule(
                db,
                id,
                &[JobStatus::DiscoveryInprogress, JobStatus::ReconcileInprogress],
            )?;
            if !running.is_empty() {
                return Err(ServiceError::CannotEnableJobSchedule(id).into());
            }
            let due_date = next_due_date(&schedule.expression, Utc::now())?;
            db.transaction(|tx| {
                schedule.enabled = true;
                schedule_repo::update_in(tx, &mut schedule)?;
                if !has_scheduled_job(tx, id)? {
                    insert_scheduled_job(tx, &schedule, due_date)?;
                }
                Ok(())
            })?;
        } else {
            db.transaction(|tx| {
                schedule.enabled = false;
                schedule_repo::update_in(tx, &mut schedule)?;
                job_repo::delete_scheduled_in(tx, id)?;
                Ok(())
            })?;
        }
        info!(schedule_id = id, enabled, "Job schedule updated");
        Ok(schedule)
    }

    /// Deletes the schedule with its pending SCHEDULED job. The shared
    /// specification goes too, unless earlier runs still reference it.
    pub fn delete_job_schedule(&self, id: i64) -> Result<()> {
        let schedule = self.get_job_schedule(id)?;
        self.jobs.database().transaction(|tx| {
            job_repo::delete_scheduled_in(tx, id)?;
            schedule_repo::delete_in(tx, id)?;
            specification_repo::delete_if_unreferenced_in(tx, schedule.specification.id)?;
            Ok(())
        })?;
        info!(schedule_id = id, name = %schedule.name, "Deleted job schedule");
        Ok(())
    }

    /// Queues the next run after `job` ran, if its schedule still exists and
    /// is enabled.
    pub fn create_next_scheduled_job(&self, job: &Job) -> Result<Option<Job>> {
        let Some(schedule_id) = job.job_schedule_id else {
            return Ok(None);
        };
        let db = self.jobs.database();
        let Some(schedule) = schedule_repo::find_by_id(db, schedule_id)? else {
            return Ok(None);
        };
        if !schedule.enabled {
            return Ok(None);
        }
        let due_date = next_due_date(&schedule.expression, Utc::now())?;
        let next = db.transaction(|tx| {
            if has_scheduled_job(tx, schedule_id)? {
                return Ok(None);
            }
            insert_scheduled_job(tx, &schedule, due_date).map(Some)
        })?;
        if let Some(next) = &next {
            info!(job_id = next.id, schedule_id, due = %due_date, "Scheduled next run");
        }
        Ok(next)
    }
}

fn has_scheduled_job(conn: &Connection, schedule_id: i64) -> std::result::Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM job WHERE job_schedule_id = ?1 AND status = 'SCHEDULED'",
        [schedule_id],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

fn insert_scheduled_job(
    conn: &Connection,
    schedule: &JobSchedule,
    due_date: DateTime<Utc>,
) -> std::result::Result<Job, DatabaseError> {
    let mut job = Job::new(schedule.specification.clone(), JobStatus::Scheduled);
    job.job_schedule_id = Some(schedule.id);
    job.due_date = Some(due_date);
    job_repo::insert_in(conn, &mut job)?;
    Ok(job)
}
