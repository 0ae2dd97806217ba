//! Job repository: CRUD, listing and lock acquisition for the `job` table.
//!
//! Every update is a compare-and-swap on `version`.

use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, Row};

use super::specification_repo::{self, SPEC_COLUMNS};
use super::{enum_column, optional_json_column, Database, DatabaseError};
use crate::model::{format_timestamp, parse_timestamp, Job, JobId, JobQuery, JobStatus};

fn select_sql(rest: &str) -> String {
    format!(
        "SELECT j.*, {SPEC_COLUMNS} FROM job j
         JOIN job_specification s ON s.id = j.job_specification_id {rest}"
    )
}

fn timestamp_column(row: &Row<'_>, name: &str) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
    Ok(row
        .get::<_, Option<String>>(name)?
        .map(|s| parse_timestamp(&s)))
}

fn from_row(row: &Row<'_>) -> Result<Job, rusqlite::Error> {
    Ok(Job {
        id: row.get("id")?,
        specification: specification_repo::from_row(row)?,
        status: enum_column(row, "status")?,
        job_schedule_id: row.get("job_schedule_id")?,
        message_subscription_id: row.get("message_subscription_id")?,
        discovered_objects_count: row.get("discovered_objects_count")?,
        reconciled_objects_count: row.get("reconciled_objects_count")?,
        reconciled_objects_error_count: row.get("reconciled_objects_error_count")?,
        error_message: row.get("error_message")?,
        start_date: timestamp_column(row, "start_date")?,
        modified_date: parse_timestamp(&row.get::<_, String>("modified_date")?),
        completed_date: timestamp_column(row, "completed_date")?,
        due_date: timestamp_column(row, "due_date")?,
        locked: row.get("locked")?,
        lock_time: timestamp_column(row, "lock_time")?,
        executor: row.get("executor")?,
        reconcile_request: optional_json_column(row, "reconcile_request")?,
        version: row.get("version")?,
    })
}

fn opt_ts(ts: &Option<DateTime<Utc>>) -> Option<String> {
    ts.as_ref().map(format_timestamp)
}

/// Inserts a job whose specification is already persisted. Assigns id and version.
pub fn insert_in(conn: &Connection, job: &mut Job) -> Result<(), DatabaseError> {
    job.modified_date = Utc::now();
    job.version = 0;
    let reconcile_request = job
        .reconcile_request
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT INTO job (job_specification_id, job_schedule_id, message_subscription_id,
         discovered_objects_count, reconciled_objects_count, reconciled_objects_error_count,
         error_message, start_date, modified_date, completed_date, due_date, status, locked,
         lock_time, executor, reconcile_request, version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, 0)",
        params![
            job.specification.id,
            job.job_schedule_id,
            job.message_subscription_id,
            job.discovered_objects_count,
            job.reconciled_objects_count,
            job.reconciled_objects_error_count,
            job.error_message,
            opt_ts(&job.start_date),
            format_timestamp(&job.modified_date),
            opt_ts(&job.completed_date),
            opt_ts(&job.due_date),
            job.status.as_str(),
            job.locked,
            opt_ts(&job.lock_time),
            job.executor,
            reconcile_request,
        ],
    )?;
    job.id = conn.last_insert_rowid();
    log::debug!("Inserted job {} ({})", job.id, job.status);
    Ok(())
}

pub fn update(db: &Database, job: &mut Job) -> Result<(), DatabaseError> {
    db.with_conn(|conn| update_in(conn, job))
}

/// Writes all mutable columns if the stored version still matches.
pub fn update_in(conn: &Connection, job: &mut Job) -> Result<(), DatabaseError> {
    let now = Utc::now();
    let reconcile_request = job
        .reconcile_request
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let changed = conn.execute(
        "UPDATE job SET job_schedule_id=?3, message_subscription_id=?4,
         discovered_objects_count=?5, reconciled_objects_count=?6,
         reconciled_objects_error_count=?7, error_message=?8, start_date=?9, modified_date=?10,
         completed_date=?11, due_date=?12, status=?13, locked=?14, lock_time=?15, executor=?16,
         reconcile_request=?17, version = version + 1
         WHERE id=?1 AND version=?2",
        params![
            job.id,
            job.version,
            job.job_schedule_id,
            job.message_subscription_id,
            job.discovered_objects_count,
            job.reconciled_objects_count,
            job.reconciled_objects_error_count,
            job.error_message,
            opt_ts(&job.start_date),
            format_timestamp(&now),
            opt_ts(&job.completed_date),
            opt_ts(&job.due_date),
            job.status.as_str(),
            job.locked,
            opt_ts(&job.lock_time),
            job.executor,
            reconcile_request,
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::StaleWrite {
            entity: "job",
            id: job.id,
        });
    }
    job.version += 1;
    job.modified_date = now;
    Ok(())
}

pub fn find_by_id(db: &Database, id: JobId) -> Result<Option<Job>, DatabaseError> {
    db.with_conn(|conn| find_in(conn, id))
}

pub fn find_in(conn: &Connection, id: JobId) -> Result<Option<Job>, DatabaseError> {
    let mut stmt = conn.prepare(&select_sql("WHERE j.id = ?1"))?;
    let mut rows = stmt.query_map(params![id], from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

fn find_where(
    conn: &Connection,
    rest: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<Job>, DatabaseError> {
    let mut stmt = conn.prepare(&select_sql(rest))?;
    let rows = stmt
        .query_map(params, from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn build_conditions(query: &JobQuery) -> (Vec<String>, Vec<Box<dyn ToSql>>) {
    let mut conditions = Vec::new();
    let mut param_values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(status) = query.status {
        conditions.push(format!("j.status = ?{}", param_values.len() + 1));
        param_values.push(Box::new(status.as_str()));
    }
    if let Some(ref name) = query.name {
        conditions.push(format!("s.name = ?{}", param_values.len() + 1));
        param_values.push(Box::new(name.clone()));
    }
    if let Some(ref feature_pack) = query.feature_pack_name {
        conditions.push(format!("s.feature_pack_name = ?{}", param_values.len() + 1));
        param_values.push(Box::new(feature_pack.clone()));
    }
    if let Some(ref application) = query.application_name {
        conditions.push(format!("s.application_name = ?{}", param_values.len() + 1));
        param_values.push(Box::new(application.clone()));
    }
    if let Some(schedule_id) = query.job_schedule_id {
        conditions.push(format!("j.job_schedule_id = ?{}", param_values.len() + 1));
        param_values.push(Box::new(schedule_id));
    }
    (conditions, param_values)
}

/// Lists jobs, returning (rows, total_count). SCHEDULED jobs are only
/// listed when asked for by status.
pub fn query(
    db: &Database,
    query: &JobQuery,
    default_limit: u64,
) -> Result<(Vec<Job>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let (mut conditions, mut param_values) = build_conditions(query);
        if query.status.is_none() {
            conditions.push(format!("j.status != '{}'", JobStatus::Scheduled.as_str()));
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!(
            "SELECT COUNT(*) FROM job j JOIN job_specification s ON s.id = j.job_specification_id {}",
            where_clause
        );
        let params_ref: Vec<&dyn ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let limit = query.limit.unwrap_or(default_limit) as i64;
        let offset = query.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let rest = format!(
            "{} ORDER BY j.id DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );
        let params_ref: Vec<&dyn ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
        let rows = find_where(conn, &rest, params_ref.as_slice())?;

        Ok((rows, total))
    })
}

/// All jobs matching the query criteria, any status, no paging.
pub fn find_matching(db: &Database, query: &JobQuery) -> Result<Vec<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let (conditions, param_values) = build_conditions(query);
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let params_ref: Vec<&dyn ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
        find_where(conn, &format!("{} ORDER BY j.id", where_clause), params_ref.as_slice())
    })
}

/// Selects up to `limit` runnable, unlocked jobs (oldest modified first) and
/// locks them. Runs in one IMMEDIATE transaction and re-checks `locked = 0`
/// per row, so concurrent callers on the same database get disjoint sets.
pub fn find_and_lock_executable(
    db: &Database,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<Vec<Job>, DatabaseError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    db.transaction(|tx| {
        let now_s = format_timestamp(&now);
        let candidates: Vec<JobId> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM job WHERE locked = 0
                 AND (status IN ('NEW', 'RECONCILE_REQUESTED')
                      OR (status = 'SCHEDULED' AND due_date IS NOT NULL AND due_date <= ?1))
                 ORDER BY modified_date ASC, id ASC LIMIT ?2",
            )?;
            let ids = stmt
                .query_map(params![now_s, limit as i64], |r| r.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };

        let mut jobs = Vec::with_capacity(candidates.len());
        for id in candidates {
            let changed = tx.execute(
                "UPDATE job SET locked = 1, lock_time = ?2, version = version + 1
                 WHERE id = ?1 AND locked = 0",
                params![id, now_s],
            )?;
            if changed == 1 {
                if let Some(job) = find_in(tx, id)? {
                    jobs.push(job);
                }
            }
        }
        if !jobs.is_empty() {
            log::debug!("Locked {} executable job(s)", jobs.len());
        }
        Ok(jobs)
    })
}

/// Clears the lock regardless of version.
pub fn unlock(db: &Database, id: JobId) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE job SET locked = 0, lock_time = NULL, version = version + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    })
}

/// Deletes a job (objects and filters cascade) and its specification if
/// nothing else references it.
pub fn delete(db: &Database, job: &Job) -> Result<(), DatabaseError> {
    db.transaction(|tx| {
        tx.execute("DELETE FROM job WHERE id = ?1", params![job.id])?;
        specification_repo::delete_if_unreferenced_in(tx, job.specification.id)?;
        Ok(())
    })
}

/// Removes the pending SCHEDULED job(s) of a schedule.
pub fn delete_scheduled_in(conn: &Connection, schedule_id: i64) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM job WHERE job_schedule_id = ?1 AND status = 'SCHEDULED'",
        params![schedule_id],
    )?;
    Ok(deleted)
}

pub fn find_by_schedule(
    db: &Database,
    schedule_id: i64,
    statuses: &[JobStatus],
) -> Result<Vec<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let placeholders = status_list(statuses);
        find_where(
            conn,
            &format!("WHERE j.job_schedule_id = ?1 AND j.status IN ({placeholders}) ORDER BY j.id"),
            &[&schedule_id as &dyn ToSql],
        )
    })
}

/// Schedule-driven jobs left in progress by the given executor.
pub fn find_in_progress_scheduled(
    db: &Database,
    executor: &str,
) -> Result<Vec<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let placeholders = status_list(&[
            JobStatus::DiscoveryInprogress,
            JobStatus::ReconcileInprogress,
        ]);
        find_where(
            conn,
            &format!(
                "WHERE j.job_schedule_id IS NOT NULL AND j.executor = ?1
                 AND j.status IN ({placeholders}) ORDER BY j.id"
            ),
            &[&executor as &dyn ToSql],
        )
    })
}

/// Jobs started before `cutoff` that are not currently executing.
pub fn find_started_before(
    db: &Database,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let placeholders = status_list(&[
            JobStatus::DiscoveryInprogress,
            JobStatus::ReconcileInprogress,
        ]);
        find_where(
            conn,
            &format!(
                "WHERE j.start_date IS NOT NULL AND j.start_date < ?1
                 AND j.status NOT IN ({placeholders}) ORDER BY j.id"
            ),
            &[&format_timestamp(&cutoff) as &dyn ToSql],
        )
    })
}

// Statuses are a closed enum, so inlining them is safe.
fn status_list(statuses: &[JobStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}
