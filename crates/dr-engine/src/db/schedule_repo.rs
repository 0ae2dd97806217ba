//! Job schedule repository.

use rusqlite::{params, Connection, Row};

use super::specification_repo::{self, SPEC_COLUMNS};
use super::{Database, DatabaseError};
use crate::model::{format_timestamp, parse_timestamp, JobSchedule};

fn select_sql(rest: &str) -> String {
    format!(
        "SELECT c.id, c.name, c.description, c.expression, c.enabled, c.creation_date,
         c.version, {SPEC_COLUMNS}
         FROM job_schedule c JOIN job_specification s ON s.id = c.job_specification_id {rest}"
    )
}

fn from_row(row: &Row<'_>) -> Result<JobSchedule, rusqlite::Error> {
    Ok(JobSchedule {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        expression: row.get("expression")?,
        enabled: row.get("enabled")?,
        specification: specification_repo::from_row(row)?,
        creation_date: parse_timestamp(&row.get::<_, String>("creation_date")?),
        version: row.get("version")?,
    })
}

fn find_one(
    conn: &Connection,
    rest: &str,
    param: &dyn rusqlite::ToSql,
) -> Result<Option<JobSchedule>, DatabaseError> {
    let mut stmt = conn.prepare(&select_sql(rest))?;
    let mut rows = stmt.query_map(&[param], from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Inserts a schedule whose specification is already persisted.
pub fn insert_in(conn: &Connection, schedule: &mut JobSchedule) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO job_schedule (name, description, expression, enabled,
         job_specification_id, creation_date, version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
        params![
            schedule.name,
            schedule.description,
            schedule.expression,
            schedule.enabled,
            schedule.specification.id,
            format_timestamp(&schedule.creation_date),
        ],
    )?;
    schedule.id = conn.last_insert_rowid();
    schedule.version = 0;
    log::debug!("Inserted job schedule {} '{}'", schedule.id, schedule.name);
    Ok(())
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<JobSchedule>, DatabaseError> {
    db.with_conn(|conn| find_in(conn, id))
}

pub fn find_in(conn: &Connection, id: i64) -> Result<Option<JobSchedule>, DatabaseError> {
    find_one(conn, "WHERE c.id = ?1", &id)
}

pub fn find_by_name(db: &Database, name: &str) -> Result<Option<JobSchedule>, DatabaseError> {
    db.with_conn(|conn| find_one(conn, "WHERE c.name = ?1", &name))
}

/// Lists schedules by id, returning (rows, total_count).
pub fn list(
    db: &Database,
    offset: u64,
    limit: u64,
) -> Result<(Vec<JobSchedule>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let total: u64 = conn.query_row("SELECT COUNT(*) FROM job_schedule", [], |r| r.get(0))?;
        let mut stmt = conn.prepare(&select_sql("ORDER BY c.id LIMIT ?1 OFFSET ?2"))?;
        let rows = stmt
            .query_map(params![limit as i64, offset as i64], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok((rows, total))
    })
}

pub fn update_in(conn: &Connection, schedule: &mut JobSchedule) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE job_schedule SET description = ?3, expression = ?4, enabled = ?5,
         version = version + 1 WHERE id = ?1 AND version = ?2",
        params![
            schedule.id,
            schedule.version,
            schedule.description,
            schedule.expression,
            schedule.enabled,
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::StaleWrite {
            entity: "job_schedule",
            id: schedule.id,
        });
    }
    schedule.version += 1;
    Ok(())
}

pub fn delete_in(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM job_schedule WHERE id = ?1", params![id])?;
    Ok(())
}
