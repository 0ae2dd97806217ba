//! Job specification repository. Specifications are shared by the jobs of
//! a schedule and removed once nothing references them.

use rusqlite::{params, Connection, Row};

use super::{json_column, Database, DatabaseError};
use crate::model::JobSpecification;

/// Specification columns, aliased for use in joins on `job_specification s`.
pub(crate) const SPEC_COLUMNS: &str = "s.id AS s_id, s.name AS s_name, s.description AS s_description,
    s.feature_pack_id AS s_feature_pack_id, s.feature_pack_name AS s_feature_pack_name,
    s.application_id AS s_application_id, s.application_name AS s_application_name,
    s.application_job_name AS s_application_job_name, s.inputs AS s_inputs,
    s.execution_options AS s_execution_options";

pub(crate) fn from_row(row: &Row<'_>) -> Result<JobSpecification, rusqlite::Error> {
    Ok(JobSpecification {
        id: row.get("s_id")?,
        name: row.get("s_name")?,
        description: row.get("s_description")?,
        feature_pack_id: row.get("s_feature_pack_id")?,
        feature_pack_name: row.get("s_feature_pack_name")?,
        application_id: row.get("s_application_id")?,
        application_name: row.get("s_application_name")?,
        application_job_name: row.get("s_application_job_name")?,
        inputs: json_column(row, "s_inputs")?,
        execution_options: json_column(row, "s_execution_options")?,
    })
}

/// Inserts a specification and assigns its id.
pub fn insert_in(conn: &Connection, spec: &mut JobSpecification) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO job_specification (name, description, feature_pack_id, feature_pack_name,
         application_id, application_name, application_job_name, inputs, execution_options)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            spec.name,
            spec.description,
            spec.feature_pack_id,
            spec.feature_pack_name,
            spec.application_id,
            spec.application_name,
            spec.application_job_name,
            serde_json::to_string(&spec.inputs)?,
            serde_json::to_string(&spec.execution_options)?,
        ],
    )?;
    spec.id = conn.last_insert_rowid();
    Ok(())
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<JobSpecification>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!("SELECT {SPEC_COLUMNS} FROM job_specification s WHERE s.id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id], from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Deletes the specification if no job or schedule references it.
pub fn delete_if_unreferenced_in(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM job_specification WHERE id = ?1
         AND NOT EXISTS (SELECT 1 FROM job WHERE job_specification_id = ?1)
         AND NOT EXISTS (SELECT 1 FROM job_schedule WHERE job_specification_id = ?1)",
        params![id],
    )?;
    if deleted > 0 {
        log::debug!("Removed unreferenced job specification {}", id);
    }
    Ok(deleted > 0)
}
