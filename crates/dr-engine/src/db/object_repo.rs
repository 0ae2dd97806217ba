//! Discovered object repository. Objects and their filters are written
//! together; filters are never deleted on their own.

use chrono::Utc;
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, Row};

use super::{enum_column, optional_json_column, Database, DatabaseError};
use crate::model::{
    format_timestamp, parse_timestamp, DiscoveredObject, Filter, FilterStatus, JobId,
    NewDiscoveredObject, ObjectQuery, ObjectStatus,
};

fn object_from_row(row: &Row<'_>) -> Result<DiscoveredObject, rusqlite::Error> {
    Ok(DiscoveredObject {
        id: row.get("id")?,
        job_id: row.get("job_id")?,
        source_properties: optional_json_column(row, "source_properties")?,
        target_properties: optional_json_column(row, "target_properties")?,
        status: enum_column(row, "status")?,
        error_message: row.get("error_message")?,
        filters: Vec::new(),
        creation_date: parse_timestamp(&row.get::<_, String>("creation_date")?),
        modified_date: parse_timestamp(&row.get::<_, String>("modified_date")?),
        version: row.get("version")?,
    })
}

fn filter_from_row(row: &Row<'_>) -> Result<Filter, rusqlite::Error> {
    Ok(Filter {
        id: row.get("id")?,
        name: row.get("name")?,
        discrepancy: row.get("discrepancy")?,
        reconcile_action: row.get("reconcile_action")?,
        status: enum_column(row, "status")?,
        command: row.get("command")?,
        command_response: row.get("command_response")?,
        error_msg: row.get("error_msg")?,
        version: row.get("version")?,
    })
}

fn load_filters(conn: &Connection, object: &mut DiscoveredObject) -> Result<(), DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM filter WHERE discovered_object_id = ?1 ORDER BY id")?;
    object.filters = stmt
        .query_map(params![object.id], filter_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(())
}

fn to_json(map: &Option<crate::model::PropertyMap>) -> Result<Option<String>, DatabaseError> {
    Ok(map.as_ref().map(serde_json::to_string).transpose()?)
}

/// Persists the objects of a discovery run with their matched filters, all
/// in one transaction. Objects start DISCOVERED, filters NOT_STARTED.
pub fn insert_all(
    db: &Database,
    job_id: JobId,
    objects: &[NewDiscoveredObject],
) -> Result<usize, DatabaseError> {
    let now = format_timestamp(&Utc::now());
    db.transaction(|tx| {
        let mut object_stmt = tx.prepare(
            "INSERT INTO discovered_object (job_id, source_properties, target_properties,
             status, creation_date, modified_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        )?;
        let mut filter_stmt = tx.prepare(
            "INSERT INTO filter (discovered_object_id, name, discrepancy, reconcile_action, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for object in objects {
            object_stmt.execute(params![
                job_id,
                to_json(&object.source_properties)?,
                to_json(&object.target_properties)?,
                ObjectStatus::Discovered.as_str(),
                now,
            ])?;
            let object_id = tx.last_insert_rowid();
            for filter in &object.filters {
                filter_stmt.execute(params![
                    object_id,
                    filter.name,
                    filter.discrepancy,
                    filter.reconcile_action,
                    FilterStatus::NotStarted.as_str(),
                ])?;
            }
        }
        log::debug!("Saved {} discovered object(s) for job {}", objects.len(), job_id);
        Ok(objects.len())
    })
}

/// Finds an object of the given job, with its filters.
pub fn find_by_id(
    db: &Database,
    job_id: JobId,
    object_id: i64,
) -> Result<Option<DiscoveredObject>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM discovered_object WHERE id = ?1 AND job_id = ?2")?;
        let mut rows = stmt.query_map(params![object_id, job_id], object_from_row)?;
        let mut object = match rows.next() {
            Some(Ok(row)) => row,
            Some(Err(e)) => return Err(DatabaseError::Sqlite(e)),
            None => return Ok(None),
        };
        load_filters(conn, &mut object)?;
        Ok(Some(object))
    })
}

/// Ids of the job's objects whose status is not in `excluded`, in id order.
pub fn ids_not_in_status(
    db: &Database,
    job_id: JobId,
    excluded: &[ObjectStatus],
) -> Result<Vec<i64>, DatabaseError> {
    db.with_conn(|conn| {
        let excluded = excluded
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = if excluded.is_empty() {
            "SELECT id FROM discovered_object WHERE job_id = ?1 ORDER BY id".to_string()
        } else {
            format!(
                "SELECT id FROM discovered_object WHERE job_id = ?1
                 AND status NOT IN ({excluded}) ORDER BY id"
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params![job_id], |r| r.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    })
}

/// Writes the object and its filters. Each row is a compare-and-swap on
/// its version; a mismatch anywhere rolls the whole write back.
pub fn update(db: &Database, object: &mut DiscoveredObject) -> Result<(), DatabaseError> {
    let now = Utc::now();
    db.transaction(|tx| {
        let changed = tx.execute(
            "UPDATE discovered_object SET source_properties = ?3, target_properties = ?4,
             status = ?5, error_message = ?6, modified_date = ?7, version = version + 1
             WHERE id = ?1 AND version = ?2",
            params![
                object.id,
                object.version,
                to_json(&object.source_properties)?,
                to_json(&object.target_properties)?,
                object.status.as_str(),
                object.error_message,
                format_timestamp(&now),
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::StaleWrite {
                entity: "discovered_object",
                id: object.id,
            });
        }
        for filter in &object.filters {
            let changed = tx.execute(
                "UPDATE filter SET status = ?3, command = ?4, command_response = ?5,
                 error_msg = ?6, version = version + 1
                 WHERE id = ?1 AND version = ?2",
                params![
                    filter.id,
                    filter.version,
                    filter.status.as_str(),
                    filter.command,
                    filter.command_response,
                    filter.error_msg,
                ],
            )?;
            if changed == 0 {
                return Err(DatabaseError::StaleWrite {
                    entity: "filter",
                    id: filter.id,
                });
            }
        }
        Ok(())
    })?;
    object.version += 1;
    object.modified_date = now;
    for filter in &mut object.filters {
        filter.version += 1;
    }
    Ok(())
}

/// Object counts grouped by status for one job.
pub fn count_by_status(
    db: &Database,
    job_id: JobId,
) -> Result<Vec<(ObjectStatus, i64)>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) AS total FROM discovered_object
             WHERE job_id = ?1 GROUP BY status",
        )?;
        let counts = stmt
            .query_map(params![job_id], |row| {
                Ok((enum_column(row, "status")?, row.get("total")?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    })
}

/// Lists the job's objects with their filters, returning (rows, total_count).
pub fn query(
    db: &Database,
    job_id: JobId,
    query: &ObjectQuery,
    default_limit: u64,
) -> Result<(Vec<DiscoveredObject>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = vec!["o.job_id = ?1".to_string()];
        let mut param_values: Vec<Box<dyn ToSql>> = vec![Box::new(job_id)];

        if let Some(status) = query.status {
            conditions.push(format!("o.status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.as_str()));
        }
        if let Some(ref filter_name) = query.filter_name {
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM filter f WHERE f.discovered_object_id = o.id AND f.name = ?{})",
                param_values.len() + 1
            ));
            param_values.push(Box::new(filter_name.clone()));
        }
        let where_clause = conditions.join(" AND ");

        let count_sql = format!("SELECT COUNT(*) FROM discovered_object o WHERE {}", where_clause);
        let params_ref: Vec<&dyn ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let limit = query.limit.unwrap_or(default_limit) as i64;
        let offset = query.offset.unwrap_or(0) as i64;
        let sql = format!(
            "SELECT o.* FROM discovered_object o WHERE {} ORDER BY {} LIMIT ?{} OFFSET ?{}",
            where_clause,
            query.sort.order_by(),
            param_values.len() + 1,
            param_values.len() + 2
        );
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));

        let params_ref: Vec<&dyn ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let mut objects = stmt
            .query_map(params_ref.as_slice(), object_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        for object in &mut objects {
            load_filters(conn, object)?;
        }

        Ok((objects, total))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{insert_job, test_db};
    use crate::model::{JobStatus, NewFilter, ObjectSort};
    use serde_json::json;

    fn new_object(name: &str, filters: &[&str]) -> NewDiscoveredObject {
        NewDiscoveredObject {
            source_properties: json!({ "name": name }).as_object().cloned(),
            target_properties: None,
            filters: filters
                .iter()
                .map(|f| NewFilter {
                    name: f.to_string(),
                    discrepancy: format!("{} discrepancy", f),
                    reconcile_action: Some(format!("{}_action", f)),
                })
                .collect(),
        }
    }

    fn seeded() -> (Database, JobId) {
        let db = test_db();
        let job = insert_job(&db, JobStatus::DiscoveryInprogress, |_| {});
        insert_all(
            &db,
            job.id,
            &[
                new_object("a", &["missing"]),
                new_object("b", &["missing", "mismatch"]),
                new_object("c", &["mismatch"]),
            ],
        )
        .unwrap();
        (db, job.id)
    }

    #[test]
    fn test_insert_and_find_with_filters() {
        let (db, job_id) = seeded();
        let ids = ids_not_in_status(&db, job_id, &[]).unwrap();
        assert_eq!(ids.len(), 3);

        let object = find_by_id(&db, job_id, ids[1]).unwrap().unwrap();
        assert_eq!(object.status, ObjectStatus::Discovered);
        assert_eq!(object.source_properties.unwrap()["name"], "b");
        let names: Vec<_> = object.filters.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["missing", "mismatch"]);
        assert!(object
            .filters
            .iter()
            .all(|f| f.status == FilterStatus::NotStarted));

        // Scoped to the owning job.
        assert!(find_by_id(&db, job_id + 1, ids[1]).unwrap().is_none());
    }

    #[test]
    fn test_update_object_and_filters() {
        let (db, job_id) = seeded();
        let id = ids_not_in_status(&db, job_id, &[]).unwrap()[0];
        let mut object = find_by_id(&db, job_id, id).unwrap().unwrap();
        object.filters[0].start();
        object.filters[0].complete("cmd".into(), "ok".into());
        object.status = ObjectStatus::Reconciled;
        update(&db, &mut object).unwrap();
        assert_eq!(object.version, 1);

        let stored = find_by_id(&db, job_id, id).unwrap().unwrap();
        assert_eq!(stored.status, ObjectStatus::Reconciled);
        assert_eq!(stored.filters[0].status, FilterStatus::Completed);
        assert_eq!(stored.filters[0].command_response.as_deref(), Some("ok"));
        assert_eq!(stored.filters[0].version, 1);

        let excluded = ids_not_in_status(&db, job_id, &[ObjectStatus::Reconciled]).unwrap();
        assert_eq!(excluded.len(), 2);
        assert!(!excluded.contains(&id));
    }

    #[test]
    fn test_stale_filter_write_rolls_back() {
        let (db, job_id) = seeded();
        let id = ids_not_in_status(&db, job_id, &[]).unwrap()[1];
        let mut object = find_by_id(&db, job_id, id).unwrap().unwrap();
        object.filters[1].version = 42;
        object.error_message = Some("changed".into());
        let err = update(&db, &mut object).unwrap_err();
        assert!(matches!(err, DatabaseError::StaleWrite { entity: "filter", .. }));

        let stored = find_by_id(&db, job_id, id).unwrap().unwrap();
        assert!(stored.error_message.is_none());
        assert_eq!(stored.version, 0);
    }

    #[test]
    fn test_count_by_status() {
        let (db, job_id) = seeded();
        let id = ids_not_in_status(&db, job_id, &[]).unwrap()[2];
        let mut object = find_by_id(&db, job_id, id).unwrap().unwrap();
        object.status = ObjectStatus::ReconcileFailed;
        update(&db, &mut object).unwrap();

        let mut counts = count_by_status(&db, job_id).unwrap();
        counts.sort();
        assert_eq!(
            counts,
            vec![(ObjectStatus::Discovered, 2), (ObjectStatus::ReconcileFailed, 1)]
        );
    }

    #[test]
    fn test_query_filters_sorts_and_pages() {
        let (db, job_id) = seeded();

        let by_filter = ObjectQuery {
            filter_name: Some("mismatch".into()),
            ..Default::default()
        };
        let (rows, total) = query(&db, job_id, &by_filter, 100).unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|o| o.filters.iter().any(|f| f.name == "mismatch")));

        let paged = ObjectQuery {
            sort: ObjectSort::IdDesc,
            limit: Some(1),
            offset: Some(1),
            ..Default::default()
        };
        let (rows, total) = query(&db, job_id, &paged, 100).unwrap();
        assert_eq!(total, 3);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_properties.as_ref().unwrap()["name"], "b");

        let by_status = ObjectQuery {
            status: Some(ObjectStatus::Reconciled),
            ..Default::default()
        };
        assert_eq!(query(&db, job_id, &by_status, 100).unwrap().1, 0);
    }

    #[test]
    fn test_objects_removed_with_job() {
        let (db, job_id) = seeded();
        db.with_conn(|c| Ok(c.execute("DELETE FROM job WHERE id = ?1", params![job_id])?))
            .unwrap();
        assert!(ids_not_in_status(&db, job_id, &[]).unwrap().is_empty());
    }
}
