//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies
//! pending ones in order, each inside its own transaction.

use rusqlite::Connection;

use super::error::DatabaseError;

/// A single migration definition.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_job_specification_table",
        sql: include_str!("sql/001_create_job_specification.sql"),
    },
    Migration {
        version: 2,
        description: "create_job_schedule_table",
        sql: include_str!("sql/002_create_job_schedule.sql"),
    },
    Migration {
        version: 3,
        description: "create_job_table",
        sql: include_str!("sql/003_create_job.sql"),
    },
    Migration {
        version: 4,
        description: "create_discovered_object_table",
        sql: include_str!("sql/004_create_discovered_object.sql"),
    },
    Migration {
        version: 5,
        description: "create_filter_table",
        sql: include_str!("sql/005_create_filter.sql"),
    },
];

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        let batch = format!(
            "BEGIN;\n{}\nINSERT INTO _migrations (version, description) VALUES ({}, '{}');\nCOMMIT;",
            migration.sql, migration.version, migration.description
        );
        if let Err(e) = conn.execute_batch(&batch) {
            // Leave no half-applied migration behind.
            let _ = conn.execute_batch("ROLLBACK;");
            return Err(DatabaseError::Migration {
                version: migration.version,
                reason: e.to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        conn
    }

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = fresh();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = fresh();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_objects_cascade_with_job() {
        let conn = fresh();
        run_all(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO job_specification (id, name, feature_pack_id, feature_pack_name, application_id,
                application_name, application_job_name) VALUES (1, 's', 'fp', 'fp', 'a', 'a', 'j');
             INSERT INTO job (id, job_specification_id, modified_date, status) VALUES (1, 1, 'now', 'NEW');
             INSERT INTO discovered_object (id, job_id, status, creation_date, modified_date)
                VALUES (1, 1, 'DISCOVERED', 'now', 'now');
             INSERT INTO filter (discovered_object_id, name, status) VALUES (1, 'f', 'NOT_STARTED');
             DELETE FROM job WHERE id = 1;",
        )
        .unwrap();
        let filters: u32 = conn
            .query_row("SELECT COUNT(*) FROM filter", [], |r| r.get(0))
            .unwrap();
        assert_eq!(filters, 0);
    }
}
