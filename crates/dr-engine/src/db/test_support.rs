//! Fixtures shared by the repository tests.

use serde_json::json;

use super::{job_repo, specification_repo, Database};
use crate::model::{ExecutionOptions, Job, JobSpecification, JobStatus};

pub(crate) fn test_db() -> Database {
    Database::open_in_memory().unwrap()
}

pub(crate) fn sample_spec() -> JobSpecification {
    JobSpecification {
        id: 0,
        name: "spec".into(),
        description: Some("desc".into()),
        feature_pack_id: "fp".into(),
        feature_pack_name: "fp".into(),
        application_id: "fp/app".into(),
        application_name: "app".into(),
        application_job_name: "sync".into(),
        inputs: json!({"region": "eu", "limit": 5})
            .as_object()
            .cloned()
            .unwrap(),
        execution_options: ExecutionOptions {
            auto_reconcile: true,
        },
    }
}

/// Inserts a fresh specification and a job in `status`, after `customize`.
pub(crate) fn insert_job(db: &Database, status: JobStatus, customize: impl FnOnce(&mut Job)) -> Job {
    let mut spec = sample_spec();
    db.with_conn(|conn| specification_repo::insert_in(conn, &mut spec))
        .unwrap();
    let mut job = Job::new(spec, status);
    customize(&mut job);
    db.with_conn(|conn| job_repo::insert_in(conn, &mut job))
        .unwrap();
    job
}
