//! Acquisition locking, cron schedules and the housekeeping that runs when
//! an engine starts.

mod common;

use std::collections::HashSet;
use std::sync::{Arc, Barrier};

use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;

use common::*;
use dr_engine::db::job_repo;
use dr_engine::{CreateJobSchedule, Database, JobQuery, JobStatus};

fn schedule_request(name: &str, expression: &str) -> CreateJobSchedule {
    CreateJobSchedule {
        name: name.into(),
        description: Some("test schedule".into()),
        expression: expression.into(),
        job_specification: job_request(),
    }
}

fn app() -> dr_engine::ApplicationConfig {
    AppBuilder::new().filter("missing", None, "create").build()
}

#[test]
fn test_concurrent_acquisition_locks_disjoint_sets() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("dr.db");
    // Built but never started, so nothing else acquires.
    let engine = build_engine(
        test_config(db_path.clone()),
        app(),
        Arc::new(FakeExecutor::default()),
        Arc::new(RecordingAlarms::default()),
    );
    for _ in 0..20 {
        engine.jobs().create_job(&job_request(), None).unwrap();
    }

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let db = Database::open(&db_path).unwrap();
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                job_repo::find_and_lock_executable(&db, 15, Utc::now())
                    .unwrap()
                    .into_iter()
                    .map(|j| j.id)
                    .collect::<HashSet<_>>()
            })
        })
        .collect();
    let sets: Vec<HashSet<i64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(sets[0].is_disjoint(&sets[1]));
    assert_eq!(sets[0].len() + sets[1].len(), 20);
    let page = engine.jobs().list_jobs(&JobQuery::default()).unwrap();
    assert!(page.items.iter().all(|j| j.locked));
    engine.shutdown();
}

#[test]
fn test_schedule_lifecycle() {
    let harness = TestHarness::new(app());
    let schedules = harness.engine.schedules();
    let db = harness.database();

    let schedule = schedules
        .create_job_schedule(&schedule_request("yearly", "0 0 0 1 1 *"))
        .unwrap();
    assert!(schedule.enabled);
    let pending = job_repo::find_by_schedule(db, schedule.id, &[JobStatus::Scheduled]).unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].due_date.unwrap() > Utc::now());

    // SCHEDULED jobs are not listed and cannot be deleted directly.
    let listed = harness.engine.jobs().list_jobs(&JobQuery::default()).unwrap();
    assert_eq!(listed.total_count, 0);
    let err = harness
        .engine
        .jobs()
        .delete_job(pending[0].id, true)
        .unwrap_err();
    assert_eq!(err.as_service().unwrap().code(), "DR-41");

    let err = schedules
        .create_job_schedule(&schedule_request("yearly", "0 0 0 1 1 *"))
        .unwrap_err();
    assert_eq!(err.as_service().unwrap().code(), "DR-39");
    let err = schedules
        .create_job_schedule(&schedule_request("broken", "whenever"))
        .unwrap_err();
    assert_eq!(err.as_service().unwrap().code(), "DR-40");

    let disabled = schedules.enable_job_schedule(schedule.id, false).unwrap();
    assert!(!disabled.enabled);
    assert!(job_repo::find_by_schedule(db, schedule.id, &[JobStatus::Scheduled])
        .unwrap()
        .is_empty());

    schedules.enable_job_schedule(schedule.id, true).unwrap();
    schedules.enable_job_schedule(schedule.id, true).unwrap();
    assert_eq!(
        job_repo::find_by_schedule(db, schedule.id, &[JobStatus::Scheduled])
            .unwrap()
            .len(),
        1
    );

    let page = schedules.list_job_schedules(None, None).unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.items[0].name, "yearly");

    schedules.delete_job_schedule(schedule.id).unwrap();
    let err = schedules.get_job_schedule(schedule.id).unwrap_err();
    assert_eq!(err.as_service().unwrap().code(), "DR-38");
    assert!(job_repo::find_by_schedule(db, schedule.id, &[JobStatus::Scheduled])
        .unwrap()
        .is_empty());
}

#[test]
fn test_due_scheduled_job_runs_and_queues_next() {
    let harness = TestHarness::new(app());
    harness.executor.returns("sources", vec![json!({"id": 1})]);
    let schedules = harness.engine.schedules();
    let schedule = schedules
        .create_job_schedule(&schedule_request("every-second", "* * * * * *"))
        .unwrap();

    let ran = eventually(|| {
        let done =
            job_repo::find_by_schedule(harness.database(), schedule.id, &[JobStatus::Discovered])
                .unwrap();
        (!done.is_empty()).then_some(done)
    });
    schedules.enable_job_schedule(schedule.id, false).unwrap();

    assert_eq!(ran[0].job_schedule_id, Some(schedule.id));
    assert_eq!(ran[0].discovered_objects_count, 1);
    assert_eq!(ran[0].specification.id, schedule.specification.id);

    let listed = harness
        .engine
        .jobs()
        .list_jobs(&JobQuery {
            job_schedule_id: Some(schedule.id),
            ..Default::default()
        })
        .unwrap();
    assert!(listed.total_count >= 1);
    assert!(listed.items.iter().all(|j| j.status != JobStatus::Scheduled));
}

#[test]
fn test_start_repairs_interrupted_scheduled_jobs() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("dr.db");
    let engine = build_engine(
        test_config(db_path.clone()),
        app(),
        Arc::new(FakeExecutor::default()),
        Arc::new(RecordingAlarms::default()),
    );
    let schedule = engine
        .schedules()
        .create_job_schedule(&schedule_request("yearly", "0 0 0 1 1 *"))
        .unwrap();
    let db = engine.jobs().database().clone();
    let mut interrupted = job_repo::find_by_schedule(&db, schedule.id, &[JobStatus::Scheduled])
        .unwrap()
        .remove(0);
    interrupted.status = JobStatus::DiscoveryInprogress;
    interrupted.executor = Some("node-1".into());
    interrupted.locked = true;
    interrupted.lock_time = Some(Utc::now());
    job_repo::update(&db, &mut interrupted).unwrap();

    engine.start().unwrap();

    let repaired = engine.jobs().get_job(interrupted.id).unwrap();
    assert_eq!(repaired.status, JobStatus::DiscoveryFailed);
    assert_eq!(
        repaired.error_message.as_deref(),
        Some("Set job state to DISCOVERY_FAILED after restart")
    );
    assert!(!repaired.locked);
    let next = job_repo::find_by_schedule(&db, schedule.id, &[JobStatus::Scheduled]).unwrap();
    assert_eq!(next.len(), 1);
    assert_ne!(next[0].id, interrupted.id);

    engine.shutdown();
}

#[test]
fn test_delete_guards() {
    let temp_dir = TempDir::new().unwrap();
    let engine = build_engine(
        test_config(temp_dir.path().join("dr.db")),
        app(),
        Arc::new(FakeExecutor::default()),
        Arc::new(RecordingAlarms::default()),
    );
    let jobs = engine.jobs();
    let db = jobs.database().clone();

    let schedule = engine
        .schedules()
        .create_job_schedule(&schedule_request("yearly", "0 0 0 1 1 *"))
        .unwrap();
    let mut scheduled_run = job_repo::find_by_schedule(&db, schedule.id, &[JobStatus::Scheduled])
        .unwrap()
        .remove(0);
    scheduled_run.status = JobStatus::DiscoveryInprogress;
    job_repo::update(&db, &mut scheduled_run).unwrap();

    let mut running = jobs.create_job(&job_request(), None).unwrap();
    running.status = JobStatus::ReconcileInprogress;
    job_repo::update(&db, &mut running).unwrap();
    let finished = jobs.create_job(&job_request(), None).unwrap();

    let code = |r: dr_engine::Result<()>| r.unwrap_err().as_service().unwrap().code();
    assert_eq!(code(jobs.delete_job(running.id, false)), "DR-18");
    assert_eq!(code(jobs.delete_job(scheduled_run.id, true)), "DR-42");
    assert_eq!(code(jobs.delete_job(9999, false)), "DR-17");

    let err = jobs.delete_jobs(&JobQuery::default(), false).unwrap_err();
    assert_eq!(err.as_service().unwrap().code(), "DR-23");

    let by_app = JobQuery {
        application_name: Some(APPLICATION.into()),
        ..Default::default()
    };
    let err = jobs.delete_jobs(&by_app, true).unwrap_err();
    assert_eq!(err.as_service().unwrap().code(), "DR-57");

    assert_eq!(jobs.delete_jobs(&by_app, false).unwrap(), 1);
    assert!(jobs.get_job(finished.id).is_err());
    assert!(jobs.get_job(running.id).is_ok());

    jobs.delete_job(running.id, true).unwrap();
    assert!(jobs.get_job(running.id).is_err());
    engine.shutdown();
}
