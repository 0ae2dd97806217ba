//! Reconciliation of discovered objects, including retries and the
//! synchronous entry points.

mod common;

use serde_json::json;

use common::*;
use dr_engine::{
    ErrorKind, ExecutionOptions, FilterStatus, Job, JobStatus, ObjectQuery, ObjectStatus,
    PropertyMap, ReconcileObject, ReconcileRequest,
};

fn props(value: serde_json::Value) -> PropertyMap {
    value.as_object().cloned().unwrap()
}

fn reconcile(harness: &TestHarness, job: &Job, request: ReconcileRequest) -> Job {
    harness
        .engine
        .reconcile()
        .execute_reconcile_synchronously(job.id, request, WAIT)
        .expect("reconcile accepted")
}

fn objects(harness: &TestHarness, job: &Job) -> Vec<dr_engine::DiscoveredObject> {
    harness
        .engine
        .discovery()
        .get_discovered_objects(job.id, &ObjectQuery::default())
        .unwrap()
        .items
}

#[test]
fn test_failed_reconcile_retried_to_completion() {
    let app = AppBuilder::new().filter("missing", None, "create").build();
    let harness = TestHarness::new(app);
    harness
        .executor
        .returns("sources", vec![json!({"id": 1}), json!({"id": 2})]);
    let job = harness.discover_default();
    assert_eq!(job.status, JobStatus::Discovered);

    harness.executor.fails("create", "create rejected");
    let failed = reconcile(&harness, &job, ReconcileRequest::default());
    assert_eq!(failed.status, JobStatus::ReconcileFailed);
    assert_eq!(failed.reconciled_objects_error_count, 2);
    assert_eq!(failed.error_message.as_deref(), Some("create rejected;create rejected"));
    for object in objects(&harness, &job) {
        assert_eq!(object.status, ObjectStatus::ReconcileFailed);
        assert_eq!(object.filters[0].status, FilterStatus::Failed);
        assert_eq!(object.filters[0].error_msg.as_deref(), Some("create rejected"));
    }

    harness.executor.succeeds("create");
    let done = reconcile(&harness, &job, ReconcileRequest::default());
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.reconciled_objects_count, 2);
    assert_eq!(done.reconciled_objects_error_count, 0);
    assert!(done.error_message.is_none());
    assert!(done.completed_date.is_some());
    for object in objects(&harness, &job) {
        assert_eq!(object.status, ObjectStatus::Reconciled);
        assert_eq!(object.filters[0].status, FilterStatus::Completed);
        assert_eq!(object.filters[0].command.as_deref(), Some("create"));
    }
    assert_eq!(harness.executor.count("create"), 4);
}

#[test]
fn test_completed_filters_are_not_rerun() {
    let app = AppBuilder::new()
        .filter("first", None, "grant")
        .filter("second", None, "revoke")
        .build();
    let harness = TestHarness::new(app);
    harness.executor.returns("sources", vec![json!({"id": 1})]);
    let job = harness.discover_default();

    harness.executor.fails("revoke", "revoke rejected");
    let partial = reconcile(&harness, &job, ReconcileRequest::default());
    assert_eq!(partial.status, JobStatus::PartiallyReconciled);
    let object = &objects(&harness, &job)[0];
    assert_eq!(object.status, ObjectStatus::PartiallyReconciled);

    harness.executor.succeeds("revoke");
    let done = reconcile(&harness, &job, ReconcileRequest::default());
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(harness.executor.count("grant"), 1);
    assert_eq!(harness.executor.count("revoke"), 2);
}

#[test]
fn test_selected_objects_and_inputs() {
    let app = AppBuilder::new()
        .reconcile_input("region")
        .filter("missing", None, "create")
        .build();
    let harness = TestHarness::new(app);
    harness
        .executor
        .returns("sources", vec![json!({"id": 1}), json!({"id": 2})]);
    let job = harness.discover_default();
    let first = objects(&harness, &job)[0].id;

    let request = ReconcileRequest {
        inputs: props(json!({"region": "eu", "tier": "gold"})),
        objects: vec![ReconcileObject {
            object_id: first,
            filters: vec![],
            inputs: props(json!({"tier": "silver"})),
        }],
        ..Default::default()
    };
    let partial = reconcile(&harness, &job, request);
    assert_eq!(partial.status, JobStatus::PartiallyReconciled);
    assert_eq!(partial.reconciled_objects_count, 1);

    let contexts = harness.executor.contexts("create");
    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0]["inputs"]["region"], "eu");
    assert_eq!(contexts[0]["inputs"]["tier"], "silver");
    assert_eq!(contexts[0]["source"]["id"], 1);

    let stored = harness.engine.jobs().get_job(job.id).unwrap();
    assert_eq!(
        stored.reconcile_request.unwrap().objects[0].object_id,
        first
    );
}

#[test]
fn test_reconcile_validation_errors() {
    let app = AppBuilder::new()
        .reconcile_input("region")
        .filter("missing", None, "create")
        .build();
    let harness = TestHarness::new(app);
    let reconcile = harness.engine.reconcile();

    let err = reconcile
        .request_reconcile(4242, ReconcileRequest::default())
        .unwrap_err();
    assert_eq!(err.as_service().unwrap().code(), "DR-17");

    // Nothing fetched: the job completes straight away.
    let completed = harness.discover_default();
    assert_eq!(completed.status, JobStatus::Completed);
    let err = reconcile
        .request_reconcile(completed.id, ReconcileRequest::default())
        .unwrap_err();
    assert_eq!(err.as_service().unwrap().code(), "DR-36");
    assert_eq!(err.kind(), ErrorKind::Conflict);

    harness.executor.returns("sources", vec![json!({"id": 1})]);
    let discovered = harness.discover_default();
    let err = reconcile
        .request_reconcile(discovered.id, ReconcileRequest::default())
        .unwrap_err();
    assert_eq!(err.as_service().unwrap().code(), "DR-16");
    let unchanged = harness.engine.jobs().get_job(discovered.id).unwrap();
    assert_eq!(unchanged.status, JobStatus::Discovered);
}

#[test]
fn test_auto_reconcile_waits_for_reconcile_outcome() {
    let app = AppBuilder::new()
        .reconcile_input("region")
        .filter("missing", None, "create")
        .build();
    let harness = TestHarness::new(app);
    harness
        .executor
        .returns("sources", vec![json!({"id": 1}), json!({"id": 2})]);

    let mut request = job_request();
    request.inputs = props(json!({"region": "eu"}));
    request.execution_options = ExecutionOptions {
        auto_reconcile: true,
    };
    let job = harness.discover(&request);
    assert_eq!(job.status, JobStatus::Completed, "{:?}", job.error_message);
    assert_eq!(job.discovered_objects_count, 2);
    assert_eq!(job.reconciled_objects_count, 2);
    assert_eq!(harness.executor.count("create"), 2);
}

#[test]
fn test_reconcile_request_is_picked_up_asynchronously() {
    let app = AppBuilder::new().filter("missing", None, "create").build();
    let harness = TestHarness::new(app);
    harness.executor.returns("sources", vec![json!({"id": 1})]);
    let job = harness.discover_default();

    let requested = harness
        .engine
        .reconcile()
        .request_reconcile(job.id, ReconcileRequest::default())
        .unwrap();
    assert_eq!(requested.status, JobStatus::ReconcileRequested);

    let done = eventually(|| {
        let job = harness.engine.jobs().get_job(job.id).unwrap();
        (job.status == JobStatus::Completed).then_some(job)
    });
    assert!(!done.locked);
    assert_eq!(done.executor.as_deref(), Some("node-1"));
}
