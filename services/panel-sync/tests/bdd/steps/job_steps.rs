//! BDD step definitions for repository import jobs

use cucumber::{given, then, when};
use serde_json::json;

use panel_sync::job::JobOutcome;
use panel_sync::SyncError;

use crate::world::{json_reply, PanelSyncWorld, Reply};

fn create_path(world: &PanelSyncWorld) -> String {
    world.config.jobs.create_locator.clone()
}

fn status_path(world: &PanelSyncWorld) -> String {
    world.config.jobs.status_locator.clone()
}

// --- Given steps ---

#[given(expr = "job status is checked every {int} ms")]
fn job_interval(world: &mut PanelSyncWorld, millis: u64) {
    world.config.jobs.poll_interval_ms = millis;
}

#[given("failed jobs stop the import")]
fn stop_on_failure(world: &mut PanelSyncWorld) {
    world.config.jobs.stop_on_failure = true;
}

#[given(expr = "the server queues imports as task {string} with message {string}")]
fn accepts_import(world: &mut PanelSyncWorld, task_id: String, message: String) {
    let path = create_path(world);
    world.server.reply_once(
        &path,
        json_reply(200, json!({ "task_id": task_id, "message": message })),
    );
}

#[given(expr = "the server rejects imports with status {int} and message {string}")]
fn rejects_import(world: &mut PanelSyncWorld, status: u16, message: String) {
    let path = create_path(world);
    world
        .server
        .reply_always(&path, json_reply(status, json!({ "message": message })));
}

#[given(expr = "the job reports {string} {int} time(s)")]
fn job_reports(world: &mut PanelSyncWorld, status: String, times: usize) {
    let path = status_path(world);
    for _ in 0..times {
        world
            .server
            .reply_once(&path, json_reply(200, json!({ "status": status })));
    }
}

#[given(expr = "the job status check fails once")]
fn job_check_fails(world: &mut PanelSyncWorld) {
    let path = status_path(world);
    world.server.reply_once(&path, Reply::Refuse);
}

#[given(expr = "the job then reports {string} with message {string}")]
fn job_then_reports(world: &mut PanelSyncWorld, status: String, message: String) {
    let path = status_path(world);
    world.server.reply_once(
        &path,
        json_reply(200, json!({ "status": status, "message": message })),
    );
}

#[given("the job then reports ready without a message")]
fn job_then_ready(world: &mut PanelSyncWorld) {
    let path = status_path(world);
    world
        .server
        .reply_once(&path, json_reply(200, json!({ "status": "ready" })));
}

// --- When steps ---

#[when(expr = "repository {string} is imported")]
async fn repository_imported(world: &mut PanelSyncWorld, repository: String) {
    let sync = world.build();
    world.job_outcome = Some(sync.import_repository(&repository).await);
}

// --- Then steps ---

#[then(expr = "the import finishes with message {string}")]
fn import_finishes(world: &mut PanelSyncWorld, message: String) {
    match world.job_outcome.as_ref().expect("no import attempted") {
        Ok(JobOutcome::Ready { message: actual }) => assert_eq!(actual, &message),
        other => panic!("expected a finished import, got {:?}", other),
    }
}

#[then(expr = "the import fails with message {string}")]
fn import_fails(world: &mut PanelSyncWorld, message: String) {
    match world.job_outcome.as_ref().expect("no import attempted") {
        Ok(JobOutcome::Failed { message: actual }) => assert_eq!(actual, &message),
        Err(SyncError::Job(actual)) => assert_eq!(actual, &message),
        other => panic!("expected a failed import, got {:?}", other),
    }
}

#[then(expr = "the job status was checked {int} time(s)")]
fn status_checked(world: &mut PanelSyncWorld, count: usize) {
    let path = status_path(world);
    assert_eq!(world.server.requests_to(&path).len(), count);
}

#[then(expr = "every status check asked about task {string}")]
fn status_task_id(world: &mut PanelSyncWorld, task_id: String) {
    let path = status_path(world);
    for recorded in world.server.requests_to(&path) {
        assert_eq!(recorded.request.query_param("task_id"), Some(task_id.clone()));
    }
}

#[then(expr = "the import request named repository {string}")]
fn import_form(world: &mut PanelSyncWorld, repository: String) {
    let path = create_path(world);
    let requests = world.server.requests_to(&path);
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].request.form,
        vec![("repository".to_string(), repository)]
    );
}

#[then(expr = "the user was told {string}")]
async fn user_told(world: &mut PanelSyncWorld, messages: String) {
    let expected: Vec<String> = messages.split(" | ").map(str::to_string).collect();
    assert_eq!(world.notifier.messages().await, expected);
}
