//! BDD step definitions for form actions and the anti-forgery header

use cucumber::{given, then, when};
use serde_json::json;

use panel_sync::action::{routes, ActionOutcome};

use crate::world::{json_reply, PanelSyncWorld};

#[given(expr = "the stored cookies are {string}")]
fn stored_cookies(world: &mut PanelSyncWorld, cookies: String) {
    world.config.auth.cookies = Some(cookies);
}

#[given(expr = "the anti-forgery token {string} is given on the command line")]
fn token_override(world: &mut PanelSyncWorld, token: String) {
    world.csrf_token = Some(token);
}

#[given(expr = "the server accepts {string} with message {string}")]
fn accepts(world: &mut PanelSyncWorld, path: String, message: String) {
    world
        .server
        .reply_always(&path, json_reply(200, json!({ "message": message })));
}

#[given(expr = "the server answers {string} with message {string} and status {string}")]
fn answers_with_status(world: &mut PanelSyncWorld, path: String, message: String, status: String) {
    world.server.reply_always(
        &path,
        json_reply(200, json!({ "message": message, "status": status })),
    );
}

#[given(expr = "the server rejects {string} with field errors {string}")]
fn rejects_with_errors(world: &mut PanelSyncWorld, path: String, pairs: String) {
    let mut errors = serde_json::Map::new();
    for pair in pairs.split(';') {
        let (field, message) = pair
            .split_once(':')
            .unwrap_or_else(|| panic!("expected field:message, got '{}'", pair));
        let entry = errors
            .entry(field.trim().to_string())
            .or_insert_with(|| json!([]));
        if let Some(messages) = entry.as_array_mut() {
            messages.push(json!({ "message": message.trim() }));
        }
    }
    world
        .server
        .reply_always(&path, json_reply(400, json!({ "errors": errors })));
}

#[given(expr = "the server rejects {string} with status {int} and message {string}")]
fn rejects_plain(world: &mut PanelSyncWorld, path: String, status: u16, message: String) {
    world
        .server
        .reply_always(&path, json_reply(status, json!({ "message": message })));
}

#[given(expr = "the error area shows {string}")]
fn error_area_prefilled(world: &mut PanelSyncWorld, text: String) {
    use panel_sync::view::PanelView;
    world.error_view.append(&text);
}

async fn submit(world: &mut PanelSyncWorld, locator: String, form: Vec<(String, String)>) {
    let client = world.build().action_client().expect("action client");
    world.action_outcome = Some(client.submit(&locator, form).await);
}

#[when(expr = "a task named {string} is created from {string}")]
async fn create_task(world: &mut PanelSyncWorld, name: String, page: String) {
    submit(
        world,
        routes::create_task(&page),
        vec![("name".to_string(), name)],
    )
    .await;
}

#[when(expr = "invite {string} is canceled from {string}")]
async fn cancel_invite(world: &mut PanelSyncWorld, invite: String, page: String) {
    submit(world, routes::cancel_invite(&page, &invite), Vec::new()).await;
}

#[when(expr = "invite {string} is declined from {string}")]
async fn decline_invite(world: &mut PanelSyncWorld, invite: String, page: String) {
    submit(world, routes::decline_invite(&page, &invite), Vec::new()).await;
}

#[when(expr = "member {string} is removed from {string}")]
async fn remove_member(world: &mut PanelSyncWorld, email: String, page: String) {
    submit(world, routes::remove_member(&page, &email), Vec::new()).await;
}

#[when(expr = "user {string} is invited from {string}")]
async fn invite_user(world: &mut PanelSyncWorld, email: String, page: String) {
    submit(
        world,
        routes::invite_user(&page),
        vec![("email".to_string(), email)],
    )
    .await;
}

#[then(expr = "the error area shows {int} badge(s)")]
fn badge_count(world: &mut PanelSyncWorld, count: usize) {
    assert_eq!(world.error_view.items().len(), count);
}

#[then(expr = "badge {int} reads {string}")]
fn badge_text(world: &mut PanelSyncWorld, index: usize, text: String) {
    let items = world.error_view.items();
    let badge = items
        .get(index - 1)
        .unwrap_or_else(|| panic!("no badge {}", index));
    assert_eq!(
        badge,
        &format!(r#"<p><span class="badge badge-danger">{}</span></p>"#, text)
    );
}

#[then("the action is completed and confirmed")]
fn completed_confirmed(world: &mut PanelSyncWorld) {
    assert!(matches!(
        world.action_outcome,
        Some(Ok(ActionOutcome::Completed { confirmed: true, .. }))
    ));
}

#[then("the action is completed but not confirmed")]
fn completed_unconfirmed(world: &mut PanelSyncWorld) {
    assert!(matches!(
        world.action_outcome,
        Some(Ok(ActionOutcome::Completed { confirmed: false, .. }))
    ));
}

#[then("the action is rejected")]
fn rejected(world: &mut PanelSyncWorld) {
    assert!(matches!(
        world.action_outcome,
        Some(Ok(ActionOutcome::Rejected { .. }))
    ));
}

#[then(expr = "the action fails with status {int}")]
fn failed(world: &mut PanelSyncWorld, status: u16) {
    match &world.action_outcome {
        Some(Ok(ActionOutcome::Failed { status: actual, .. })) => assert_eq!(*actual, status),
        other => panic!("expected a failed action, got {:?}", other),
    }
}

#[then(expr = "the request to {string} carried the anti-forgery token {string}")]
fn carried_token(world: &mut PanelSyncWorld, path: String, token: String) {
    let requests = world.server.requests_to(&path);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].request.method, reqwest::Method::POST);
    assert_eq!(requests[0].request.header("X-CSRFToken"), Some(token.as_str()));
}

#[then(expr = "the request to {string} carried no anti-forgery token")]
fn carried_no_token(world: &mut PanelSyncWorld, path: String) {
    let requests = world.server.requests_to(&path);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].request.header("X-CSRFToken"), None);
}
