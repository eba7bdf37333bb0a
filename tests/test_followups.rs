mod common;

use axum::http::{Method, StatusCode};
use axum::Router;
use common::{app_router, body_json, make_state, send_empty_request, send_json_request};
use serde_json::{json, Value};
use tempfile::TempDir;

const HOUR_MS: i64 = 3_600_000;

async fn create(app: &Router, uri: &str, body: Value) -> Value {
    let resp = send_json_request(app, Method::POST, uri, body).await;
    assert_eq!(resp.status(), StatusCode::CREATED, "POST {uri}");
    body_json(resp).await
}

async fn create_contact(app: &Router, name: &str) -> String {
    let contact = create(
        app,
        "/1/contacts",
        json!({"name": name, "email": "ana@example.com", "channel": "email"}),
    )
    .await;
    contact["id"].as_str().unwrap().to_string()
}

async fn run_at(app: &Router, now: i64) -> Value {
    let resp = send_empty_request(app, Method::POST, &format!("/1/followups/run?now={now}")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    body_json(resp).await
}

#[tokio::test]
async fn two_step_sequence_runs_to_completion() {
    let tmp = TempDir::new().unwrap();
    let app = app_router(&tmp, make_state(&tmp));

    let template = create(
        &app,
        "/1/templates",
        json!({"name": "Welcome", "channel": "email", "body": "Hi {{first_name}}, thanks for reaching out"}),
    )
    .await;
    let sequence = create(
        &app,
        "/1/followups/sequences",
        json!({
            "name": "New lead nurture",
            "trigger": {"type": "manual"},
            "steps": [
                {"delayHours": 1, "templateId": template["id"]},
                {"delayHours": 24, "message": "Still interested?"}
            ]
        }),
    )
    .await;
    let contact_id = create_contact(&app, "Ana Diaz").await;

    let execution = create(
        &app,
        &format!("/1/followups/sequences/{}/enroll", sequence["id"].as_str().unwrap()),
        json!({"contactId": contact_id}),
    )
    .await;
    let exec_id = execution["id"].as_str().unwrap().to_string();
    let first_due = execution["nextRunAt"].as_i64().unwrap();
    assert_eq!(first_due - execution["startedAt"].as_i64().unwrap(), HOUR_MS);

    // Enrolling the same contact twice is refused.
    let resp = send_json_request(
        &app,
        Method::POST,
        &format!("/1/followups/sequences/{}/enroll", sequence["id"].as_str().unwrap()),
        json!({"contactId": contact_id}),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // Nothing is due before the first delay elapses.
    let report = run_at(&app, first_due - 1).await;
    assert_eq!(report["advanced"].as_array().unwrap().len(), 0);

    let report = run_at(&app, first_due).await;
    let advanced = &report["advanced"][0];
    assert_eq!(advanced["currentStep"], 1);
    assert_eq!(advanced["history"][0]["message"], "Hi Ana, thanks for reaching out");
    assert_eq!(advanced["nextRunAt"], first_due + 24 * HOUR_MS);

    let report = run_at(&app, first_due + 24 * HOUR_MS).await;
    assert_eq!(report["advanced"][0]["status"], "completed");
    assert_eq!(report["advanced"][0]["history"][1]["message"], "Still interested?");

    let resp = send_empty_request(&app, Method::GET, &format!("/1/followups/executions/{exec_id}")).await;
    let done = body_json(resp).await;
    assert_eq!(done["status"], "completed");
    assert!(done["nextRunAt"].is_null());

    let resp = send_empty_request(&app, Method::GET, "/1/activity?limit=5").await;
    let events = body_json(resp).await;
    assert_eq!(events[0]["kind"], "followup_completed");
    assert_eq!(events[1]["kind"], "followup_step_sent");
}

#[tokio::test]
async fn unresolved_template_variable_is_reported_and_retried() {
    let tmp = TempDir::new().unwrap();
    let app = app_router(&tmp, make_state(&tmp));

    let template = create(
        &app,
        "/1/templates",
        json!({"name": "Coupon", "channel": "email", "body": "Your code is {{coupon_code}}"}),
    )
    .await;
    let sequence = create(
        &app,
        "/1/followups/sequences",
        json!({
            "name": "Coupon drip",
            "steps": [{"delayHours": 0, "templateId": template["id"]}]
        }),
    )
    .await;
    let contact_id = create_contact(&app, "Ana Diaz").await;
    let execution = create(
        &app,
        &format!("/1/followups/sequences/{}/enroll", sequence["id"].as_str().unwrap()),
        json!({"contactId": contact_id}),
    )
    .await;
    let due = execution["nextRunAt"].as_i64().unwrap();

    let report = run_at(&app, due).await;
    assert_eq!(report["advanced"].as_array().unwrap().len(), 0);
    assert_eq!(report["failures"][0]["executionId"], execution["id"]);
    assert!(report["failures"][0]["reason"]
        .as_str()
        .unwrap()
        .contains("coupon_code"));

    // The execution stays on its step and is picked up again on the next pass.
    let report = run_at(&app, due + 1).await;
    assert_eq!(report["failures"].as_array().unwrap().len(), 1);
    let resp = send_empty_request(
        &app,
        Method::GET,
        &format!("/1/followups/executions/{}", execution["id"].as_str().unwrap()),
    )
    .await;
    let still = body_json(resp).await;
    assert_eq!(still["status"], "active");
    assert_eq!(still["currentStep"], 0);
}

#[tokio::test]
async fn sequence_delete_waits_for_active_executions() {
    let tmp = TempDir::new().unwrap();
    let app = app_router(&tmp, make_state(&tmp));

    let sequence = create(
        &app,
        "/1/followups/sequences",
        json!({"name": "Check-in", "steps": [{"delayHours": 2, "message": "Checking in"}]}),
    )
    .await;
    let seq_id = sequence["id"].as_str().unwrap().to_string();
    let contact_id = create_contact(&app, "Ana Diaz").await;
    let execution = create(
        &app,
        &format!("/1/followups/sequences/{seq_id}/enroll"),
        json!({"contactId": contact_id}),
    )
    .await;

    let resp = send_empty_request(&app, Method::DELETE, &format!("/1/followups/sequences/{seq_id}")).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = send_empty_request(
        &app,
        Method::POST,
        &format!("/1/followups/executions/{}/cancel", execution["id"].as_str().unwrap()),
    )
    .await;
    assert_eq!(body_json(resp).await["status"], "cancelled");

    let resp = send_empty_request(&app, Method::DELETE, &format!("/1/followups/sequences/{seq_id}")).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send_empty_request(&app, Method::GET, "/1/followups/executions?status=cancelled").await;
    assert_eq!(body_json(resp).await["total"], 1);
}

#[tokio::test]
async fn template_references_are_checked_both_ways() {
    let tmp = TempDir::new().unwrap();
    let app = app_router(&tmp, make_state(&tmp));

    let resp = send_json_request(
        &app,
        Method::POST,
        "/1/followups/sequences",
        json!({"name": "Broken", "steps": [{"delayHours": 1, "templateId": "no-such-template"}]}),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let template = create(
        &app,
        "/1/templates",
        json!({"name": "Nudge", "channel": "whatsapp", "body": "Hola {{first_name}}"}),
    )
    .await;
    create(
        &app,
        "/1/followups/sequences",
        json!({"name": "Uses nudge", "steps": [{"delayHours": 1, "templateId": template["id"]}]}),
    )
    .await;

    let resp = send_empty_request(
        &app,
        Method::DELETE,
        &format!("/1/templates/{}", template["id"].as_str().unwrap()),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn inactive_sequence_refuses_enrollment() {
    let tmp = TempDir::new().unwrap();
    let app = app_router(&tmp, make_state(&tmp));
    let sequence = create(
        &app,
        "/1/followups/sequences",
        json!({"name": "Paused drip", "active": false, "steps": [{"delayHours": 1, "message": "Hi"}]}),
    )
    .await;
    let contact_id = create_contact(&app, "Ana Diaz").await;
    let resp = send_json_request(
        &app,
        Method::POST,
        &format!("/1/followups/sequences/{}/enroll", sequence["id"].as_str().unwrap()),
        json!({"contactId": contact_id}),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn deleting_a_contact_cancels_its_followups() {
    let tmp = TempDir::new().unwrap();
    let app = app_router(&tmp, make_state(&tmp));

    let sequence = create(
        &app,
        "/1/followups/sequences",
        json!({"name": "Check-in", "steps": [{"delayHours": 0, "message": "Checking in"}]}),
    )
    .await;
    let contact_id = create_contact(&app, "Ana Diaz").await;
    let execution = create(
        &app,
        &format!("/1/followups/sequences/{}/enroll", sequence["id"].as_str().unwrap()),
        json!({"contactId": contact_id}),
    )
    .await;
    let due = execution["nextRunAt"].as_i64().unwrap();

    let resp = send_empty_request(&app, Method::DELETE, &format!("/1/contacts/{contact_id}")).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send_empty_request(
        &app,
        Method::GET,
        &format!("/1/followups/executions/{}", execution["id"].as_str().unwrap()),
    )
    .await;
    assert_eq!(body_json(resp).await["status"], "cancelled");

    let report = run_at(&app, due + HOUR_MS).await;
    assert_eq!(report["advanced"].as_array().unwrap().len(), 0);
    assert_eq!(report["failures"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn run_rejects_a_clock_outside_the_calendar() {
    let tmp = TempDir::new().unwrap();
    let app = app_router(&tmp, make_state(&tmp));

    for now in [i64::MAX, -1] {
        let resp = send_empty_request(&app, Method::POST, &format!("/1/followups/run?now={now}")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "now={now}");
    }
}
