use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use leadflow::activity::ActivityKind;
use leadflow::followups::{
    ExecutionFilter, ExecutionStatus, FollowupExecution, FollowupSequence, RunReport,
    SequenceInput,
};
use leadflow::types::now_ms;
use leadflow::LeadflowError;
use serde::Deserialize;
use std::sync::Arc;

use super::{created, error_response, paginate, parse_optional, AppState, NowQuery};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSequencesQuery {
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListExecutionsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub sequence_id: Option<String>,
    #[serde(default)]
    pub contact_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnrollRequest {
    pub contact_id: String,
}

fn check_step_templates(state: &AppState, input: &SequenceInput) -> leadflow::Result<()> {
    input
        .steps
        .iter()
        .try_for_each(|step| state.check_template(step.template_id.as_deref()))
}

/// Records feed events for an execution that just moved at `now`.
pub(crate) fn record_progress(state: &AppState, execution: &FollowupExecution, now: i64) {
    if let Some(sent) = execution.history.last().filter(|h| h.sent_at == now) {
        state.activity.record(
            ActivityKind::FollowupStepSent,
            &execution.id,
            format!("Follow-up step {} sent to contact {}", sent.step + 1, execution.contact_id),
        );
    }
    if execution.status == ExecutionStatus::Completed {
        state.activity.record(
            ActivityKind::FollowupCompleted,
            &execution.id,
            format!("Follow-up finished for contact {}", execution.contact_id),
        );
    }
}

pub(crate) fn record_enrollment(state: &AppState, execution: &FollowupExecution) {
    state.activity.record(
        ActivityKind::FollowupEnrolled,
        &execution.id,
        format!(
            "Contact {} enrolled in sequence {}",
            execution.contact_id, execution.sequence_id
        ),
    );
}

/// One scheduler pass: advances every due execution and records activity.
/// Used by the `/run` endpoint and the background ticker.
pub fn run_followups(state: &AppState, now: i64) -> RunReport {
    let report = state
        .followups
        .run_due(&state.contacts, &state.templates, now);
    for execution in &report.advanced {
        record_progress(state, execution, now);
    }
    report
}

#[utoipa::path(
    post,
    path = "/1/followups/sequences",
    tag = "followups",
    request_body = SequenceInput,
    responses(
        (status = 201, description = "Sequence created", body = FollowupSequence),
        (status = 400, description = "Invalid sequence"),
        (status = 404, description = "A step references an unknown template")
    )
)]
pub async fn create_sequence(
    State(state): State<Arc<AppState>>,
    Json(input): Json<SequenceInput>,
) -> Response {
    let result = check_step_templates(&state, &input)
        .and_then(|()| state.followups.create_sequence(input));
    match result {
        Ok(sequence) => created(sequence),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    get,
    path = "/1/followups/sequences",
    tag = "followups",
    params(
        ("active" = Option<bool>, Query, description = "Only active or inactive sequences"),
        ("limit" = Option<usize>, Query, description = "Page size (default 20)"),
        ("offset" = Option<usize>, Query, description = "Items to skip")
    ),
    responses((status = 200, description = "Sequences page", body = serde_json::Value))
)]
pub async fn list_sequences(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListSequencesQuery>,
) -> Response {
    let sequences = state.followups.list_sequences(query.active);
    Json(paginate(sequences, query.limit, query.offset)).into_response()
}

#[utoipa::path(
    get,
    path = "/1/followups/sequences/{id}",
    tag = "followups",
    params(("id" = String, Path, description = "Sequence id")),
    responses(
        (status = 200, description = "Sequence", body = FollowupSequence),
        (status = 404, description = "Unknown sequence")
    )
)]
pub async fn get_sequence(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.followups.get_sequence(&id) {
        Ok(sequence) => Json(sequence).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    put,
    path = "/1/followups/sequences/{id}",
    tag = "followups",
    params(("id" = String, Path, description = "Sequence id")),
    request_body = SequenceInput,
    responses((status = 200, description = "Sequence updated", body = FollowupSequence))
)]
pub async fn update_sequence(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<SequenceInput>,
) -> Response {
    let result = check_step_templates(&state, &input)
        .and_then(|()| state.followups.update_sequence(&id, input));
    match result {
        Ok(sequence) => Json(sequence).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    delete,
    path = "/1/followups/sequences/{id}",
    tag = "followups",
    params(("id" = String, Path, description = "Sequence id")),
    responses(
        (status = 200, description = "Deleted sequence", body = FollowupSequence),
        (status = 409, description = "Sequence still has active executions")
    )
)]
pub async fn delete_sequence(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.followups.delete_sequence(&id) {
        Ok(sequence) => Json(sequence).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/1/followups/sequences/{id}/enroll",
    tag = "followups",
    params(("id" = String, Path, description = "Sequence id")),
    request_body = EnrollRequest,
    responses(
        (status = 201, description = "Execution started", body = FollowupExecution),
        (status = 409, description = "Sequence inactive or contact already enrolled")
    )
)]
pub async fn enroll_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<EnrollRequest>,
) -> Response {
    let result = state
        .contacts
        .get(&req.contact_id)
        .and_then(|contact| state.followups.enroll(&id, &contact, now_ms()));
    match result {
        Ok(execution) => {
            record_enrollment(&state, &execution);
            created(execution)
        }
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    get,
    path = "/1/followups/executions",
    tag = "followups",
    params(
        ("status" = Option<String>, Query, description = "active, completed or cancelled"),
        ("sequenceId" = Option<String>, Query, description = "Sequence filter"),
        ("contactId" = Option<String>, Query, description = "Contact filter"),
        ("limit" = Option<usize>, Query, description = "Page size (default 20)"),
        ("offset" = Option<usize>, Query, description = "Items to skip")
    ),
    responses((status = 200, description = "Executions page", body = serde_json::Value))
)]
pub async fn list_executions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListExecutionsQuery>,
) -> Response {
    let status = match parse_optional(query.status.as_deref(), ExecutionStatus::parse) {
        Ok(status) => status,
        Err(err) => return error_response(err),
    };
    let filter = ExecutionFilter {
        status,
        sequence_id: query.sequence_id.clone(),
        contact_id: query.contact_id.clone(),
    };
    let executions = state.followups.list_executions(&filter);
    Json(paginate(executions, query.limit, query.offset)).into_response()
}

#[utoipa::path(
    get,
    path = "/1/followups/executions/{id}",
    tag = "followups",
    params(("id" = String, Path, description = "Execution id")),
    responses(
        (status = 200, description = "Execution", body = FollowupExecution),
        (status = 404, description = "Unknown execution")
    )
)]
pub async fn get_execution(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.followups.get_execution(&id) {
        Ok(execution) => Json(execution).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/1/followups/executions/{id}/advance",
    tag = "followups",
    params(
        ("id" = String, Path, description = "Execution id"),
        ("now" = Option<i64>, Query, description = "Evaluate as of this epoch-ms instant")
    ),
    responses(
        (status = 200, description = "Step sent", body = FollowupExecution),
        (status = 400, description = "`now` is out of range"),
        (status = 409, description = "Execution is not due or not active")
    )
)]
pub async fn advance_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<NowQuery>,
) -> Response {
    let now = match query.resolve() {
        Ok(now) => now,
        Err(err) => return error_response(err),
    };
    match state
        .followups
        .advance(&id, &state.contacts, &state.templates, now)
    {
        Ok(execution) => {
            record_progress(&state, &execution, now);
            Json(execution).into_response()
        }
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/1/followups/executions/{id}/cancel",
    tag = "followups",
    params(("id" = String, Path, description = "Execution id")),
    responses(
        (status = 200, description = "Execution cancelled", body = FollowupExecution),
        (status = 409, description = "Execution is not active")
    )
)]
pub async fn cancel_execution(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.followups.cancel(&id, now_ms()) {
        Ok(execution) => Json(execution).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/1/followups/run",
    tag = "followups",
    params(("now" = Option<i64>, Query, description = "Evaluate as of this epoch-ms instant")),
    responses(
        (status = 200, description = "Advanced executions and failures", body = RunReport),
        (status = 400, description = "`now` is out of range")
    )
)]
pub async fn run_due(State(state): State<Arc<AppState>>, Query(query): Query<NowQuery>) -> Response {
    match query.resolve() {
        Ok(now) => match tokio::task::spawn_blocking(move || run_followups(&state, now)).await {
            Ok(report) => Json(report).into_response(),
            Err(e) => error_response(LeadflowError::Io(format!("spawn_blocking join error: {}", e))),
        },
        Err(err) => error_response(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{body_json, make_state};
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
        routing::{get, post},
        Router,
    };
    use leadflow::contacts::ContactInput;
    use leadflow::followups::model::MS_PER_HOUR;
    use leadflow::Channel;
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/1/followups/sequences", get(list_sequences).post(create_sequence))
            .route("/1/followups/sequences/:id", get(get_sequence).delete(delete_sequence))
            .route("/1/followups/sequences/:id/enroll", post(enroll_contact))
            .route("/1/followups/executions", get(list_executions))
            .route("/1/followups/executions/:id/advance", post(advance_execution))
            .route("/1/followups/executions/:id/cancel", post(cancel_execution))
            .route("/1/followups/run", post(run_due))
            .with_state(state)
    }

    async fn send(app: Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        app.oneshot(request).await.unwrap()
    }

    fn contact(state: &AppState) -> String {
        state
            .contacts
            .create(ContactInput {
                name: "Lena Park".into(),
                email: Some("lena@example.com".into()),
                channel: Some(Channel::Email),
                ..Default::default()
            })
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn enroll_run_and_complete() {
        let tmp = TempDir::new().unwrap();
        let state = make_state(&tmp);
        let contact_id = contact(&state);

        let resp = send(
            app(state.clone()),
            Method::POST,
            "/1/followups/sequences",
            Some(json!({
                "name": "Nurture",
                "steps": [
                    {"delayHours": 0, "message": "Hi {{first_name}}"},
                    {"delayHours": 24, "message": "Still interested?"}
                ]
            })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let seq_id = body_json(resp).await["id"].as_str().unwrap().to_string();

        let resp = send(
            app(state.clone()),
            Method::POST,
            &format!("/1/followups/sequences/{seq_id}/enroll"),
            Some(json!({"contactId": contact_id})),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let exec = body_json(resp).await;
        let started = exec["startedAt"].as_i64().unwrap();

        let resp = send(
            app(state.clone()),
            Method::POST,
            &format!("/1/followups/sequences/{seq_id}/enroll"),
            Some(json!({"contactId": contact_id})),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = send(
            app(state.clone()),
            Method::POST,
            &format!("/1/followups/run?now={started}"),
            None,
        )
        .await;
        let report = body_json(resp).await;
        assert_eq!(report["advanced"].as_array().unwrap().len(), 1);
        assert_eq!(report["advanced"][0]["history"][0]["message"], "Hi Lena");

        let later = started + 25 * MS_PER_HOUR;
        let resp = send(
            app(state.clone()),
            Method::POST,
            &format!("/1/followups/run?now={later}"),
            None,
        )
        .await;
        let report = body_json(resp).await;
        assert_eq!(report["advanced"][0]["status"], "completed");

        let resp = send(
            app(state.clone()),
            Method::GET,
            "/1/followups/executions?status=completed",
            None,
        )
        .await;
        assert_eq!(body_json(resp).await["total"], 1);

        // enrolled, two steps sent, completed
        assert_eq!(state.activity.len(), 4);
    }

    #[tokio::test]
    async fn sequence_with_unknown_template_is_404() {
        let tmp = TempDir::new().unwrap();
        let resp = send(
            app(make_state(&tmp)),
            Method::POST,
            "/1/followups/sequences",
            Some(json!({"name": "T", "steps": [{"delayHours": 1, "templateId": "nope"}]})),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cancel_blocks_further_advances_and_frees_delete() {
        let tmp = TempDir::new().unwrap();
        let state = make_state(&tmp);
        let contact_id = contact(&state);
        let seq = state
            .followups
            .create_sequence(SequenceInput {
                name: "Short".into(),
                steps: vec![leadflow::followups::FollowupStep {
                    delay_hours: 0,
                    message: Some("ping".into()),
                    template_id: None,
                }],
                ..Default::default()
            })
            .unwrap();
        let contact = state.contacts.get(&contact_id).unwrap();
        let exec = state.followups.enroll(&seq.id, &contact, now_ms()).unwrap();

        let resp = send(
            app(state.clone()),
            Method::DELETE,
            &format!("/1/followups/sequences/{}", seq.id),
            None,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = send(
            app(state.clone()),
            Method::POST,
            &format!("/1/followups/executions/{}/cancel", exec.id),
            None,
        )
        .await;
        assert_eq!(body_json(resp).await["status"], "cancelled");

        let resp = send(
            app(state.clone()),
            Method::POST,
            &format!("/1/followups/executions/{}/advance", exec.id),
            None,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = send(
            app(state),
            Method::DELETE,
            &format!("/1/followups/sequences/{}", seq.id),
            None,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn out_of_range_now_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let state = make_state(&tmp);

        for now in ["9223372036854775807", "-1", "253402300800000"] {
            let resp = send(
                app(state.clone()),
                Method::POST,
                &format!("/1/followups/run?now={now}"),
                None,
            )
            .await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "now={now}");
        }

        let resp = send(
            app(state),
            Method::POST,
            "/1/followups/run?now=253402300799999",
            None,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
