use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use leadflow::abtests::{
    assignment::assign_variant, lifecycle, AbTest, AbTestFilter, AbTestStatus, MetricsIncrement,
    NewAbTest, TestRepository, TestResults, WizardStep,
};
use leadflow::activity::ActivityKind;
use leadflow::{Channel, LeadflowError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{created, error_response, paginate, parse_optional, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAbTestsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

impl ListAbTestsQuery {
    fn filter(&self) -> leadflow::Result<AbTestFilter> {
        Ok(AbTestFilter {
            status: parse_optional(self.status.as_deref(), AbTestStatus::parse)?,
            channel: parse_optional(self.channel.as_deref(), Channel::parse)?,
            campaign_id: self.campaign_id.clone().filter(|c| !c.trim().is_empty()),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ValidateQuery {
    #[serde(default)]
    pub step: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub valid: bool,
    /// The step that was checked; absent when the whole form was.
    pub step: Option<WizardStep>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceRequest {
    pub confidence_level: u8,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromoteResponse {
    pub test: AbTest,
    pub winner: String,
    pub already_promoted: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentQuery {
    pub contact_id: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentResponse {
    pub test_id: String,
    pub contact_id: String,
    pub variant_id: String,
    pub variant_name: String,
    pub message: String,
}

fn status_changed(state: &AppState, result: leadflow::Result<AbTest>) -> Response {
    match result {
        Ok(test) => {
            state.activity.record(
                ActivityKind::AbTestStatusChanged,
                &test.id,
                format!("A/B test {} is now {}", test.name, test.status.as_str()),
            );
            Json(test).into_response()
        }
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/1/abtests",
    tag = "abtests",
    request_body = NewAbTest,
    responses(
        (status = 201, description = "Test created and running", body = AbTest),
        (status = 400, description = "A wizard step failed validation")
    )
)]
pub async fn create_abtest(
    State(state): State<Arc<AppState>>,
    Json(form): Json<NewAbTest>,
) -> Response {
    match lifecycle::create(state.abtests.as_ref(), form) {
        Ok(test) => {
            state.activity.record(
                ActivityKind::AbTestCreated,
                &test.id,
                format!("A/B test {} started with {} variants", test.name, test.variants.len()),
            );
            created(test)
        }
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/1/abtests/validate",
    tag = "abtests",
    params(("step" = Option<String>, Query, description = "basics, variants or settings; all steps when absent")),
    request_body = NewAbTest,
    responses(
        (status = 200, description = "Form is valid", body = ValidateResponse),
        (status = 400, description = "First failing field")
    )
)]
pub async fn validate_abtest(
    Query(query): Query<ValidateQuery>,
    Json(form): Json<NewAbTest>,
) -> Response {
    let result = match parse_optional(query.step.as_deref(), WizardStep::parse) {
        Ok(Some(step)) => form.validate_step(step).map(|()| Some(step)),
        Ok(None) => form.validate().map(|()| None),
        Err(err) => Err(err),
    };
    match result {
        Ok(step) => Json(ValidateResponse { valid: true, step }).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    get,
    path = "/1/abtests",
    tag = "abtests",
    params(
        ("status" = Option<String>, Query, description = "running, paused or completed"),
        ("channel" = Option<String>, Query, description = "Channel filter"),
        ("campaignId" = Option<String>, Query, description = "Campaign filter"),
        ("limit" = Option<usize>, Query, description = "Page size (default 20)"),
        ("offset" = Option<usize>, Query, description = "Items to skip")
    ),
    responses((status = 200, description = "Tests page", body = serde_json::Value))
)]
pub async fn list_abtests(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListAbTestsQuery>,
) -> Response {
    match query.filter() {
        Ok(filter) => {
            let tests = state.abtests.list(Some(&filter));
            Json(paginate(tests, query.limit, query.offset)).into_response()
        }
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    get,
    path = "/1/abtests/{id}",
    tag = "abtests",
    params(("id" = String, Path, description = "Test id")),
    responses(
        (status = 200, description = "Test", body = AbTest),
        (status = 404, description = "Unknown test")
    )
)]
pub async fn get_abtest(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.abtests.get(&id) {
        Ok(test) => Json(test).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    delete,
    path = "/1/abtests/{id}",
    tag = "abtests",
    params(("id" = String, Path, description = "Test id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 409, description = "Test is running")
    )
)]
pub async fn delete_abtest(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match lifecycle::delete(state.abtests.as_ref(), &id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    get,
    path = "/1/abtests/{id}/results",
    tag = "abtests",
    params(("id" = String, Path, description = "Test id")),
    responses((status = 200, description = "Per-variant results", body = TestResults))
)]
pub async fn get_abtest_results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.abtests.get(&id) {
        Ok(test) => Json(TestResults::from_test(&test)).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/1/abtests/{id}/pause",
    tag = "abtests",
    params(("id" = String, Path, description = "Test id")),
    responses(
        (status = 200, description = "Test paused", body = AbTest),
        (status = 409, description = "Test is not running")
    )
)]
pub async fn pause_abtest(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let result = lifecycle::pause(state.abtests.as_ref(), &id);
    status_changed(&state, result)
}

#[utoipa::path(
    post,
    path = "/1/abtests/{id}/resume",
    tag = "abtests",
    params(("id" = String, Path, description = "Test id")),
    responses(
        (status = 200, description = "Test running again", body = AbTest),
        (status = 409, description = "Test is not paused")
    )
)]
pub async fn resume_abtest(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let result = lifecycle::resume(state.abtests.as_ref(), &id);
    status_changed(&state, result)
}

#[utoipa::path(
    post,
    path = "/1/abtests/{id}/complete",
    tag = "abtests",
    params(("id" = String, Path, description = "Test id")),
    responses(
        (status = 200, description = "Test completed", body = AbTest),
        (status = 409, description = "Test is already completed")
    )
)]
pub async fn complete_abtest(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let result = lifecycle::complete(state.abtests.as_ref(), &id);
    status_changed(&state, result)
}

#[utoipa::path(
    post,
    path = "/1/abtests/{id}/promote",
    tag = "abtests",
    params(("id" = String, Path, description = "Test id")),
    responses(
        (status = 200, description = "Winner promoted, or the existing winner", body = PromoteResponse),
        (status = 409, description = "Test cannot be promoted yet")
    )
)]
pub async fn promote_abtest(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match lifecycle::promote(state.abtests.as_ref(), &id) {
        Ok((test, outcome)) => {
            if !outcome.already_promoted() {
                state.metrics.promotions.inc();
                state.activity.record(
                    ActivityKind::AbTestPromoted,
                    &test.id,
                    format!("A/B test {} promoted variant {}", test.name, outcome.winner()),
                );
            }
            Json(PromoteResponse {
                winner: outcome.winner().to_string(),
                already_promoted: outcome.already_promoted(),
                test,
            })
            .into_response()
        }
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/1/abtests/{id}/duplicate",
    tag = "abtests",
    params(("id" = String, Path, description = "Test id")),
    responses((status = 201, description = "Running copy with zero counters", body = AbTest))
)]
pub async fn duplicate_abtest(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match lifecycle::duplicate(state.abtests.as_ref(), &id) {
        Ok(copy) => {
            state.activity.record(
                ActivityKind::AbTestCreated,
                &copy.id,
                format!("A/B test {} duplicated", copy.name),
            );
            created(copy)
        }
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/1/abtests/{id}/metrics",
    tag = "abtests",
    params(("id" = String, Path, description = "Test id")),
    request_body = MetricsIncrement,
    responses(
        (status = 200, description = "Counters added", body = AbTest),
        (status = 400, description = "Counters would break the invariants"),
        (status = 409, description = "Test is not running")
    )
)]
pub async fn record_abtest_metrics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(increment): Json<MetricsIncrement>,
) -> Response {
    match lifecycle::record_metrics(state.abtests.as_ref(), &id, &increment) {
        Ok(test) => Json(test).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    put,
    path = "/1/abtests/{id}/confidence",
    tag = "abtests",
    params(("id" = String, Path, description = "Test id")),
    request_body = ConfidenceRequest,
    responses(
        (status = 200, description = "Stated confidence stored", body = AbTest),
        (status = 409, description = "Test already has a winner")
    )
)]
pub async fn set_abtest_confidence(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ConfidenceRequest>,
) -> Response {
    match lifecycle::set_confidence(state.abtests.as_ref(), &id, req.confidence_level) {
        Ok(test) => Json(test).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    get,
    path = "/1/abtests/{id}/assignment",
    tag = "abtests",
    params(
        ("id" = String, Path, description = "Test id"),
        ("contactId" = String, Query, description = "Contact to assign")
    ),
    responses((status = 200, description = "Variant served to the contact", body = AssignmentResponse))
)]
pub async fn get_abtest_assignment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<AssignmentQuery>,
) -> Response {
    let test = match state.abtests.get(&id) {
        Ok(test) => test,
        Err(err) => return error_response(err),
    };
    match assign_variant(&test, &query.contact_id) {
        Some(variant) => Json(AssignmentResponse {
            test_id: test.id.clone(),
            contact_id: query.contact_id.clone(),
            variant_id: variant.id.clone(),
            variant_name: variant.name.clone(),
            message: variant.message.clone(),
        })
        .into_response(),
        None => error_response(LeadflowError::validation(format!(
            "A/B test {id} has no variants"
        ))),
    }
}
