use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use leadflow::activity::ActivityKind;
use leadflow::campaigns::{Campaign, CampaignFilter, CampaignInput, CampaignMetrics, CampaignStatus};
use leadflow::Channel;
use serde::Deserialize;
use std::sync::Arc;

use super::{created, error_response, paginate, parse_optional, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCampaignsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

impl ListCampaignsQuery {
    fn filter(&self) -> leadflow::Result<CampaignFilter> {
        Ok(CampaignFilter {
            status: parse_optional(self.status.as_deref(), CampaignStatus::parse)?,
            channel: parse_optional(self.channel.as_deref(), Channel::parse)?,
        })
    }
}

/// Creates a campaign after checking its template reference. Shared with the
/// campaign webhook.
pub(crate) fn create_campaign_record(
    state: &AppState,
    input: CampaignInput,
) -> leadflow::Result<Campaign> {
    state.check_template(input.template_id.as_deref())?;
    let campaign = state.campaigns.create(input)?;
    state.activity.record(
        ActivityKind::CampaignCreated,
        &campaign.id,
        format!("Campaign {} created as {}", campaign.name, campaign.status.as_str()),
    );
    Ok(campaign)
}

fn status_changed(state: &AppState, result: leadflow::Result<Campaign>) -> Response {
    match result {
        Ok(campaign) => {
            state.activity.record(
                ActivityKind::CampaignStatusChanged,
                &campaign.id,
                format!("Campaign {} is now {}", campaign.name, campaign.status.as_str()),
            );
            Json(campaign).into_response()
        }
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/1/campaigns",
    tag = "campaigns",
    request_body = CampaignInput,
    responses(
        (status = 201, description = "Campaign created", body = Campaign),
        (status = 400, description = "Invalid campaign"),
        (status = 404, description = "Unknown template")
    )
)]
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CampaignInput>,
) -> Response {
    match create_campaign_record(&state, input) {
        Ok(campaign) => created(campaign),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    get,
    path = "/1/campaigns",
    tag = "campaigns",
    params(
        ("status" = Option<String>, Query, description = "draft, scheduled, active, paused or completed"),
        ("channel" = Option<String>, Query, description = "Channel filter"),
        ("limit" = Option<usize>, Query, description = "Page size (default 20)"),
        ("offset" = Option<usize>, Query, description = "Items to skip")
    ),
    responses((status = 200, description = "Campaigns page", body = serde_json::Value))
)]
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListCampaignsQuery>,
) -> Response {
    match query.filter() {
        Ok(filter) => {
            Json(paginate(state.campaigns.list(&filter), query.limit, query.offset)).into_response()
        }
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    get,
    path = "/1/campaigns/{id}",
    tag = "campaigns",
    params(("id" = String, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Campaign", body = Campaign),
        (status = 404, description = "Unknown campaign")
    )
)]
pub async fn get_campaign(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.campaigns.get(&id) {
        Ok(campaign) => Json(campaign).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    put,
    path = "/1/campaigns/{id}",
    tag = "campaigns",
    params(("id" = String, Path, description = "Campaign id")),
    request_body = CampaignInput,
    responses(
        (status = 200, description = "Campaign updated", body = Campaign),
        (status = 409, description = "Campaign is completed")
    )
)]
pub async fn update_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<CampaignInput>,
) -> Response {
    let result = state
        .check_template(input.template_id.as_deref())
        .and_then(|()| state.campaigns.update(&id, input));
    match result {
        Ok(campaign) => Json(campaign).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    delete,
    path = "/1/campaigns/{id}",
    tag = "campaigns",
    params(("id" = String, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Deleted campaign", body = Campaign),
        (status = 409, description = "Campaign is active")
    )
)]
pub async fn delete_campaign(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.campaigns.delete(&id) {
        Ok(campaign) => Json(campaign).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/1/campaigns/{id}/duplicate",
    tag = "campaigns",
    params(("id" = String, Path, description = "Campaign id")),
    responses((status = 201, description = "Draft copy", body = Campaign))
)]
pub async fn duplicate_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.campaigns.duplicate(&id) {
        Ok(copy) => {
            state.activity.record(
                ActivityKind::CampaignCreated,
                &copy.id,
                format!("Campaign {} duplicated", copy.name),
            );
            created(copy)
        }
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/1/campaigns/{id}/launch",
    tag = "campaigns",
    params(("id" = String, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Campaign active", body = Campaign),
        (status = 409, description = "Not a draft or scheduled campaign")
    )
)]
pub async fn launch_campaign(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let result = state.campaigns.launch(&id);
    status_changed(&state, result)
}

#[utoipa::path(
    post,
    path = "/1/campaigns/{id}/pause",
    tag = "campaigns",
    params(("id" = String, Path, description = "Campaign id")),
    responses((status = 200, description = "Campaign paused", body = Campaign))
)]
pub async fn pause_campaign(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let result = state.campaigns.pause(&id);
    status_changed(&state, result)
}

#[utoipa::path(
    post,
    path = "/1/campaigns/{id}/resume",
    tag = "campaigns",
    params(("id" = String, Path, description = "Campaign id")),
    responses((status = 200, description = "Campaign active again", body = Campaign))
)]
pub async fn resume_campaign(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let result = state.campaigns.resume(&id);
    status_changed(&state, result)
}

#[utoipa::path(
    post,
    path = "/1/campaigns/{id}/complete",
    tag = "campaigns",
    params(("id" = String, Path, description = "Campaign id")),
    responses((status = 200, description = "Campaign completed", body = Campaign))
)]
pub async fn complete_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let result = state.campaigns.complete(&id);
    status_changed(&state, result)
}

#[utoipa::path(
    post,
    path = "/1/campaigns/{id}/metrics",
    tag = "campaigns",
    params(("id" = String, Path, description = "Campaign id")),
    request_body = CampaignMetrics,
    responses(
        (status = 200, description = "Counters added", body = Campaign),
        (status = 400, description = "Counters would break the funnel invariants"),
        (status = 409, description = "Campaign is not active")
    )
)]
pub async fn record_campaign_metrics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(increment): Json<CampaignMetrics>,
) -> Response {
    match state.campaigns.record_metrics(&id, &increment) {
        Ok(campaign) => Json(campaign).into_response(),
        Err(err) => error_response(err),
    }
}
