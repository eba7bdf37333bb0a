use axum::{
    extract::{Query, State},
    Json,
};
use leadflow::activity::ActivityEvent;
use serde::Deserialize;
use std::sync::Arc;

use super::AppState;

const DEFAULT_ACTIVITY_LIMIT: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/1/activity",
    tag = "activity",
    params(("limit" = Option<usize>, Query, description = "Most recent events to return (default 50)")),
    responses((status = 200, description = "Events, newest first", body = Vec<ActivityEvent>))
)]
pub async fn recent_activity(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ActivityQuery>,
) -> Json<Vec<ActivityEvent>> {
    Json(
        state
            .activity
            .recent(query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT)),
    )
}
