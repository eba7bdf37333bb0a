//! Derived statistics over current store snapshots.

use axum::{extract::State, Json};
use leadflow::abtests::TestRepository;
use leadflow::dashboard::{channel_stats, ChannelStats, Overview};
use std::sync::Arc;

use super::AppState;

#[utoipa::path(
    get,
    path = "/1/dashboard/overview",
    tag = "dashboard",
    responses((status = 200, description = "KPIs across every module", body = Overview))
)]
pub async fn overview(State(state): State<Arc<AppState>>) -> Json<Overview> {
    Json(Overview::build(
        &state.contacts.all(),
        &state.campaigns.all(),
        &state.abtests.list(None),
        state.followups.sequence_count(),
        &state.followups.all_executions(),
    ))
}

#[utoipa::path(
    get,
    path = "/1/dashboard/channels",
    tag = "dashboard",
    responses((status = 200, description = "One row per channel", body = Vec<ChannelStats>))
)]
pub async fn channels(State(state): State<Arc<AppState>>) -> Json<Vec<ChannelStats>> {
    Json(channel_stats(&state.contacts.all(), &state.campaigns.all()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{body_json, make_state};
    use axum::{body::Body, http::Request, response::IntoResponse, routing::get, Router};
    use leadflow::contacts::ContactInput;
    use leadflow::{Channel, InterestLevel};
    use tempfile::TempDir;
    use tower::ServiceExt;

    #[tokio::test]
    async fn overview_and_channels() {
        let tmp = TempDir::new().unwrap();
        let state = make_state(&tmp);
        state
            .contacts
            .create(ContactInput {
                name: "Hot lead".into(),
                handle: Some("hot".into()),
                channel: Some(Channel::Facebook),
                interest_level: Some(InterestLevel::Hot),
                ..Default::default()
            })
            .unwrap();
        let app = Router::new()
            .route("/1/dashboard/overview", get(overview))
            .route("/1/dashboard/channels", get(channels))
            .with_state(state);

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/1/dashboard/overview").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(resp.into_response()).await;
        assert_eq!(json["contacts"]["total"], 1);
        assert_eq!(json["contacts"]["hot"], 1);
        assert_eq!(json["abtests"]["total"], 0);

        let resp = app
            .oneshot(Request::builder().uri("/1/dashboard/channels").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(resp.into_response()).await;
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), Channel::ALL.len());
        let fb = rows.iter().find(|r| r["channel"] == "facebook").unwrap();
        assert_eq!(fb["interested"], 1);
    }
}
