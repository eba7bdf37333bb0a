use axum::{extract::State, Json};
use std::sync::Arc;

use super::AppState;

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is healthy", body = serde_json::Value)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "build_profile": if cfg!(debug_assertions) { "debug" } else { "release" },
        "records": {
            "contacts": state.contacts.len(),
            "campaigns": state.campaigns.len(),
            "templates": state.templates.len(),
            "abtests": state.abtests.len(),
            "followup_sequences": state.followups.sequence_count(),
            "followup_executions": state.followups.all_executions().len(),
        },
        "activity_events": state.activity.len(),
        "webhook_signatures": state.webhook_secret.is_some(),
    }))
}
