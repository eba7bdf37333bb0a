use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use leadflow::abtests::AbTestStore;
use leadflow::activity::ActivityLog;
use leadflow::campaigns::CampaignStore;
use leadflow::contacts::ContactStore;
use leadflow::followups::Followups;
use leadflow::templates::TemplateStore;
use leadflow::LeadflowError;
use serde::{Deserialize, Serialize};

pub mod abtests;
pub mod activity;
pub mod campaigns;
pub mod contacts;
pub mod dashboard;
pub mod followups;
pub mod health;
pub mod metrics;
pub mod templates;
pub mod webhooks;

pub use health::health;
pub use metrics::metrics_handler;

pub struct AppState {
    pub contacts: Arc<ContactStore>,
    pub campaigns: Arc<CampaignStore>,
    pub templates: Arc<TemplateStore>,
    pub abtests: Arc<AbTestStore>,
    pub followups: Arc<Followups>,
    pub activity: Arc<ActivityLog>,
    pub metrics: metrics::MetricsState,
    pub webhook_secret: Option<String>,
    pub start_time: Instant,
}

impl AppState {
    /// Opens every store under `data_dir`. Fails if any persisted record does
    /// not validate.
    pub fn open(
        data_dir: &Path,
        activity_capacity: usize,
        webhook_secret: Option<String>,
    ) -> leadflow::Result<Self> {
        Ok(AppState {
            contacts: Arc::new(ContactStore::new(data_dir)?),
            campaigns: Arc::new(CampaignStore::new(data_dir)?),
            templates: Arc::new(TemplateStore::new(data_dir)?),
            abtests: Arc::new(AbTestStore::new(data_dir)?),
            followups: Arc::new(Followups::new(data_dir)?),
            activity: Arc::new(ActivityLog::new(activity_capacity)),
            metrics: metrics::MetricsState::new(),
            webhook_secret,
            start_time: Instant::now(),
        })
    }

    /// Refuses references to templates that do not exist.
    pub(crate) fn check_template(&self, template_id: Option<&str>) -> leadflow::Result<()> {
        match template_id {
            Some(id) if !self.templates.contains(id) => Err(LeadflowError::not_found("template", id)),
            _ => Ok(()),
        }
    }
}

pub(crate) fn error_response(err: LeadflowError) -> Response {
    let status = err.status_code();
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    (status, Json(serde_json::json!({ "message": err.to_string() }))).into_response()
}

pub(crate) fn created<T: Serialize>(value: T) -> Response {
    (StatusCode::CREATED, Json(value)).into_response()
}

pub(crate) const DEFAULT_LIST_LIMIT: usize = 20;
pub(crate) const DEFAULT_LIST_OFFSET: usize = 0;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub count: usize,
    pub total: usize,
}

/// Items arrive sorted by creation time from the stores.
pub(crate) fn paginate<T>(items: Vec<T>, limit: Option<usize>, offset: Option<usize>) -> ListResponse<T> {
    let total = items.len();
    let items: Vec<T> = items
        .into_iter()
        .skip(offset.unwrap_or(DEFAULT_LIST_OFFSET))
        .take(limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .collect();
    ListResponse {
        count: items.len(),
        items,
        total,
    }
}

/// Optional `?now=<epoch ms>` override accepted by the follow-up runners.
#[derive(Debug, Default, Deserialize)]
pub struct NowQuery {
    #[serde(default)]
    pub now: Option<i64>,
}

/// Latest accepted `?now=`: 9999-12-31T23:59:59.999Z.
pub const MAX_NOW_MS: i64 = 253_402_300_799_999;

impl NowQuery {
    pub fn resolve(&self) -> leadflow::Result<i64> {
        match self.now {
            None => Ok(leadflow::types::now_ms()),
            Some(now) if (0..=MAX_NOW_MS).contains(&now) => Ok(now),
            Some(now) => Err(leadflow::LeadflowError::validation(format!(
                "now must be an epoch millisecond timestamp between 0 and {MAX_NOW_MS}, got {now}"
            ))),
        }
    }
}

pub(crate) fn parse_optional<T>(
    value: Option<&str>,
    parse: impl Fn(&str) -> leadflow::Result<T>,
) -> leadflow::Result<Option<T>> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(parse)
        .transpose()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginate_defaults_and_bounds() {
        let page = paginate((0..30).collect::<Vec<_>>(), None, None);
        assert_eq!(page.total, 30);
        assert_eq!(page.count, DEFAULT_LIST_LIMIT);
        assert_eq!(page.items[0], 0);

        let page = paginate((0..30).collect::<Vec<_>>(), Some(5), Some(27));
        assert_eq!(page.items, vec![27, 28, 29]);
        assert_eq!(page.count, 3);

        let page = paginate((0..3).collect::<Vec<_>>(), None, Some(10));
        assert!(page.items.is_empty());
        assert_eq!(page.total, 3);
    }

    #[test]
    fn parse_optional_skips_blank() {
        let parsed = parse_optional(Some("  "), leadflow::Channel::parse).unwrap();
        assert!(parsed.is_none());
        let parsed = parse_optional(Some("ig"), leadflow::Channel::parse).unwrap();
        assert_eq!(parsed, Some(leadflow::Channel::Instagram));
        assert!(parse_optional(Some("fax"), leadflow::Channel::parse).is_err());
    }

    #[tokio::test]
    async fn error_response_maps_status() {
        let resp = error_response(LeadflowError::not_found("contact", "c1"));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = test_support::body_json(resp).await;
        assert!(json["message"].as_str().unwrap().contains("c1"));
    }
}
