//! Prometheus `/metrics` endpoint.
//!
//! Record gauges are computed from the stores on every scrape. Webhook and
//! promotion counters live in [`MetricsState`] for the life of the process.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use leadflow::abtests::{AbTestStatus, TestRepository};
use leadflow::campaigns::CampaignStatus;
use leadflow::contacts::ContactStatus;
use leadflow::followups::ExecutionStatus;
use prometheus::{Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

use super::AppState;

/// Process-lifetime counters, cloned into each scrape's registry.
#[derive(Clone)]
pub struct MetricsState {
    pub webhooks_accepted: IntCounterVec,
    pub webhooks_rejected: IntCounterVec,
    pub promotions: IntCounter,
}

impl MetricsState {
    pub fn new() -> Self {
        MetricsState {
            webhooks_accepted: IntCounterVec::new(
                Opts::new("leadflow_webhooks_accepted_total", "Webhook deliveries accepted"),
                &["hook"],
            )
            .expect("valid metric definition"),
            webhooks_rejected: IntCounterVec::new(
                Opts::new("leadflow_webhooks_rejected_total", "Webhook deliveries rejected"),
                &["hook"],
            )
            .expect("valid metric definition"),
            promotions: IntCounter::new(
                "leadflow_abtest_promotions_total",
                "A/B test winners promoted",
            )
            .expect("valid metric definition"),
        }
    }
}

impl Default for MetricsState {
    fn default() -> Self {
        Self::new()
    }
}

fn register_gauge(registry: &Registry, name: &str, help: &str, value: f64) -> prometheus::Result<()> {
    let gauge = Gauge::new(name, help)?;
    registry.register(Box::new(gauge.clone()))?;
    gauge.set(value);
    Ok(())
}

fn build_registry(state: &AppState) -> prometheus::Result<Registry> {
    let registry = Registry::new();

    registry.register(Box::new(state.metrics.webhooks_accepted.clone()))?;
    registry.register(Box::new(state.metrics.webhooks_rejected.clone()))?;
    registry.register(Box::new(state.metrics.promotions.clone()))?;

    register_gauge(
        &registry,
        "leadflow_uptime_seconds",
        "Seconds since the server started",
        state.start_time.elapsed().as_secs_f64(),
    )?;
    register_gauge(
        &registry,
        "leadflow_templates",
        "Stored message templates",
        state.templates.len() as f64,
    )?;
    register_gauge(
        &registry,
        "leadflow_followup_sequences",
        "Stored follow-up sequences",
        state.followups.sequence_count() as f64,
    )?;
    register_gauge(
        &registry,
        "leadflow_activity_events",
        "Events held in the activity feed",
        state.activity.len() as f64,
    )?;

    let records = GaugeVec::new(
        Opts::new("leadflow_records", "Stored records per kind and status"),
        &["kind", "status"],
    )?;
    registry.register(Box::new(records.clone()))?;

    let contacts = state.contacts.all();
    for status in ContactStatus::ALL {
        let n = contacts.iter().filter(|c| c.status == status).count();
        records.with_label_values(&["contact", status.as_str()]).set(n as f64);
    }
    let campaigns = state.campaigns.all();
    for status in CampaignStatus::ALL {
        let n = campaigns.iter().filter(|c| c.status == status).count();
        records.with_label_values(&["campaign", status.as_str()]).set(n as f64);
    }
    let tests = state.abtests.list(None);
    for status in AbTestStatus::ALL {
        let n = tests.iter().filter(|t| t.status == status).count();
        records.with_label_values(&["abtest", status.as_str()]).set(n as f64);
    }
    let executions = state.followups.all_executions();
    for status in ExecutionStatus::ALL {
        let n = executions.iter().filter(|e| e.status == status).count();
        records
            .with_label_values(&["followup_execution", status.as_str()])
            .set(n as f64);
    }

    Ok(registry)
}

/// GET /metrics — returns Prometheus text exposition format.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "health",
    responses((status = 200, description = "Prometheus text exposition", body = String))
)]
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let registry = match build_registry(&state) {
        Ok(registry) => registry,
        Err(e) => {
            tracing::error!(error = %e, "metrics registry build failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("metrics error: {}", e),
            )
                .into_response();
        }
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encode error: {}", e),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        buffer,
    )
        .into_response()
}
