//! Inbound webhook receivers. They sit outside the API-key middleware and
//! authenticate by HMAC signature when a webhook secret is configured.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use leadflow::activity::ActivityKind;
use leadflow::contacts::Contact;
use leadflow::followups::FollowupExecution;
use leadflow::types::now_ms;
use leadflow::webhooks::{verify_signature, CampaignWebhook, InterestWebhook, SIGNATURE_HEADER};
use leadflow::LeadflowError;
use serde::Serialize;
use std::sync::Arc;

use super::campaigns::create_campaign_record;
use super::followups::record_enrollment;
use super::{error_response, AppState};

const CAMPAIGN_HOOK: &str = "campaign";
const INTEREST_HOOK: &str = "interest";

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InterestWebhookResponse {
    pub contact: Contact,
    pub created: bool,
    /// Executions started by interest-triggered sequences.
    pub enrolled: Vec<FollowupExecution>,
}

fn check_signature(state: &AppState, headers: &HeaderMap, body: &[u8]) -> leadflow::Result<()> {
    match state.webhook_secret.as_deref() {
        Some(secret) => {
            let header = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
            verify_signature(secret, body, header)
        }
        None => Ok(()),
    }
}

fn reject(state: &AppState, hook: &str, err: LeadflowError) -> Response {
    state
        .metrics
        .webhooks_rejected
        .with_label_values(&[hook])
        .inc();
    tracing::warn!(hook, error = %err, "webhook rejected");
    error_response(err)
}

#[utoipa::path(
    post,
    path = "/1/webhooks/campaigns",
    tag = "webhooks",
    request_body(content = serde_json::Value, description = "campaignName, channel, message and optional audienceTags, scheduledAt, templateId"),
    responses(
        (status = 201, description = "Campaign created", body = leadflow::campaigns::Campaign),
        (status = 400, description = "Malformed body or missing field"),
        (status = 401, description = "Signature missing or invalid")
    )
)]
pub async fn campaign_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = check_signature(&state, &headers, &body)
        .and_then(|()| CampaignWebhook::parse(&body))
        .and_then(|hook| create_campaign_record(&state, hook.into_campaign_input()));
    match result {
        Ok(campaign) => {
            state
                .metrics
                .webhooks_accepted
                .with_label_values(&[CAMPAIGN_HOOK])
                .inc();
            (StatusCode::CREATED, Json(campaign)).into_response()
        }
        Err(err) => reject(&state, CAMPAIGN_HOOK, err),
    }
}

fn accept_interest(state: &AppState, hook: InterestWebhook) -> leadflow::Result<InterestWebhookResponse> {
    let level = hook.interest_level;
    let signal = hook.into_signal();
    let outcome = state.contacts.upsert_interest(&signal)?;
    let contact = outcome.contact;
    if outcome.created {
        state.activity.record(
            ActivityKind::ContactCreated,
            &contact.id,
            format!("Contact {} added from {} webhook", contact.name, signal.channel),
        );
    }
    state.activity.record(
        ActivityKind::ContactInterest,
        &contact.id,
        format!("{} showed {} interest on {}", contact.name, level, signal.channel),
    );
    let enrolled = state.followups.auto_enroll(&contact, level, now_ms());
    for execution in &enrolled {
        record_enrollment(state, execution);
    }
    Ok(InterestWebhookResponse {
        contact,
        created: outcome.created,
        enrolled,
    })
}

#[utoipa::path(
    post,
    path = "/1/webhooks/interest",
    tag = "webhooks",
    request_body(content = serde_json::Value, description = "channel, interestLevel, one of email/phone/handle, optional name, message, occurredAt"),
    responses(
        (status = 201, description = "New contact created", body = InterestWebhookResponse),
        (status = 200, description = "Existing contact updated", body = InterestWebhookResponse),
        (status = 400, description = "Malformed body or missing field"),
        (status = 401, description = "Signature missing or invalid")
    )
)]
pub async fn interest_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = check_signature(&state, &headers, &body)
        .and_then(|()| InterestWebhook::parse(&body))
        .and_then(|hook| accept_interest(&state, hook));
    match result {
        Ok(accepted) => {
            state
                .metrics
                .webhooks_accepted
                .with_label_values(&[INTEREST_HOOK])
                .inc();
            let status = if accepted.created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (status, Json(accepted)).into_response()
        }
        Err(err) => reject(&state, INTEREST_HOOK, err),
    }
}
