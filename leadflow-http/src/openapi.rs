use utoipa::OpenApi;

use leadflow::abtests::stats::VariantResult;
use leadflow::abtests::{
    AbTest, AbTestStatus, AbTestSummary, ConfidenceSource, MetricsIncrement, NewAbTest,
    NewVariant, TestResults, Variant, WizardStep,
};
use leadflow::activity::{ActivityEvent, ActivityKind};
use leadflow::campaigns::{Campaign, CampaignInput, CampaignMetrics, CampaignStatus};
use leadflow::contacts::{Contact, ContactInput, ContactStatus};
use leadflow::dashboard::{CampaignKpis, ChannelStats, ContactKpis, FollowupKpis, Overview};
use leadflow::followups::{
    ExecutionStatus, FollowupExecution, FollowupSequence, FollowupStep, RunFailure, RunReport,
    SequenceInput, SequenceTrigger, StepRecord,
};
use leadflow::templates::{MessageTemplate, TemplateInput};
use leadflow::{Channel, InterestLevel};

use crate::handlers::abtests::{
    AssignmentResponse, ConfidenceRequest, PromoteResponse, ValidateResponse,
};
use crate::handlers::followups::EnrollRequest;
use crate::handlers::templates::{RenderRequest, RenderResponse};
use crate::handlers::webhooks::InterestWebhookResponse;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Leadflow API",
        description = "Contacts, campaigns, templates, A/B tests and follow-up sequences for a marketing CRM"
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::metrics::metrics_handler,
        crate::handlers::contacts::create_contact,
        crate::handlers::contacts::list_contacts,
        crate::handlers::contacts::get_contact,
        crate::handlers::contacts::update_contact,
        crate::handlers::contacts::delete_contact,
        crate::handlers::campaigns::create_campaign,
        crate::handlers::campaigns::list_campaigns,
        crate::handlers::campaigns::get_campaign,
        crate::handlers::campaigns::update_campaign,
        crate::handlers::campaigns::delete_campaign,
        crate::handlers::campaigns::duplicate_campaign,
        crate::handlers::campaigns::launch_campaign,
        crate::handlers::campaigns::pause_campaign,
        crate::handlers::campaigns::resume_campaign,
        crate::handlers::campaigns::complete_campaign,
        crate::handlers::campaigns::record_campaign_metrics,
        crate::handlers::templates::create_template,
        crate::handlers::templates::list_templates,
        crate::handlers::templates::get_template,
        crate::handlers::templates::update_template,
        crate::handlers::templates::delete_template,
        crate::handlers::templates::duplicate_template,
        crate::handlers::templates::render_template,
        crate::handlers::abtests::create_abtest,
        crate::handlers::abtests::validate_abtest,
        crate::handlers::abtests::list_abtests,
        crate::handlers::abtests::get_abtest,
        crate::handlers::abtests::delete_abtest,
        crate::handlers::abtests::get_abtest_results,
        crate::handlers::abtests::pause_abtest,
        crate::handlers::abtests::resume_abtest,
        crate::handlers::abtests::complete_abtest,
        crate::handlers::abtests::promote_abtest,
        crate::handlers::abtests::duplicate_abtest,
        crate::handlers::abtests::record_abtest_metrics,
        crate::handlers::abtests::set_abtest_confidence,
        crate::handlers::abtests::get_abtest_assignment,
        crate::handlers::followups::create_sequence,
        crate::handlers::followups::list_sequences,
        crate::handlers::followups::get_sequence,
        crate::handlers::followups::update_sequence,
        crate::handlers::followups::delete_sequence,
        crate::handlers::followups::enroll_contact,
        crate::handlers::followups::list_executions,
        crate::handlers::followups::get_execution,
        crate::handlers::followups::advance_execution,
        crate::handlers::followups::cancel_execution,
        crate::handlers::followups::run_due,
        crate::handlers::webhooks::campaign_webhook,
        crate::handlers::webhooks::interest_webhook,
        crate::handlers::dashboard::overview,
        crate::handlers::dashboard::channels,
        crate::handlers::activity::recent_activity,
    ),
    components(schemas(
        Channel,
        InterestLevel,
        Contact,
        ContactInput,
        ContactStatus,
        Campaign,
        CampaignInput,
        CampaignMetrics,
        CampaignStatus,
        MessageTemplate,
        TemplateInput,
        RenderRequest,
        RenderResponse,
        AbTest,
        AbTestStatus,
        AbTestSummary,
        ConfidenceSource,
        NewAbTest,
        NewVariant,
        Variant,
        VariantResult,
        TestResults,
        WizardStep,
        MetricsIncrement,
        ValidateResponse,
        ConfidenceRequest,
        PromoteResponse,
        AssignmentResponse,
        FollowupSequence,
        FollowupStep,
        SequenceInput,
        SequenceTrigger,
        FollowupExecution,
        ExecutionStatus,
        StepRecord,
        RunReport,
        RunFailure,
        EnrollRequest,
        InterestWebhookResponse,
        Overview,
        ContactKpis,
        CampaignKpis,
        FollowupKpis,
        ChannelStats,
        ActivityEvent,
        ActivityKind,
    )),
    tags(
        (name = "health", description = "Liveness and Prometheus metrics"),
        (name = "contacts", description = "Contact records and lead pipeline"),
        (name = "campaigns", description = "Campaign lifecycle and delivery metrics"),
        (name = "templates", description = "Message templates and previews"),
        (name = "abtests", description = "A/B tests, results and winner promotion"),
        (name = "followups", description = "Follow-up sequences and their executions"),
        (name = "webhooks", description = "Inbound campaign and interest webhooks"),
        (name = "dashboard", description = "Derived KPIs"),
        (name = "activity", description = "Recent activity feed"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_group_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/1/contacts/{id}",
            "/1/campaigns/{id}/launch",
            "/1/templates/{id}/render",
            "/1/abtests/{id}/promote",
            "/1/followups/run",
            "/1/webhooks/interest",
            "/1/dashboard/overview",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
