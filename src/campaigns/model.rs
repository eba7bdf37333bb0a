use serde::{Deserialize, Serialize};

use crate::error::{LeadflowError, Result};
use crate::storage::Record;
use crate::types::{new_id, normalize_tags, now_ms, ratio, require_non_empty, Channel};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Active,
    Paused,
    Completed,
}

impl CampaignStatus {
    pub const ALL: [CampaignStatus; 5] = [
        CampaignStatus::Draft,
        CampaignStatus::Scheduled,
        CampaignStatus::Active,
        CampaignStatus::Paused,
        CampaignStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Scheduled => "scheduled",
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| LeadflowError::validation(format!("unknown campaign status: {value}")))
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CampaignMetrics {
    #[serde(default)]
    pub sent: u64,
    #[serde(default)]
    pub delivered: u64,
    #[serde(default)]
    pub clicked: u64,
    #[serde(default)]
    pub replied: u64,
    #[serde(default)]
    pub converted: u64,
}

impl CampaignMetrics {
    pub fn ctr(&self) -> f64 {
        ratio(self.clicked, self.sent)
    }

    pub fn reply_rate(&self) -> f64 {
        ratio(self.replied, self.sent)
    }

    pub fn delivery_rate(&self) -> f64 {
        ratio(self.delivered, self.sent)
    }

    pub fn check(&self) -> Result<()> {
        let pairs = [
            ("delivered", self.delivered, "sent", self.sent),
            ("clicked", self.clicked, "delivered", self.delivered),
            ("replied", self.replied, "delivered", self.delivered),
            ("converted", self.converted, "clicked", self.clicked),
        ];
        for (name, value, bound_name, bound) in pairs {
            if value > bound {
                return Err(LeadflowError::validation(format!(
                    "{name} ({value}) exceeds {bound_name} ({bound})"
                )));
            }
        }
        Ok(())
    }

    pub fn saturating_add(&self, other: &CampaignMetrics) -> CampaignMetrics {
        CampaignMetrics {
            sent: self.sent.saturating_add(other.sent),
            delivered: self.delivered.saturating_add(other.delivered),
            clicked: self.clicked.saturating_add(other.clicked),
            replied: self.replied.saturating_add(other.replied),
            converted: self.converted.saturating_add(other.converted),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub channel: Channel,
    pub status: CampaignStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub audience_tags: Vec<String>,
    #[serde(default)]
    pub scheduled_at: Option<i64>,
    #[serde(default)]
    pub metrics: CampaignMetrics,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub launched_at: Option<i64>,
    #[serde(default)]
    pub completed_at: Option<i64>,
}

impl Campaign {
    pub fn validate(&self) -> Result<()> {
        require_non_empty("name", &self.name)?;
        if self.message.trim().is_empty() && self.template_id.is_none() {
            return Err(LeadflowError::MissingField("message".to_string()));
        }
        if self.status == CampaignStatus::Scheduled && self.scheduled_at.is_none() {
            return Err(LeadflowError::validation(
                "a scheduled campaign needs scheduledAt",
            ));
        }
        self.metrics.check()
    }
}

impl Record for Campaign {
    const KIND: &'static str = "campaign";

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn validate(&self) -> Result<()> {
        Campaign::validate(self)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CampaignInput {
    #[serde(default)]
    pub name: String,
    pub channel: Option<Channel>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub audience_tags: Vec<String>,
    #[serde(default)]
    pub scheduled_at: Option<i64>,
}

impl CampaignInput {
    /// A new campaign is a draft, or scheduled when `scheduled_at` is given.
    pub fn into_campaign(self) -> Result<Campaign> {
        let now = now_ms();
        let mut campaign = Campaign {
            id: new_id(),
            name: String::new(),
            channel: Channel::Instagram,
            status: CampaignStatus::Draft,
            message: String::new(),
            template_id: None,
            audience_tags: Vec::new(),
            scheduled_at: None,
            metrics: CampaignMetrics::default(),
            created_at: now,
            updated_at: now,
            launched_at: None,
            completed_at: None,
        };
        self.apply_to(&mut campaign)?;
        Ok(campaign)
    }

    pub fn apply_to(self, campaign: &mut Campaign) -> Result<()> {
        let channel = self
            .channel
            .ok_or_else(|| LeadflowError::MissingField("channel".to_string()))?;
        campaign.name = self.name.trim().to_string();
        campaign.channel = channel;
        campaign.message = self.message;
        campaign.template_id = self
            .template_id
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        campaign.audience_tags = normalize_tags(self.audience_tags);
        campaign.scheduled_at = self.scheduled_at;
        if matches!(
            campaign.status,
            CampaignStatus::Draft | CampaignStatus::Scheduled
        ) {
            campaign.status = if campaign.scheduled_at.is_some() {
                CampaignStatus::Scheduled
            } else {
                CampaignStatus::Draft
            };
        }
        campaign.updated_at = now_ms();
        campaign.validate()
    }
}
